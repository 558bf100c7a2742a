//! Axum-based HTTP server for the layout API.
//!
//! Provides REST endpoints for:
//! - GET `/api/tracks` - Snapshots of all segments
//! - GET `/api/tracks/:id` - Snapshot of one segment
//! - POST `/api/tracks/:id/reserve` - Reserve `{"loco": 7, "force": false}`
//! - POST `/api/tracks/:id/lock` - Lock `{"loco": 7}`
//! - POST `/api/tracks/:id/release` - Release `{"loco": 7, "force": false}`
//! - POST `/api/tracks/:id/blocked` - Block or unblock `{"blocked": true}`
//! - GET `/api/tracks/:id/routes?loco=7&approach=random` - Valid routes, best first
//! - POST `/api/routes/:id/reserve|lock|release` - Route operations `{"loco": 7}`
//! - POST `/api/feedback/:id` - Report a sensor `{"state": "occupied"}`
//!
//! Rejected layout operations answer `200` with `accepted: false`; unknown
//! ids answer `404`. Sensor reports go through the feedback relay when one
//! is running and answer `queued`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::WebConfig;
use crate::track::TrackSnapshot;
use crate::types::{FeedbackId, RouteId, TrackId};

use super::api::{
    ApiResponse, BlockedRequest, CommandResponse, FeedbackRequest, LocoRequest, RouteQuery,
    RoutesResponse,
};
use super::feedback::FeedbackEvent;
use super::shared::SharedLayoutState;

type AppState = State<Arc<SharedLayoutState>>;
type CommandResult = Result<Json<ApiResponse<CommandResponse>>, (StatusCode, Json<ApiResponse<()>>)>;

fn not_found(what: impl std::fmt::Display) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::err(format!("{} not found", what))),
    )
}

fn unavailable(what: &str) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::err(format!("{} stopped", what))),
    )
}

fn outcome(accepted: bool, action: &str) -> CommandResult {
    Ok(Json(ApiResponse::ok(CommandResponse::from_outcome(accepted, action))))
}

// ============================================================================
// Track Handlers
// ============================================================================

/// GET /api/tracks
async fn list_tracks(State(state): AppState) -> Json<ApiResponse<Vec<TrackSnapshot>>> {
    Json(ApiResponse::ok(state.layout().snapshots()))
}

/// GET /api/tracks/:id
async fn get_track(
    State(state): AppState,
    Path(id): Path<u32>,
) -> Result<Json<ApiResponse<TrackSnapshot>>, (StatusCode, Json<ApiResponse<()>>)> {
    let track = state.layout().track(TrackId(id)).ok_or_else(|| not_found(TrackId(id)))?;
    Ok(Json(ApiResponse::ok(track.snapshot())))
}

/// POST /api/tracks/:id/reserve
async fn reserve_track(
    State(state): AppState,
    Path(id): Path<u32>,
    Json(req): Json<LocoRequest>,
) -> CommandResult {
    let id = TrackId(id);
    let layout = state.layout();
    layout.track(id).ok_or_else(|| not_found(id))?;
    if req.force {
        outcome(layout.reserve_force(id, req.loco), "reserve_force")
    } else {
        outcome(layout.reserve(id, req.loco), "reserve")
    }
}

/// POST /api/tracks/:id/lock
async fn lock_track(
    State(state): AppState,
    Path(id): Path<u32>,
    Json(req): Json<LocoRequest>,
) -> CommandResult {
    let id = TrackId(id);
    state.layout().track(id).ok_or_else(|| not_found(id))?;
    outcome(state.layout().lock(id, req.loco), "lock")
}

/// POST /api/tracks/:id/release
async fn release_track(
    State(state): AppState,
    Path(id): Path<u32>,
    Json(req): Json<LocoRequest>,
) -> CommandResult {
    let id = TrackId(id);
    let layout = state.layout();
    layout.track(id).ok_or_else(|| not_found(id))?;
    if req.force {
        outcome(layout.release_force(id, req.loco), "release_force")
    } else {
        outcome(layout.release(id, req.loco), "release")
    }
}

/// POST /api/tracks/:id/blocked
async fn set_blocked(
    State(state): AppState,
    Path(id): Path<u32>,
    Json(req): Json<BlockedRequest>,
) -> CommandResult {
    let id = TrackId(id);
    if !state.layout().set_blocked(id, req.blocked) {
        return Err(not_found(id));
    }
    outcome(true, if req.blocked { "blocked" } else { "unblocked" })
}

/// GET /api/tracks/:id/routes
async fn select_routes(
    State(state): AppState,
    Path(id): Path<u32>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<ApiResponse<RoutesResponse>>, (StatusCode, Json<ApiResponse<()>>)> {
    let id = TrackId(id);
    let layout = state.layout();
    let track = layout.track(id).ok_or_else(|| not_found(id))?;
    let routes = match query.allow_turn {
        Some(allow_turn) => layout.select_valid_routes(id, query.loco, allow_turn, query.approach),
        None => layout.select_routes_for_loco(id, query.loco, query.approach),
    };
    Ok(Json(ApiResponse::ok(RoutesResponse {
        track: id,
        approach: query
            .approach
            .resolve(&[track.approach(), layout.default_approach()]),
        routes,
    })))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /api/routes/:id/reserve
async fn reserve_route(
    State(state): AppState,
    Path(id): Path<u32>,
    Json(req): Json<LocoRequest>,
) -> CommandResult {
    let id = RouteId(id);
    state.layout().route(id).ok_or_else(|| not_found(id))?;
    outcome(state.layout().reserve_route(id, req.loco), "reserve_route")
}

/// POST /api/routes/:id/lock
async fn lock_route(
    State(state): AppState,
    Path(id): Path<u32>,
    Json(req): Json<LocoRequest>,
) -> CommandResult {
    let id = RouteId(id);
    state.layout().route(id).ok_or_else(|| not_found(id))?;
    outcome(state.layout().lock_route(id, req.loco), "lock_route")
}

/// POST /api/routes/:id/release
async fn release_route(
    State(state): AppState,
    Path(id): Path<u32>,
    Json(req): Json<LocoRequest>,
) -> CommandResult {
    let id = RouteId(id);
    state.layout().route(id).ok_or_else(|| not_found(id))?;
    outcome(state.layout().release_route(id, req.loco), "release_route")
}

// ============================================================================
// Feedback Handler
// ============================================================================

/// POST /api/feedback/:id
async fn report_feedback(
    State(state): AppState,
    Path(id): Path<u32>,
    Json(req): Json<FeedbackRequest>,
) -> CommandResult {
    let id = FeedbackId(id);
    state.layout().feedback(id).ok_or_else(|| not_found(id))?;
    let Some(relay) = state.feedback_sender() else {
        return outcome(state.layout().set_feedback_state(id, req.state), req.state.as_str());
    };
    relay
        .send(FeedbackEvent {
            sensor: id,
            state: req.state,
        })
        .await
        .map_err(|_| unavailable("feedback relay"))?;
    outcome(true, "queued")
}

/// Fallback handler for 404
async fn fallback() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::err("Not found")),
    )
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cors_permissive: true,
        }
    }
}

impl WebServerConfig {
    /// Create from shared WebConfig
    pub fn from_config(config: &WebConfig) -> Self {
        Self {
            addr: ([0, 0, 0, 0], config.port).into(),
            cors_permissive: config.cors_permissive,
        }
    }
}

/// Build the Axum router with all routes
pub fn build_router(state: Arc<SharedLayoutState>, config: &WebServerConfig) -> Router {
    let mut router = Router::new()
        .route("/api/tracks", get(list_tracks))
        .route("/api/tracks/:id", get(get_track))
        .route("/api/tracks/:id/reserve", post(reserve_track))
        .route("/api/tracks/:id/lock", post(lock_track))
        .route("/api/tracks/:id/release", post(release_track))
        .route("/api/tracks/:id/blocked", post(set_blocked))
        .route("/api/tracks/:id/routes", get(select_routes))
        .route("/api/routes/:id/reserve", post(reserve_route))
        .route("/api/routes/:id/lock", post(lock_route))
        .route("/api/routes/:id/release", post(release_route))
        .route("/api/feedback/:id", post(report_feedback))
        .fallback(fallback)
        .with_state(state);

    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Start the web server and run until `shutdown` completes.
pub async fn run_server(
    state: Arc<SharedLayoutState>,
    config: WebServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let router = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "web server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
