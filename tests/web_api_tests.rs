//! Integration tests for the web API.
//!
//! These tests drive the router directly with `tower::ServiceExt::oneshot`.

#![cfg(feature = "web")]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use rs_railcontrol::services::{
    build_router, spawn_feedback_relay, ApiResponse, BroadcastPublisher, CommandResponse,
    RoutesResponse, SharedLayoutState, WebServerConfig,
};
use rs_railcontrol::{
    FeedbackConfig, FeedbackId, FeedbackState, Layout, LockState, Loco, LocoId, RouteConfig, RouteId,
    SelectRouteApproach, TrackConfig, TrackId, TrackSnapshot,
};

fn create_test_app() -> (axum::Router, Arc<SharedLayoutState>) {
    let events = BroadcastPublisher::new(16);
    let layout = Layout::new().with_publisher(Arc::new(events.clone()));
    layout.add_feedback(FeedbackConfig::new(FeedbackId(1), "F1", 1)).unwrap();
    for (id, length) in [(1, 10), (2, 5), (3, 2)] {
        let mut config = TrackConfig::new(TrackId(id), format!("T{id}")).with_length(length);
        if id == 2 {
            config = config
                .with_feedbacks([FeedbackId(1)])
                .with_release_when_free(true);
        }
        layout.add_track(config).unwrap();
    }
    for to in [2, 3] {
        layout
            .add_route(RouteConfig::new(RouteId(10 + to), "out", TrackId(1), TrackId(to)))
            .unwrap();
    }
    layout.add_loco(Loco::new(LocoId(7), "BR 218"));

    let state = Arc::new(SharedLayoutState::new(layout, events));
    let router = build_router(Arc::clone(&state), &WebServerConfig::default());
    (router, state)
}

async fn get_json<T: DeserializeOwned>(app: &axum::Router, uri: &str) -> (StatusCode, T) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json<T: DeserializeOwned>(
    app: &axum::Router,
    uri: &str,
    body: &'static str,
) -> (StatusCode, T) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_list_tracks() {
    let (app, _state) = create_test_app();

    let (status, json): (_, ApiResponse<Vec<TrackSnapshot>>) = get_json(&app, "/api/tracks").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json.success);
    let tracks = json.data.unwrap();
    assert_eq!(
        tracks.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![TrackId(1), TrackId(2), TrackId(3)]
    );
    assert!(tracks.iter().all(|t| t.lock == LockState::Free));
}

#[tokio::test]
async fn test_reserve_and_lock() {
    let (app, state) = create_test_app();

    let (status, json): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/tracks/3/reserve", r#"{"loco": 7}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.data.unwrap().result, "reserve");

    let (_, json): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/tracks/3/lock", r#"{"loco": 7}"#).await;
    assert!(json.data.unwrap().accepted);

    let (_, json): (_, ApiResponse<TrackSnapshot>) = get_json(&app, "/api/tracks/3").await;
    assert_eq!(json.data.unwrap().lock, LockState::Locked(LocoId(7)));
    assert_eq!(
        state.layout().track(TrackId(3)).unwrap().lock_state(),
        LockState::Locked(LocoId(7))
    );
}

#[tokio::test]
async fn test_conflicting_reserve_is_rejected() {
    let (app, _state) = create_test_app();

    let (_, _): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/tracks/3/reserve", r#"{"loco": 7}"#).await;
    let (status, json): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/tracks/3/reserve", r#"{"loco": 42}"#).await;

    assert_eq!(status, StatusCode::OK);
    let data = json.data.unwrap();
    assert!(!data.accepted);
    assert_eq!(data.result, "reserve_rejected");

    let (_, json): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/tracks/3/reserve", r#"{"loco": 42, "force": true}"#).await;
    assert_eq!(json.data.unwrap().result, "reserve_force");
}

#[tokio::test]
async fn test_unknown_track_is_404() {
    let (app, _state) = create_test_app();

    let (status, json): (_, ApiResponse<()>) =
        post_json(&app, "/api/tracks/99/reserve", r#"{"loco": 7}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!json.success);
    assert!(json.error.is_some());

    let (status, _): (_, ApiResponse<()>) = get_json(&app, "/api/nothing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_select_routes() {
    let (app, _state) = create_test_app();

    let (status, json): (_, ApiResponse<RoutesResponse>) =
        get_json(&app, "/api/tracks/1/routes?loco=7&approach=min_track_length").await;
    assert_eq!(status, StatusCode::OK);
    let data = json.data.unwrap();
    assert_eq!(data.approach, SelectRouteApproach::MinTrackLength);
    assert_eq!(data.routes, vec![RouteId(13), RouteId(12)]);

    let (_, _): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/tracks/3/blocked", r#"{"blocked": true}"#).await;
    let (_, json): (_, ApiResponse<RoutesResponse>) =
        get_json(&app, "/api/tracks/1/routes?loco=7").await;
    let data = json.data.unwrap();
    assert_eq!(data.approach, SelectRouteApproach::DoNotCare);
    assert_eq!(data.routes, vec![RouteId(12)]);
}

#[tokio::test]
async fn test_route_reserve_lock_release() {
    let (app, state) = create_test_app();

    for action in ["reserve", "lock", "release"] {
        let uri = format!("/api/routes/13/{action}");
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"loco": 7}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(
        state.layout().track(TrackId(3)).unwrap().lock_state(),
        LockState::Locked(LocoId(7))
    );
    assert_eq!(state.layout().route(RouteId(13)).unwrap().last_used(), 1);
}

#[tokio::test]
async fn test_feedback_completes_deferred_release() {
    let (app, state) = create_test_app();
    let mut events = state.subscribe();

    let (_, _): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/feedback/1", r#"{"state": "occupied"}"#).await;
    for action in ["reserve", "lock", "release"] {
        let uri = format!("/api/tracks/2/{action}");
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"loco": 7}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(
        state.layout().track(TrackId(2)).unwrap().loco_delayed(),
        Some(LocoId(7))
    );

    let (status, json): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/feedback/1", r#"{"state": "free"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.data.unwrap().result, "free");
    assert_eq!(
        state.layout().track(TrackId(2)).unwrap().lock_state(),
        LockState::Free
    );

    // The last broadcast change shows the completed release.
    let mut last = None;
    while let Ok(snapshot) = events.try_recv() {
        last = Some(snapshot);
    }
    let last = last.unwrap();
    assert_eq!(last.id, TrackId(2));
    assert_eq!(last.lock, LockState::Free);
}

#[tokio::test]
async fn test_feedback_goes_through_relay() {
    let (app, state) = create_test_app();
    let (_relay_tx, _relay) = spawn_feedback_relay(Arc::clone(&state), 8);

    let (status, json): (_, ApiResponse<CommandResponse>) =
        post_json(&app, "/api/feedback/1", r#"{"state": "occupied"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.data.unwrap().result, "queued");

    let track = state.layout().track(TrackId(2)).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while track.occupancy() != FeedbackState::Occupied {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        state.layout().feedback(FeedbackId(1)).unwrap().state(),
        FeedbackState::Occupied
    );
}
