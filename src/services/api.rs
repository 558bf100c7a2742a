//! API request and response types for HTTP/MQTT communication.

use serde::{Deserialize, Serialize};

use crate::selector::SelectRouteApproach;
use crate::types::{FeedbackState, LocoId, RouteId, TrackId};

// ============================================================================
// Request Types
// ============================================================================

/// Body of reserve/lock/release requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocoRequest {
    /// Acting locomotive
    pub loco: LocoId,
    /// Use the forced variant (reserve and release only)
    #[serde(default)]
    pub force: bool,
}

/// Body of `POST /api/tracks/:id/blocked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedRequest {
    /// New blocked flag
    pub blocked: bool,
}

/// Body of `POST /api/feedback/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    /// Reported sensor state
    pub state: FeedbackState,
}

/// Query of `GET /api/tracks/:id/routes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteQuery {
    /// Locomotive looking for a route
    pub loco: LocoId,
    /// Allow routes that need the locomotive to turn (default: push-pull flag)
    #[serde(default)]
    pub allow_turn: Option<bool>,
    /// Ordering (default: segment override, then system default)
    #[serde(default)]
    pub approach: SelectRouteApproach,
}

// ============================================================================
// Response Types
// ============================================================================

/// API response wrapper for consistent JSON structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (present when success=true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present when success=false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Command result response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the layout accepted the command
    pub accepted: bool,
    /// Result details
    pub result: String,
}

impl CommandResponse {
    /// Build from a layout operation outcome
    pub fn from_outcome(accepted: bool, action: &str) -> Self {
        Self {
            accepted,
            result: if accepted {
                action.to_string()
            } else {
                format!("{}_rejected", action)
            },
        }
    }
}

/// Valid routes leaving a segment, best first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutesResponse {
    /// Source segment
    pub track: TrackId,
    /// Effective ordering
    pub approach: SelectRouteApproach,
    /// Route ids, best first
    pub routes: Vec<RouteId>,
}
