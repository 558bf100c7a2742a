//! Network services for the HTTP API and MQTT integration.
//!
//! - `web` feature: Axum-based HTTP API server with JSON endpoints
//! - `mqtt` feature: MQTT bridge for sensor reports and state publishing
//!
//! All services share one [`Layout`](crate::Layout) through
//! `SharedLayoutState` wrapped in `Arc`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use rs_railcontrol::services::{BroadcastPublisher, SharedLayoutState};
//!
//! let events = BroadcastPublisher::new(256);
//! let layout = Layout::from_config(&config.layout).with_publisher(Arc::new(events.clone()));
//! let state = Arc::new(SharedLayoutState::new(layout, events));
//!
//! // Web and MQTT both use the same state
//! let (feedback_tx, _relay) = spawn_feedback_relay(Arc::clone(&state), 256);
//! let router = build_router(Arc::clone(&state), &web_config);
//! let bridge = MqttBridge::new(Arc::clone(&state), feedback_tx, mqtt_config);
//! ```

// Shared state (available when either web or mqtt is enabled)
#[cfg(any(feature = "web", feature = "mqtt"))]
pub mod shared;

// API types are shared between web and mqtt
#[cfg(any(feature = "web", feature = "mqtt"))]
pub mod api;

// Sensor report relay task
#[cfg(any(feature = "web", feature = "mqtt"))]
pub mod feedback;

#[cfg(feature = "web")]
pub mod web;

#[cfg(feature = "mqtt")]
pub mod mqtt;

// Re-exports
#[cfg(any(feature = "web", feature = "mqtt"))]
pub use shared::*;

#[cfg(any(feature = "web", feature = "mqtt"))]
pub use api::*;

#[cfg(any(feature = "web", feature = "mqtt"))]
pub use feedback::*;

#[cfg(feature = "web")]
pub use web::*;

#[cfg(feature = "mqtt")]
pub use mqtt::*;
