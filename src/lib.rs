//! # rs-railcontrol
//!
//! The reservation core of a model railway layout controller: track segments
//! that locomotives reserve and lock, routes between them, and occupancy
//! sensors whose reports complete deferred releases.
//!
//! ## Features
//!
//! - **Per-segment mutual exclusion**: `Free -> Reserved -> Locked`, one holder at a time
//! - **Deferred release**: a segment released while still occupied frees itself when the train has left
//! - **Route selection**: filter by orientation, destination, train length and push-pull, then order by policy
//! - **Route reservation**: claim switches, signals and segments along a route with rollback
//! - **Hardware abstraction**: accessory commands go through a [`HardwareRelay`](traits::HardwareRelay)
//! - **Services**: optional web API and MQTT bridge
//!
//! ## Architecture
//!
//! - `types` - Ids and small value types
//! - `track` - Track segments and their state machine
//! - `route`, `accessory`, `feedback` - The other layout objects
//! - `selector` - Route ordering policies
//! - `layout` - Registry and boundary operations
//! - `persistence` - Entity stores and layout save/load
//! - `traits` - Hardware, observer and storage abstractions
//! - `hal` - Mock implementations for testing
//!
//! ## Example
//!
//! ```rust
//! use rs_railcontrol::{
//!     Layout, Loco, LocoId, RouteConfig, RouteId, SelectRouteApproach, TrackConfig, TrackId,
//! };
//!
//! let layout = Layout::new();
//! for (id, length) in [(1, 10), (2, 5), (3, 2), (4, 8)] {
//!     layout
//!         .add_track(TrackConfig::new(TrackId(id), format!("T{id}")).with_length(length))
//!         .unwrap();
//! }
//! for (id, to) in [(12, 2), (13, 3), (14, 4)] {
//!     layout
//!         .add_route(RouteConfig::new(RouteId(id), "out", TrackId(1), TrackId(to)))
//!         .unwrap();
//! }
//! layout.add_loco(Loco::new(LocoId(7), "BR 218"));
//!
//! let routes = layout.select_routes_for_loco(TrackId(1), LocoId(7), SelectRouteApproach::MinTrackLength);
//! assert_eq!(routes, vec![RouteId(13), RouteId(12), RouteId(14)]);
//!
//! assert!(layout.reserve_route(routes[0], LocoId(7)));
//! assert!(layout.lock_route(routes[0], LocoId(7)));
//! ```

#![warn(missing_docs)]

/// Switches, signals and plain accessories.
pub mod accessory;
/// Server configuration.
pub mod config;
/// Structural layout errors.
pub mod error;
/// Feedback sensors and locomotives.
pub mod feedback;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Layout registry and boundary operations.
pub mod layout;
/// Entity stores and layout save/load.
pub mod persistence;
/// Routes between track segments.
pub mod route;
/// Route ordering policies.
pub mod selector;
/// Track segments and their reservation state machine.
pub mod track;
/// Core traits for hardware, observers and storage.
pub mod traits;
/// Ids and small value types.
pub mod types;

/// Network services for HTTP API and MQTT (feature-gated).
#[cfg(any(feature = "web", feature = "mqtt"))]
pub mod services;

// Re-exports for convenience
pub use accessory::{Accessory, AccessoryConfig, AccessoryKind};
pub use config::{Config, LayoutConfig, MqttConfig, StorageConfig, WebConfig};
pub use error::LayoutError;
pub use feedback::{Feedback, FeedbackConfig, Loco};
pub use layout::Layout;
pub use persistence::{JsonFileStore, MemoryStore};
pub use route::{PushpullType, Relation, Route, RouteConfig, SpeedSensors};
pub use selector::SelectRouteApproach;
pub use track::{Track, TrackConfig, TrackKind, TrackSnapshot};
pub use traits::{
    AccessoryState, Address, EntityKey, EntityKind, EntityStore, Fields, HardwareError,
    HardwareRelay, NullPublisher, NullRelay, Protocol, StatePublisher,
};
pub use types::{
    AccessoryId, FeedbackId, FeedbackState, LockState, LocoId, Orientation, RouteId, TrackId,
};
