//! Trait definitions for the collaborators of the layout core.
//!
//! The core depends only on these abstractions:
//!
//! - `hardware`: command station access ([`HardwareRelay`])
//! - `observer`: outbound state notifications ([`StatePublisher`])
//! - `storage`: persistence of layout objects ([`EntityStore`])
//!
//! Mock implementations for tests live in [`crate::hal::mock`].

pub mod hardware;
pub mod observer;
pub mod storage;

pub use hardware::*;
pub use observer::*;
pub use storage::*;
