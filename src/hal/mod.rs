//! In-process stand-ins for the layout's collaborators.
//!
//! - [`MockRelay`]: a command station that records accessory commands
//! - [`RecordingPublisher`]: an observer that keeps every published snapshot
//!
//! Real command-station adapters implement [`crate::traits::HardwareRelay`]
//! outside this crate.

pub mod mock;

pub use mock::*;
