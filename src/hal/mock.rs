//! Mock implementations for testing without hardware.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockRelay`] | [`HardwareRelay`] | Records accessory commands, simulates failures |
//! | [`RecordingPublisher`] | [`StatePublisher`] | Captures published segment snapshots |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rs_railcontrol::hal::RecordingPublisher;
//! use rs_railcontrol::{LocoId, Track, TrackConfig, TrackId};
//!
//! let publisher = Arc::new(RecordingPublisher::new());
//! let track = Track::with_publisher(TrackConfig::new(TrackId(1), "T1"), publisher.clone());
//!
//! assert!(track.reserve(LocoId(7)));
//! assert!(track.lock(LocoId(7)));
//!
//! // Reserving is silent, locking publishes.
//! assert_eq!(publisher.count(), 1);
//! ```
//!
//! [`HardwareRelay`]: crate::traits::HardwareRelay
//! [`StatePublisher`]: crate::traits::StatePublisher

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::track::TrackSnapshot;
use crate::traits::{AccessoryState, Address, HardwareError, HardwareRelay, Protocol, StatePublisher};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock hardware relay.
///
/// Records every accepted command. Protocols can be marked unsupported, and
/// the next command can be made to fail.
///
/// # Example
///
/// ```rust
/// use rs_railcontrol::hal::MockRelay;
/// use rs_railcontrol::traits::{AccessoryState, HardwareRelay, Protocol};
///
/// let relay = MockRelay::new().without_protocol(Protocol::Sx);
/// assert!(!relay.supports_protocol(Protocol::Sx));
///
/// relay.fail_next();
/// assert!(relay.send_command(Protocol::Dcc, 3, AccessoryState::On).is_err());
/// assert!(relay.send_command(Protocol::Dcc, 3, AccessoryState::On).is_ok());
/// assert_eq!(relay.commands(), vec![(Protocol::Dcc, 3, AccessoryState::On)]);
/// ```
#[derive(Debug, Default)]
pub struct MockRelay {
    commands: Mutex<Vec<(Protocol, Address, AccessoryState)>>,
    unsupported: Vec<Protocol>,
    fail_next: AtomicBool,
}

impl MockRelay {
    /// Creates a relay that supports every protocol.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a protocol as unsupported.
    pub fn without_protocol(mut self, protocol: Protocol) -> Self {
        self.unsupported.push(protocol);
        self
    }

    /// Makes the next `send_command` fail with [`HardwareError::NotConnected`].
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Commands accepted so far, oldest first.
    pub fn commands(&self) -> Vec<(Protocol, Address, AccessoryState)> {
        self.commands.lock().clone()
    }

    /// Forgets recorded commands.
    pub fn clear(&self) {
        self.commands.lock().clear();
    }
}

impl HardwareRelay for MockRelay {
    fn supports_protocol(&self, protocol: Protocol) -> bool {
        !self.unsupported.contains(&protocol)
    }

    fn send_command(
        &self,
        protocol: Protocol,
        address: Address,
        state: AccessoryState,
    ) -> Result<(), HardwareError> {
        if !self.supports_protocol(protocol) {
            return Err(HardwareError::UnsupportedProtocol(protocol));
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(HardwareError::NotConnected);
        }
        self.commands.lock().push((protocol, address, state));
        Ok(())
    }
}

// ============================================================================
// Observer Mocks
// ============================================================================

/// Publisher that keeps every snapshot it receives.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    snapshots: Mutex<Vec<TrackSnapshot>>,
}

impl RecordingPublisher {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots published.
    pub fn count(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Most recent snapshot.
    pub fn last(&self) -> Option<TrackSnapshot> {
        self.snapshots.lock().last().cloned()
    }

    /// All snapshots, oldest first.
    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        self.snapshots.lock().clone()
    }

    /// Forgets recorded snapshots.
    pub fn clear(&self) {
        self.snapshots.lock().clear();
    }
}

impl StatePublisher for RecordingPublisher {
    fn publish(&self, snapshot: &TrackSnapshot) {
        self.snapshots.lock().push(snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{Track, TrackConfig};
    use crate::types::{LockState, LocoId, TrackId};

    #[test]
    fn relay_rejects_unsupported_protocol() {
        let relay = MockRelay::new().without_protocol(Protocol::Mm);
        assert_eq!(
            relay.send_command(Protocol::Mm, 1, AccessoryState::Off),
            Err(HardwareError::UnsupportedProtocol(Protocol::Mm))
        );
        assert!(relay.commands().is_empty());
    }

    #[test]
    fn relay_failure_is_one_shot() {
        let relay = MockRelay::new();
        relay.fail_next();
        assert_eq!(
            relay.send_command(Protocol::Dcc, 1, AccessoryState::On),
            Err(HardwareError::NotConnected)
        );
        assert!(relay.send_command(Protocol::Dcc, 1, AccessoryState::On).is_ok());
        relay.clear();
        assert!(relay.commands().is_empty());
    }

    #[test]
    fn publisher_records_in_order() {
        let publisher = std::sync::Arc::new(RecordingPublisher::new());
        let track = Track::with_publisher(TrackConfig::new(TrackId(1), "T1"), publisher.clone());
        assert!(track.reserve(LocoId(1)));
        assert!(track.lock(LocoId(1)));
        assert!(track.release(LocoId(1)));
        let locks: Vec<_> = publisher.snapshots().into_iter().map(|s| s.lock).collect();
        assert_eq!(locks, vec![LockState::Locked(LocoId(1)), LockState::Free]);
    }
}
