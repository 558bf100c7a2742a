//! Shared layout state for all services.
//!
//! The web API, the MQTT bridge and the feedback relay all work on one
//! [`Layout`] behind an `Arc`. Segment state changes fan out to every service
//! through a [`BroadcastPublisher`] installed on the layout. Once a
//! [feedback relay](super::feedback) is running, every service can reach it
//! through [`SharedLayoutState::feedback_sender`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rs_railcontrol::services::{BroadcastPublisher, SharedLayoutState};
//! use rs_railcontrol::{Layout, LocoId, TrackConfig, TrackId};
//!
//! let events = BroadcastPublisher::new(64);
//! let layout = Layout::new().with_publisher(Arc::new(events.clone()));
//! layout.add_track(TrackConfig::new(TrackId(1), "T1")).unwrap();
//!
//! let state = Arc::new(SharedLayoutState::new(layout, events));
//! let mut rx = state.subscribe();
//!
//! assert!(state.layout().reserve(TrackId(1), LocoId(7)));
//! assert!(state.layout().lock(TrackId(1), LocoId(7)));
//! assert_eq!(rx.try_recv().unwrap().id, TrackId(1));
//! ```

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::layout::Layout;
use crate::track::TrackSnapshot;
use crate::traits::StatePublisher;

use super::feedback::FeedbackEvent;

// ============================================================================
// Broadcast Publisher
// ============================================================================

/// Publisher that forwards snapshots to a tokio broadcast channel.
///
/// Sending never blocks; with no subscribers snapshots are dropped, and slow
/// subscribers see `Lagged` and skip ahead.
#[derive(Clone, Debug)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<TrackSnapshot>,
}

impl BroadcastPublisher {
    /// Create a channel buffering up to `capacity` snapshots per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New receiver of future snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackSnapshot> {
        self.tx.subscribe()
    }
}

impl StatePublisher for BroadcastPublisher {
    fn publish(&self, snapshot: &TrackSnapshot) {
        if self.tx.send(snapshot.clone()).is_err() {
            trace!(track = %snapshot.id, "no subscribers for state change");
        }
    }
}

// ============================================================================
// Shared Layout State
// ============================================================================

/// Layout plus the event channel, shared by all services.
pub struct SharedLayoutState {
    layout: Layout,
    events: BroadcastPublisher,
    /// Weak so the relay still stops once its owners drop their senders.
    feedback: Mutex<Option<mpsc::WeakSender<FeedbackEvent>>>,
}

impl SharedLayoutState {
    /// Wrap a layout. `events` should be the publisher installed on it.
    pub fn new(layout: Layout, events: BroadcastPublisher) -> Self {
        Self {
            layout,
            events,
            feedback: Mutex::new(None),
        }
    }

    /// Sender into the running feedback relay, if there is one.
    pub fn feedback_sender(&self) -> Option<mpsc::Sender<FeedbackEvent>> {
        self.feedback.lock().as_ref().and_then(|tx| tx.upgrade())
    }

    pub(crate) fn set_feedback_sender(&self, tx: &mpsc::Sender<FeedbackEvent>) {
        *self.feedback.lock() = Some(tx.downgrade());
    }

    /// The layout.
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Receiver of segment state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackSnapshot> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::track::TrackConfig;
    use crate::types::{LockState, LocoId, TrackId};

    fn shared() -> SharedLayoutState {
        let events = BroadcastPublisher::new(8);
        let layout = Layout::new().with_publisher(Arc::new(events.clone()));
        layout.add_track(TrackConfig::new(TrackId(1), "T1")).unwrap();
        SharedLayoutState::new(layout, events)
    }

    #[test]
    fn subscribers_see_lock_changes() {
        let state = shared();
        let mut a = state.subscribe();
        let mut b = state.subscribe();
        assert!(state.layout().reserve(TrackId(1), LocoId(3)));
        assert!(state.layout().lock(TrackId(1), LocoId(3)));
        assert_eq!(a.try_recv().unwrap().lock, LockState::Locked(LocoId(3)));
        assert_eq!(b.try_recv().unwrap().lock, LockState::Locked(LocoId(3)));
    }

    #[test]
    fn feedback_sender_does_not_outlive_its_owner() {
        let state = shared();
        assert!(state.feedback_sender().is_none());
        let (tx, _rx) = mpsc::channel(1);
        state.set_feedback_sender(&tx);
        assert!(state.feedback_sender().is_some());
        drop(tx);
        assert!(state.feedback_sender().is_none());
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let state = shared();
        assert!(state.layout().reserve(TrackId(1), LocoId(3)));
        assert!(state.layout().lock(TrackId(1), LocoId(3)));

        // Late subscribers only see later changes.
        let mut late = state.subscribe();
        assert!(late.try_recv().is_err());
        assert!(state.layout().release(TrackId(1), LocoId(3)));
        assert_eq!(late.try_recv().unwrap().lock, LockState::Free);
    }
}
