//! Outbound state notifications.
//!
//! Segments publish a [`TrackSnapshot`] whenever their lock or occupancy
//! changes. Publishing is fire-and-forget and happens after the segment's
//! mutex has been released, so implementations may take their own locks but
//! must not block for long.

use crate::track::TrackSnapshot;

/// Receiver of segment state changes (web clients, MQTT, logging, ...).
pub trait StatePublisher: Send + Sync {
    /// Called after a segment's state changed.
    fn publish(&self, snapshot: &TrackSnapshot);
}

/// Publisher that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl StatePublisher for NullPublisher {
    fn publish(&self, _snapshot: &TrackSnapshot) {}
}
