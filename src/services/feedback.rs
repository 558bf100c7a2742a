//! Feedback relay task.
//!
//! Hardware adapters, the MQTT bridge and the web API push
//! [`FeedbackEvent`]s into a bounded channel; one task applies them to the
//! layout in arrival order.
//! Reports for the same sensor are therefore never reordered.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::types::{FeedbackId, FeedbackState};

use super::shared::SharedLayoutState;

/// One sensor report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackEvent {
    /// Reporting sensor
    pub sensor: FeedbackId,
    /// Reported state
    pub state: FeedbackState,
}

/// Spawn the relay and register it with `state`. It stops when every
/// sender has been dropped.
pub fn spawn_feedback_relay(
    state: Arc<SharedLayoutState>,
    capacity: usize,
) -> (mpsc::Sender<FeedbackEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<FeedbackEvent>(capacity.max(1));
    state.set_feedback_sender(&tx);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if !state.layout().set_feedback_state(event.sensor, event.state) {
                debug!(sensor = %event.sensor, "feedback report not applied");
            }
        }
        info!("feedback relay stopped");
    });
    (tx, handle)
}
