//! Feedback (occupancy) sensors and locomotives.
//!
//! Both are thin records: a sensor only remembers the last state the hardware
//! reported and which segment it belongs to; a locomotive only carries the
//! capabilities route selection looks at.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::traits::Address;
use crate::types::{FeedbackId, FeedbackState, LocoId, TrackId};

/// Static configuration of a sensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Sensor id.
    pub id: FeedbackId,
    /// Display name.
    pub name: String,
    /// Detector address on the feedback bus.
    pub address: Address,
}

impl FeedbackConfig {
    /// Create a configuration.
    pub fn new(id: FeedbackId, name: impl Into<String>, address: Address) -> Self {
        Self {
            id,
            name: name.into(),
            address,
        }
    }
}

#[derive(Debug, Default)]
struct FeedbackInner {
    state: FeedbackState,
    track: Option<TrackId>,
}

/// A binary occupancy detector.
#[derive(Debug)]
pub struct Feedback {
    config: FeedbackConfig,
    inner: Mutex<FeedbackInner>,
}

impl Feedback {
    /// Create a sensor reporting `Free` and attached to no segment.
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(FeedbackInner::default()),
        }
    }

    /// Sensor id.
    pub fn id(&self) -> FeedbackId {
        self.config.id
    }

    /// Static configuration.
    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Last reported state.
    pub fn state(&self) -> FeedbackState {
        self.inner.lock().state
    }

    /// Record a reported state; returns the previous one.
    pub fn set_state(&self, state: FeedbackState) -> FeedbackState {
        self.report(state, |_| true).0
    }

    /// Record a reported state and hand the owning segment to `forward`
    /// while the sensor is still held.
    ///
    /// Concurrent reports for one sensor therefore reach its segment in the
    /// order they were recorded here. `forward` must not report on this
    /// sensor again. Returns the previous state and `forward`'s result.
    pub fn report<F>(&self, state: FeedbackState, forward: F) -> (FeedbackState, bool)
    where
        F: FnOnce(Option<TrackId>) -> bool,
    {
        let mut inner = self.inner.lock();
        let previous = core::mem::replace(&mut inner.state, state);
        let owner = inner.track;
        (previous, forward(owner))
    }

    /// Owning segment, if any.
    pub fn track(&self) -> Option<TrackId> {
        self.inner.lock().track
    }

    /// Attach to `track`. Fails if already attached to another segment.
    #[must_use]
    pub fn attach(&self, track: TrackId) -> bool {
        let mut inner = self.inner.lock();
        match inner.track {
            Some(owner) if owner != track => false,
            _ => {
                inner.track = Some(track);
                true
            }
        }
    }

    /// Detach from `track` if attached to it.
    pub fn detach(&self, track: TrackId) {
        let mut inner = self.inner.lock();
        if inner.track == Some(track) {
            inner.track = None;
        }
    }
}

/// A locomotive as seen by route selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loco {
    /// Locomotive id.
    pub id: LocoId,
    /// Display name.
    pub name: String,
    /// Train length in layout units (0 = unknown).
    #[serde(default)]
    pub length: u16,
    /// Push-pull train: can run in either direction without turning.
    #[serde(default)]
    pub push_pull: bool,
}

impl Loco {
    /// Create a locomotive of unknown length without push-pull capability.
    pub fn new(id: LocoId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            length: 0,
            push_pull: false,
        }
    }

    /// Set the train length.
    pub fn with_length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    /// Set push-pull capability.
    pub fn with_push_pull(mut self, push_pull: bool) -> Self {
        self.push_pull = push_pull;
        self
    }
}
