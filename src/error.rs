//! Configuration errors raised while building or editing a layout.
//!
//! Runtime reservation outcomes are plain `bool`s; only structural problems
//! (dangling references, duplicates, deleting something in use) are errors.

use core::fmt;

use crate::traits::{EntityKey, EntityKind};
use crate::types::{FeedbackId, TrackId};

/// Structural layout error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Referenced object does not exist.
    NotFound(EntityKey),
    /// An object with this id already exists.
    AlreadyExists(EntityKey),
    /// The object is held, pending release, or referenced by another object.
    InUse(EntityKey),
    /// The sensor already belongs to another segment.
    FeedbackInUse {
        /// Sensor being attached.
        feedback: FeedbackId,
        /// Segment that already owns it.
        owner: TrackId,
    },
    /// The same sensor appears more than once in a segment's sensor list.
    DuplicateFeedback {
        /// Repeated sensor.
        feedback: FeedbackId,
        /// Segment being configured.
        track: TrackId,
    },
    /// Segment length outside the configurable range.
    InvalidLength(u16),
    /// A persisted field is missing or malformed.
    InvalidField {
        /// Object being decoded.
        key: EntityKey,
        /// Offending field.
        field: &'static str,
    },
}

impl LayoutError {
    /// Shorthand for [`NotFound`](Self::NotFound).
    pub fn not_found(kind: EntityKind, id: u32) -> Self {
        Self::NotFound(EntityKey::new(kind, id))
    }

    /// Shorthand for [`AlreadyExists`](Self::AlreadyExists).
    pub fn already_exists(kind: EntityKind, id: u32) -> Self {
        Self::AlreadyExists(EntityKey::new(kind, id))
    }

    /// Shorthand for [`InUse`](Self::InUse).
    pub fn in_use(kind: EntityKind, id: u32) -> Self {
        Self::InUse(EntityKey::new(kind, id))
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "{} not found", key),
            Self::AlreadyExists(key) => write!(f, "{} already exists", key),
            Self::InUse(key) => write!(f, "{} is in use", key),
            Self::FeedbackInUse { feedback, owner } => {
                write!(f, "feedback {} already belongs to track {}", feedback, owner)
            }
            Self::DuplicateFeedback { feedback, track } => {
                write!(f, "feedback {} listed twice on track {}", feedback, track)
            }
            Self::InvalidLength(len) => write!(f, "invalid track length {}", len),
            Self::InvalidField { key, field } => write!(f, "{}: invalid field '{}'", key, field),
        }
    }
}

impl std::error::Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            LayoutError::not_found(EntityKind::Track, 3).to_string(),
            "track/3 not found"
        );
        assert_eq!(
            LayoutError::FeedbackInUse {
                feedback: FeedbackId(1),
                owner: TrackId(2)
            }
            .to_string(),
            "feedback F1 already belongs to track T2"
        );
    }
}
