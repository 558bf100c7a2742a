//! Identifiers and small value types shared across the layout model.
//!
//! Every layout object is referenced by a typed numeric id. Objects never own
//! each other; the [`Layout`](crate::Layout) registry resolves ids on demand.

use core::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(
    /// Identifier of a track segment.
    TrackId,
    "T"
);
id_type!(
    /// Identifier of a route between two track segments.
    RouteId,
    "R"
);
id_type!(
    /// Identifier of a feedback (occupancy) sensor.
    FeedbackId,
    "F"
);
id_type!(
    /// Identifier of a switch, signal, or plain accessory.
    AccessoryId,
    "A"
);
id_type!(
    /// Identifier of a locomotive.
    LocoId,
    "L"
);

/// Occupancy reported by a feedback sensor, or aggregated over a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackState {
    /// Nothing detected.
    #[default]
    Free,
    /// A train (or anything conductive) is detected.
    Occupied,
}

impl FeedbackState {
    /// Returns the state as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            FeedbackState::Free => "free",
            FeedbackState::Occupied => "occupied",
        }
    }

    /// Parse a sensor state from text.
    ///
    /// Accepts `free`/`occupied`, `off`/`on` and `0`/`1`, trimmed and
    /// case-insensitive.
    ///
    /// ```
    /// use rs_railcontrol::FeedbackState;
    ///
    /// assert_eq!(FeedbackState::from_text("occupied"), Some(FeedbackState::Occupied));
    /// assert_eq!(FeedbackState::from_text(" 0 "), Some(FeedbackState::Free));
    /// assert_eq!(FeedbackState::from_text("maybe"), None);
    /// ```
    pub fn from_text(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "occupied" | "on" | "1" => Some(FeedbackState::Occupied),
            "free" | "off" | "0" => Some(FeedbackState::Free),
            _ => None,
        }
    }

    /// True if the state is [`Occupied`](Self::Occupied).
    #[inline]
    pub const fn is_occupied(&self) -> bool {
        matches!(self, FeedbackState::Occupied)
    }
}

/// Which way a locomotive faces on a segment, or which way a route leaves it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Facing the left end of the segment.
    Left,
    /// Facing the right end of the segment.
    #[default]
    Right,
}

impl Orientation {
    /// The opposite orientation.
    pub const fn flipped(self) -> Self {
        match self {
            Orientation::Left => Orientation::Right,
            Orientation::Right => Orientation::Left,
        }
    }

    /// Numeric form used in persisted fields.
    pub const fn as_u8(self) -> u8 {
        match self {
            Orientation::Left => 0,
            Orientation::Right => 1,
        }
    }

    /// Inverse of [`as_u8`](Self::as_u8); anything non-zero is `Right`.
    pub const fn from_u8(raw: u8) -> Self {
        if raw == 0 {
            Orientation::Left
        } else {
            Orientation::Right
        }
    }
}

/// Reservation state of a lockable layout object.
///
/// ```text
/// Free --reserve--> Reserved(loco) --lock--> Locked(loco)
///   ^                     |                       |
///   +------release--------+-----------------------+
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "loco", rename_all = "lowercase")]
pub enum LockState {
    /// Nobody holds the object.
    #[default]
    Free,
    /// Claimed by a locomotive, not yet exclusive-use.
    Reserved(LocoId),
    /// Exclusive use by a locomotive.
    Locked(LocoId),
}

impl LockState {
    /// The locomotive holding the object, if any.
    #[inline]
    pub const fn holder(&self) -> Option<LocoId> {
        match self {
            LockState::Free => None,
            LockState::Reserved(loco) | LockState::Locked(loco) => Some(*loco),
        }
    }

    /// True if held by a locomotive other than `loco`.
    #[inline]
    pub fn held_by_other(&self, loco: LocoId) -> bool {
        matches!(self.holder(), Some(holder) if holder != loco)
    }

    /// True if nobody holds the object.
    #[inline]
    pub const fn is_free(&self) -> bool {
        matches!(self, LockState::Free)
    }

    /// Try to reserve for `loco`.
    ///
    /// Succeeds from `Free`, and is a no-op success when `loco` already
    /// holds the object (a lock is never downgraded).
    #[must_use]
    pub fn reserve(&mut self, loco: LocoId) -> bool {
        match *self {
            LockState::Free => {
                *self = LockState::Reserved(loco);
                true
            }
            other => other.holder() == Some(loco),
        }
    }

    /// Try to lock for `loco`; requires a reservation by the same loco.
    #[must_use]
    pub fn lock(&mut self, loco: LocoId) -> bool {
        match *self {
            LockState::Reserved(holder) | LockState::Locked(holder) if holder == loco => {
                *self = LockState::Locked(loco);
                true
            }
            _ => false,
        }
    }

    /// Release if `loco` is the holder.
    #[must_use]
    pub fn release(&mut self, loco: LocoId) -> bool {
        if self.holder() != Some(loco) {
            return false;
        }
        *self = LockState::Free;
        true
    }

    /// Drop a reservation that was never locked.
    #[must_use]
    pub fn unreserve(&mut self, loco: LocoId) -> bool {
        if *self != LockState::Reserved(loco) {
            return false;
        }
        *self = LockState::Free;
        true
    }

    /// Step a lock by `loco` back to a reservation.
    #[must_use]
    pub fn unlock(&mut self, loco: LocoId) -> bool {
        if *self != LockState::Locked(loco) {
            return false;
        }
        *self = LockState::Reserved(loco);
        true
    }
}

/// How a successful reservation changed an item, so that a multi-item
/// reservation can put it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reservation {
    /// The item was free and is now reserved.
    New,
    /// The locomotive already held the item.
    Held,
    /// The locomotive already held the item and its pending deferred
    /// release was cancelled.
    HeldPendingCancelled,
}
