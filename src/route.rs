//! Routes between track segments.
//!
//! A [`Route`] leaves one segment in a given orientation and arrives at
//! another, setting a list of [relations](Relation) on the way: accessories
//! that must be driven to a state, and intermediate segments that must be
//! claimed.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::traits::AccessoryState;
use crate::types::{AccessoryId, FeedbackId, Orientation, RouteId, TrackId};

/// Which trains a route accepts, by push-pull capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushpullType {
    /// Any train.
    #[default]
    Both,
    /// Push-pull trains only.
    Only,
    /// No push-pull trains.
    No,
}

impl PushpullType {
    /// Whether a train with the given push-pull capability may use the route.
    pub const fn accepts(self, push_pull: bool) -> bool {
        match self {
            PushpullType::Both => true,
            PushpullType::Only => push_pull,
            PushpullType::No => !push_pull,
        }
    }

    /// Numeric form used in persisted fields.
    pub const fn as_u8(self) -> u8 {
        match self {
            PushpullType::Both => 0,
            PushpullType::Only => 1,
            PushpullType::No => 2,
        }
    }

    /// Inverse of [`as_u8`](Self::as_u8).
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PushpullType::Only,
            2 => PushpullType::No,
            _ => PushpullType::Both,
        }
    }
}

/// One item a route claims on its way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Relation {
    /// Drive an accessory to a state.
    Accessory {
        /// Target accessory.
        id: AccessoryId,
        /// Required output state.
        state: AccessoryState,
    },
    /// Claim an intermediate segment.
    Track {
        /// Target segment.
        id: TrackId,
    },
}

/// Sensors that trigger speed steps while a train runs the route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpeedSensors {
    /// Slow to reduced speed.
    #[serde(default)]
    pub reduced: Option<FeedbackId>,
    /// Slow to creep speed.
    #[serde(default)]
    pub creep: Option<FeedbackId>,
    /// Stop.
    #[serde(default)]
    pub stop: Option<FeedbackId>,
    /// Overran the stop point.
    #[serde(default)]
    pub over: Option<FeedbackId>,
}

impl SpeedSensors {
    /// All configured sensors.
    pub fn iter(&self) -> impl Iterator<Item = FeedbackId> {
        [self.reduced, self.creep, self.stop, self.over]
            .into_iter()
            .flatten()
    }
}

/// Static configuration of a route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Route id.
    pub id: RouteId,
    /// Display name.
    pub name: String,
    /// Tie-break rank among routes of one segment (lower first).
    #[serde(default)]
    pub priority: u8,
    /// Source segment.
    pub from_track: TrackId,
    /// Orientation in which a train must leave the source.
    #[serde(default)]
    pub from_orientation: Orientation,
    /// Destination segment.
    pub to_track: TrackId,
    /// Orientation in which the train arrives at the destination.
    #[serde(default)]
    pub to_orientation: Orientation,
    /// Items to claim, in route order.
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Speed-step sensors.
    #[serde(default)]
    pub speed_sensors: SpeedSensors,
    /// Minimum train length (0 = unconstrained).
    #[serde(default)]
    pub min_train_length: u16,
    /// Maximum train length (0 = unconstrained).
    #[serde(default)]
    pub max_train_length: u16,
    /// Push-pull restriction.
    #[serde(default)]
    pub pushpull: PushpullType,
}

impl RouteConfig {
    /// Route from `from` to `to`, both in orientation `Right`, no relations.
    pub fn new(id: RouteId, name: impl Into<String>, from: TrackId, to: TrackId) -> Self {
        Self {
            id,
            name: name.into(),
            priority: 0,
            from_track: from,
            from_orientation: Orientation::Right,
            to_track: to,
            to_orientation: Orientation::Right,
            relations: Vec::new(),
            speed_sensors: SpeedSensors::default(),
            min_train_length: 0,
            max_train_length: 0,
            pushpull: PushpullType::Both,
        }
    }

    /// Set the tie-break rank.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the departure orientation.
    pub fn with_from_orientation(mut self, orientation: Orientation) -> Self {
        self.from_orientation = orientation;
        self
    }

    /// Set the arrival orientation.
    pub fn with_to_orientation(mut self, orientation: Orientation) -> Self {
        self.to_orientation = orientation;
        self
    }

    /// Append a relation.
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Set the speed-step sensors.
    pub fn with_speed_sensors(mut self, sensors: SpeedSensors) -> Self {
        self.speed_sensors = sensors;
        self
    }

    /// Set min/max train length (0 = unconstrained).
    pub fn with_train_length(mut self, min: u16, max: u16) -> Self {
        self.min_train_length = min;
        self.max_train_length = max;
        self
    }

    /// Set the push-pull restriction.
    pub fn with_pushpull(mut self, pushpull: PushpullType) -> Self {
        self.pushpull = pushpull;
        self
    }
}

/// A configured route plus its last-used stamp.
#[derive(Debug)]
pub struct Route {
    config: RouteConfig,
    last_used: AtomicU64,
}

impl Route {
    /// Wrap a configuration; the route starts as never used.
    pub fn new(config: RouteConfig) -> Self {
        Self {
            config,
            last_used: AtomicU64::new(0),
        }
    }

    /// Route id.
    #[inline]
    pub fn id(&self) -> RouteId {
        self.config.id
    }

    /// Static configuration.
    #[inline]
    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    /// Use-counter value when the route was last taken (0 = never).
    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Acquire)
    }

    /// Stamp the route as taken.
    pub fn mark_used(&self, stamp: u64) {
        self.last_used.store(stamp, Ordering::Release);
    }

    /// Whether a train of `length` fits (0 length = unknown, always fits).
    pub fn fits_length(&self, length: u16) -> bool {
        if length == 0 {
            return true;
        }
        let c = &self.config;
        (c.min_train_length == 0 || length >= c.min_train_length)
            && (c.max_train_length == 0 || length <= c.max_train_length)
    }

    /// Every segment the route touches: source, intermediates, destination.
    pub fn tracks(&self) -> impl Iterator<Item = TrackId> + '_ {
        let intermediates = self.config.relations.iter().filter_map(|r| match r {
            Relation::Track { id } => Some(*id),
            Relation::Accessory { .. } => None,
        });
        core::iter::once(self.config.from_track)
            .chain(intermediates)
            .chain(core::iter::once(self.config.to_track))
    }

    /// Accessories the route sets.
    pub fn accessories(&self) -> impl Iterator<Item = (AccessoryId, AccessoryState)> + '_ {
        self.config.relations.iter().filter_map(|r| match r {
            Relation::Accessory { id, state } => Some((*id, *state)),
            Relation::Track { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushpull_acceptance() {
        assert!(PushpullType::Both.accepts(true));
        assert!(PushpullType::Both.accepts(false));
        assert!(PushpullType::Only.accepts(true));
        assert!(!PushpullType::Only.accepts(false));
        assert!(!PushpullType::No.accepts(true));
        assert!(PushpullType::No.accepts(false));
    }

    #[test]
    fn train_length_bounds() {
        let route = Route::new(
            RouteConfig::new(RouteId(1), "r", TrackId(1), TrackId(2)).with_train_length(3, 6),
        );
        assert!(!route.fits_length(2));
        assert!(route.fits_length(3));
        assert!(route.fits_length(6));
        assert!(!route.fits_length(7));
        assert!(route.fits_length(0));

        let open = Route::new(RouteConfig::new(RouteId(2), "r", TrackId(1), TrackId(2)));
        assert!(open.fits_length(500));
    }

    #[test]
    fn tracks_and_accessories_in_order() {
        let route = Route::new(
            RouteConfig::new(RouteId(1), "r", TrackId(1), TrackId(3))
                .with_relation(Relation::Accessory {
                    id: AccessoryId(9),
                    state: AccessoryState::On,
                })
                .with_relation(Relation::Track { id: TrackId(2) }),
        );
        assert_eq!(
            route.tracks().collect::<Vec<_>>(),
            vec![TrackId(1), TrackId(2), TrackId(3)]
        );
        assert_eq!(
            route.accessories().collect::<Vec<_>>(),
            vec![(AccessoryId(9), AccessoryState::On)]
        );
    }

    #[test]
    fn last_used_stamp() {
        let route = Route::new(RouteConfig::new(RouteId(1), "r", TrackId(1), TrackId(2)));
        assert_eq!(route.last_used(), 0);
        route.mark_used(5);
        assert_eq!(route.last_used(), 5);
    }

    #[test]
    fn speed_sensor_iteration() {
        let sensors = SpeedSensors {
            reduced: Some(FeedbackId(1)),
            stop: Some(FeedbackId(3)),
            ..Default::default()
        };
        assert_eq!(sensors.iter().collect::<Vec<_>>(), vec![FeedbackId(1), FeedbackId(3)]);
    }
}
