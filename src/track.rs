//! Track segments and their reservation state machine.
//!
//! A [`Track`] is the unit of mutual exclusion on the layout. Each segment
//! guards its whole state (holder, occupancy, deferred-release marker,
//! blocked flag) with its own mutex, so reservation calls from operator
//! threads and feedback events from hardware threads are linearised per
//! segment.
//!
//! # Lifecycle
//!
//! ```text
//! Free --reserve(L)--> Reserved(L) --lock(L)--> Locked(L)
//!   ^                                               |
//!   +---------------- release(L) -------------------+
//!                          |
//!        release_when_free && occupied: defer until
//!        the last sensor reports free
//! ```
//!
//! # Example
//!
//! ```rust
//! use rs_railcontrol::{LocoId, Track, TrackConfig, TrackId};
//!
//! let track = Track::new(TrackConfig::new(TrackId(1), "Platform 1"));
//! let loco = LocoId(7);
//!
//! assert!(track.reserve(loco));
//! assert!(track.lock(loco));
//! assert!(!track.reserve(LocoId(42)));
//! assert!(track.release(loco));
//! assert!(track.reserve(LocoId(42)));
//! ```

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::selector::SelectRouteApproach;
use crate::traits::{NullPublisher, StatePublisher};
use crate::types::{
    FeedbackId, FeedbackState, LockState, LocoId, Orientation, Reservation, RouteId, TrackId,
};

/// Shortest configurable segment length.
pub const MIN_LENGTH: u16 = 1;
/// Longest configurable segment length.
pub const MAX_LENGTH: u16 = 100;

/// Physical shape of a segment. Informational only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// Straight piece.
    #[default]
    Straight,
    /// Curve.
    Turn,
    /// Buffer stop.
    End,
    /// Bridge.
    Bridge,
    /// Tunnel.
    Tunnel,
    /// Tunnel portal.
    TunnelEnd,
    /// Off-screen link to another part of the layout.
    Link,
    /// Crossing, left-handed.
    CrossingLeft,
    /// Crossing, right-handed.
    CrossingRight,
    /// Crossing, symmetric.
    CrossingSymmetric,
}

impl TrackKind {
    const ALL: [TrackKind; 10] = [
        TrackKind::Straight,
        TrackKind::Turn,
        TrackKind::End,
        TrackKind::Bridge,
        TrackKind::Tunnel,
        TrackKind::TunnelEnd,
        TrackKind::Link,
        TrackKind::CrossingLeft,
        TrackKind::CrossingRight,
        TrackKind::CrossingSymmetric,
    ];

    /// Numeric form used in persisted fields.
    pub fn as_u8(self) -> u8 {
        Self::ALL.iter().position(|k| *k == self).unwrap_or(0) as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8); unknown values fall back to straight.
    pub fn from_u8(raw: u8) -> Self {
        Self::ALL.get(raw as usize).copied().unwrap_or_default()
    }
}

/// Static configuration of a segment, as loaded from or saved to storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Segment id.
    pub id: TrackId,
    /// Display name.
    pub name: String,
    /// Physical shape.
    #[serde(default)]
    pub kind: TrackKind,
    /// Length in layout units ([`MIN_LENGTH`]..=[`MAX_LENGTH`]).
    pub length: u16,
    /// Occupancy sensors, in order.
    #[serde(default)]
    pub feedbacks: Vec<FeedbackId>,
    /// Defer releases until the segment is physically clear.
    #[serde(default)]
    pub release_when_free: bool,
    /// Route-ordering override for routes leaving this segment.
    #[serde(default)]
    pub approach: SelectRouteApproach,
    /// Administratively disabled.
    #[serde(default)]
    pub blocked: bool,
    /// Orientation of the locomotive standing on the segment.
    #[serde(default)]
    pub orientation: Orientation,
}

impl TrackConfig {
    /// Minimal configuration: length 1, no sensors, system defaults.
    pub fn new(id: TrackId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: TrackKind::Straight,
            length: MIN_LENGTH,
            feedbacks: Vec::new(),
            release_when_free: false,
            approach: SelectRouteApproach::SystemDefault,
            blocked: false,
            orientation: Orientation::Right,
        }
    }

    /// Set the length.
    pub fn with_length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    /// Set the shape.
    pub fn with_kind(mut self, kind: TrackKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the occupancy sensors.
    pub fn with_feedbacks(mut self, feedbacks: impl Into<Vec<FeedbackId>>) -> Self {
        self.feedbacks = feedbacks.into();
        self
    }

    /// Defer releases until the segment is physically clear.
    pub fn with_release_when_free(mut self, release_when_free: bool) -> Self {
        self.release_when_free = release_when_free;
        self
    }

    /// Override the route-ordering approach.
    pub fn with_approach(mut self, approach: SelectRouteApproach) -> Self {
        self.approach = approach;
        self
    }

    /// Start blocked or unblocked.
    pub fn with_blocked(mut self, blocked: bool) -> Self {
        self.blocked = blocked;
        self
    }

    /// Set the locomotive orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }
}

/// Point-in-time view of a segment, handed to observers and the web API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    /// Segment id.
    pub id: TrackId,
    /// Display name.
    pub name: String,
    /// Reservation state.
    pub lock: LockState,
    /// Occupancy aggregated over all sensors.
    pub occupancy: FeedbackState,
    /// Occupancy as shown to operators: stays occupied until released.
    pub occupancy_delayed: FeedbackState,
    /// Administratively disabled.
    pub blocked: bool,
    /// Locomotive whose release waits for the segment to clear.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loco_delayed: Option<LocoId>,
    /// Whether releases are deferred while occupied.
    pub release_when_free: bool,
    /// Orientation of the locomotive on the segment.
    pub orientation: Orientation,
}

#[derive(Debug)]
struct TrackInner {
    name: String,
    kind: TrackKind,
    length: u16,
    sensors: Vec<(FeedbackId, FeedbackState)>,
    occupancy: FeedbackState,
    occupancy_delayed: FeedbackState,
    lock: LockState,
    orientation: Orientation,
    blocked: bool,
    loco_delayed: Option<LocoId>,
    release_when_free: bool,
    approach: SelectRouteApproach,
}

impl TrackInner {
    fn aggregate(&self) -> FeedbackState {
        if self.sensors.iter().any(|(_, s)| s.is_occupied()) {
            FeedbackState::Occupied
        } else {
            FeedbackState::Free
        }
    }

    fn refresh_delayed(&mut self) {
        if self.occupancy.is_occupied() {
            self.occupancy_delayed = FeedbackState::Occupied;
        } else if self.lock.is_free() {
            self.occupancy_delayed = FeedbackState::Free;
        }
    }
}

/// A reservable, lockable track segment.
///
/// All mutating methods take the segment mutex for their whole decision and
/// publish a [`TrackSnapshot`] only after dropping it.
pub struct Track {
    id: TrackId,
    inner: Mutex<TrackInner>,
    /// Routes touching this segment, ordered by priority then registration.
    routes: RwLock<Vec<(u8, RouteId)>>,
    publisher: Arc<dyn StatePublisher>,
}

impl core::fmt::Debug for Track {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl Track {
    /// Create a segment that publishes nowhere.
    pub fn new(config: TrackConfig) -> Self {
        Self::with_publisher(config, Arc::new(NullPublisher))
    }

    /// Create a segment that publishes state changes to `publisher`.
    ///
    /// All sensors start `Free`; use [`set_feedbacks`](Self::set_feedbacks)
    /// to seed known sensor states.
    pub fn with_publisher(config: TrackConfig, publisher: Arc<dyn StatePublisher>) -> Self {
        let sensors = config
            .feedbacks
            .iter()
            .map(|id| (*id, FeedbackState::Free))
            .collect();
        Self {
            id: config.id,
            inner: Mutex::new(TrackInner {
                name: config.name,
                kind: config.kind,
                length: config.length.clamp(MIN_LENGTH, MAX_LENGTH),
                sensors,
                occupancy: FeedbackState::Free,
                occupancy_delayed: FeedbackState::Free,
                lock: LockState::Free,
                orientation: config.orientation,
                blocked: config.blocked,
                loco_delayed: None,
                release_when_free: config.release_when_free,
                approach: config.approach,
            }),
            routes: RwLock::new(Vec::new()),
            publisher,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Segment id.
    #[inline]
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    /// Physical shape.
    pub fn kind(&self) -> TrackKind {
        self.inner.lock().kind
    }

    /// Length in layout units.
    pub fn length(&self) -> u16 {
        self.inner.lock().length
    }

    /// Sensor ids in configuration order.
    pub fn feedbacks(&self) -> Vec<FeedbackId> {
        self.inner.lock().sensors.iter().map(|(id, _)| *id).collect()
    }

    /// Reservation state.
    pub fn lock_state(&self) -> LockState {
        self.inner.lock().lock
    }

    /// Locomotive holding the segment, if any.
    pub fn holder(&self) -> Option<LocoId> {
        self.inner.lock().lock.holder()
    }

    /// Aggregated occupancy.
    pub fn occupancy(&self) -> FeedbackState {
        self.inner.lock().occupancy
    }

    /// Occupancy as shown to operators.
    pub fn occupancy_delayed(&self) -> FeedbackState {
        self.inner.lock().occupancy_delayed
    }

    /// Whether the segment is administratively disabled.
    pub fn blocked(&self) -> bool {
        self.inner.lock().blocked
    }

    /// Locomotive whose release is pending, if any.
    pub fn loco_delayed(&self) -> Option<LocoId> {
        self.inner.lock().loco_delayed
    }

    /// Whether releases are deferred while occupied.
    pub fn release_when_free(&self) -> bool {
        self.inner.lock().release_when_free
    }

    /// Orientation of the locomotive on the segment.
    pub fn orientation(&self) -> Orientation {
        self.inner.lock().orientation
    }

    /// Route-ordering override.
    pub fn approach(&self) -> SelectRouteApproach {
        self.inner.lock().approach
    }

    /// Held by a locomotive or waiting for a deferred release.
    pub fn is_in_use(&self) -> bool {
        let inner = self.inner.lock();
        !inner.lock.is_free() || inner.loco_delayed.is_some()
    }

    /// Current state for observers.
    pub fn snapshot(&self) -> TrackSnapshot {
        let inner = self.inner.lock();
        self.snapshot_of(&inner)
    }

    /// Current configuration, for persistence.
    pub fn config(&self) -> TrackConfig {
        let inner = self.inner.lock();
        TrackConfig {
            id: self.id,
            name: inner.name.clone(),
            kind: inner.kind,
            length: inner.length,
            feedbacks: inner.sensors.iter().map(|(id, _)| *id).collect(),
            release_when_free: inner.release_when_free,
            approach: inner.approach,
            blocked: inner.blocked,
            orientation: inner.orientation,
        }
    }

    fn snapshot_of(&self, inner: &TrackInner) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            name: inner.name.clone(),
            lock: inner.lock,
            occupancy: inner.occupancy,
            occupancy_delayed: inner.occupancy_delayed,
            blocked: inner.blocked,
            loco_delayed: inner.loco_delayed,
            release_when_free: inner.release_when_free,
            orientation: inner.orientation,
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Rename the segment.
    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.lock().name = name.into();
    }

    /// Change the shape.
    pub fn set_kind(&self, kind: TrackKind) {
        self.inner.lock().kind = kind;
    }

    /// Change the length, clamped to the valid range.
    pub fn set_length(&self, length: u16) {
        self.inner.lock().length = length.clamp(MIN_LENGTH, MAX_LENGTH);
    }

    /// Enable or disable deferred release.
    ///
    /// A release already pending stays pending until the segment clears.
    pub fn set_release_when_free(&self, release_when_free: bool) {
        self.inner.lock().release_when_free = release_when_free;
    }

    /// Change the route-ordering override.
    pub fn set_approach(&self, approach: SelectRouteApproach) {
        self.inner.lock().approach = approach;
    }

    /// Record which way the locomotive on the segment faces.
    pub fn set_orientation(&self, orientation: Orientation) {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.orientation == orientation {
                return;
            }
            inner.orientation = orientation;
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
    }

    /// Replace the sensor list together with each sensor's current state.
    ///
    /// Occupancy is recomputed; if the segment becomes free while a deferred
    /// release is pending, the release completes.
    pub fn set_feedbacks(&self, sensors: Vec<(FeedbackId, FeedbackState)>) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.sensors = sensors;
            if !self.apply_occupancy(&mut inner) {
                return;
            }
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
    }

    /// Administratively block or unblock the segment.
    ///
    /// Blocking does not affect a current holder; it only makes further
    /// [`reserve`](Self::reserve) calls fail.
    pub fn set_blocked(&self, blocked: bool) {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.blocked == blocked {
                return;
            }
            inner.blocked = blocked;
            debug!(track = %self.id, blocked, "blocked flag changed");
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
    }

    // ------------------------------------------------------------------
    // Route back-references
    // ------------------------------------------------------------------

    /// Register a route touching this segment. Returns false if already known.
    pub fn add_route(&self, route: RouteId, priority: u8) -> bool {
        let mut routes = self.routes.write();
        if routes.iter().any(|(_, id)| *id == route) {
            return false;
        }
        let pos = routes.partition_point(|(p, _)| *p <= priority);
        routes.insert(pos, (priority, route));
        true
    }

    /// Forget a route. Returns false if it was not registered.
    pub fn remove_route(&self, route: RouteId) -> bool {
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|(_, id)| *id != route);
        routes.len() != before
    }

    /// Registered routes in discovery order.
    pub fn routes(&self) -> Vec<RouteId> {
        self.routes.read().iter().map(|(_, id)| *id).collect()
    }

    // ------------------------------------------------------------------
    // Reservation state machine
    // ------------------------------------------------------------------

    /// Reserve the segment for `loco`.
    ///
    /// Fails if the segment is blocked or held by another locomotive.
    /// Reserving a segment already held by `loco` succeeds and cancels a
    /// deferred release that `loco` left pending.
    #[must_use]
    pub fn reserve(&self, loco: LocoId) -> bool {
        self.try_reserve(loco).is_some()
    }

    pub(crate) fn try_reserve(&self, loco: LocoId) -> Option<Reservation> {
        let mut inner = self.inner.lock();
        if inner.blocked {
            debug!(track = %self.id, %loco, "cannot reserve: blocked");
            return None;
        }
        let held = inner.lock.holder() == Some(loco);
        if !inner.lock.reserve(loco) {
            debug!(track = %self.id, %loco, holder = ?inner.lock.holder(), "cannot reserve: in use");
            return None;
        }
        if inner.loco_delayed == Some(loco) {
            inner.loco_delayed = None;
            debug!(track = %self.id, %loco, "pending release cancelled by new reservation");
            return Some(Reservation::HeldPendingCancelled);
        }
        Some(if held { Reservation::Held } else { Reservation::New })
    }

    /// Put back a deferred release of `loco` that a rolled-back route
    /// reservation cancelled.
    ///
    /// If the segment cleared in the meantime the release completes now.
    pub(crate) fn restore_pending_release(&self, loco: LocoId) {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.lock.holder() != Some(loco) || inner.loco_delayed.is_some() {
                return;
            }
            if inner.occupancy.is_occupied() {
                inner.loco_delayed = Some(loco);
                return;
            }
            inner.lock = LockState::Free;
            inner.refresh_delayed();
            info!(track = %self.id, %loco, "deferred release completed");
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
    }

    /// Reserve the segment for `loco`, overriding the blocked flag and any
    /// current holder.
    ///
    /// Halting a displaced locomotive is the caller's job.
    #[must_use]
    pub fn reserve_force(&self, loco: LocoId) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            let previous = inner.lock;
            if let Some(holder) = previous.holder().filter(|h| *h != loco) {
                warn!(track = %self.id, %loco, displaced = %holder, "forced reservation displaces holder");
            }
            inner.lock = LockState::Reserved(loco);
            inner.loco_delayed = None;
            if previous == inner.lock {
                return true;
            }
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
        true
    }

    /// Lock the segment for `loco`; requires a reservation by `loco`.
    #[must_use]
    pub fn lock(&self, loco: LocoId) -> bool {
        self.try_lock(loco).is_some()
    }

    /// Lock for `loco`. `Some(true)` if this call turned a reservation into
    /// a lock, `Some(false)` if `loco` already had it locked.
    pub(crate) fn try_lock(&self, loco: LocoId) -> Option<bool> {
        let (newly, snapshot) = {
            let mut inner = self.inner.lock();
            let newly = inner.lock == LockState::Reserved(loco);
            if !inner.lock.lock(loco) {
                debug!(track = %self.id, %loco, state = ?inner.lock, "cannot lock: not reserved by loco");
                return None;
            }
            (newly, self.snapshot_of(&inner))
        };
        self.publisher.publish(&snapshot);
        Some(newly)
    }

    /// Step a lock by `loco` back to a reservation.
    #[must_use]
    pub fn unlock(&self, loco: LocoId) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            if !inner.lock.unlock(loco) {
                return false;
            }
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
        true
    }

    /// Release the segment held by `loco`.
    ///
    /// With `release_when_free` set and the segment still occupied, the
    /// release is deferred: the holder stays in place, `loco_delayed` is
    /// recorded, and the release completes when the last sensor reports free.
    #[must_use]
    pub fn release(&self, loco: LocoId) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.lock.holder() != Some(loco) {
                warn!(track = %self.id, %loco, holder = ?inner.lock.holder(), "release by non-holder ignored");
                return false;
            }
            if inner.release_when_free && inner.occupancy.is_occupied() {
                inner.loco_delayed = Some(loco);
                debug!(track = %self.id, %loco, "release deferred until free");
            } else {
                inner.lock = LockState::Free;
                inner.loco_delayed = None;
                inner.refresh_delayed();
            }
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
        true
    }

    /// Free the segment regardless of holder or occupancy.
    #[must_use]
    pub fn release_force(&self, loco: LocoId) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            if let Some(holder) = inner.lock.holder().filter(|h| *h != loco) {
                info!(track = %self.id, %loco, released = %holder, "forced release of foreign holder");
            }
            inner.lock = LockState::Free;
            inner.loco_delayed = None;
            inner.refresh_delayed();
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
        true
    }

    /// Drop a reservation by `loco` that was never locked.
    ///
    /// Used to roll back partially reserved routes; never deferred.
    #[must_use]
    pub fn unreserve(&self, loco: LocoId) -> bool {
        let mut inner = self.inner.lock();
        if !inner.lock.unreserve(loco) {
            return false;
        }
        inner.refresh_delayed();
        true
    }

    /// Apply a sensor report.
    ///
    /// Returns false if the sensor does not belong to this segment. Applying
    /// the state a sensor already has is a no-op.
    #[must_use]
    pub fn set_feedback_state(&self, sensor: FeedbackId, state: FeedbackState) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            let mut known = false;
            let mut changed = false;
            for slot in inner.sensors.iter_mut().filter(|(id, _)| *id == sensor) {
                known = true;
                changed |= slot.1 != state;
                slot.1 = state;
            }
            if !known {
                warn!(track = %self.id, %sensor, "sensor does not belong to segment");
                return false;
            }
            if !changed || !self.apply_occupancy(&mut inner) {
                return true;
            }
            self.snapshot_of(&inner)
        };
        self.publisher.publish(&snapshot);
        true
    }

    /// Recompute occupancy from the sensors. Returns true if anything visible
    /// changed.
    fn apply_occupancy(&self, inner: &mut TrackInner) -> bool {
        let occupancy = inner.aggregate();
        if occupancy == inner.occupancy {
            return false;
        }
        inner.occupancy = occupancy;
        match occupancy {
            FeedbackState::Occupied => {
                if inner.lock.is_free() && !inner.blocked {
                    warn!(track = %self.id, "occupied without reservation; unregistered train?");
                }
            }
            FeedbackState::Free => {
                if let Some(loco) = inner.loco_delayed.take() {
                    if inner.lock.release(loco) {
                        info!(track = %self.id, %loco, "deferred release completed");
                    }
                }
            }
        }
        inner.refresh_delayed();
        true
    }
}
