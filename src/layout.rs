//! The layout registry and its boundary operations.
//!
//! [`Layout`] owns every segment, route, accessory, sensor and locomotive,
//! indexed by id. Objects refer to each other only by id; the registry
//! resolves them per call and never holds a registry lock while talking to a
//! segment, so reservation traffic only contends on the segment mutexes.
//!
//! # Example
//!
//! ```rust
//! use rs_railcontrol::{
//!     FeedbackConfig, FeedbackId, FeedbackState, Layout, LockState, LocoId, TrackConfig, TrackId,
//! };
//!
//! let layout = Layout::new();
//! layout.add_feedback(FeedbackConfig::new(FeedbackId(1), "F1", 1)).unwrap();
//! layout
//!     .add_track(
//!         TrackConfig::new(TrackId(2), "T2")
//!             .with_feedbacks([FeedbackId(1)])
//!             .with_release_when_free(true),
//!     )
//!     .unwrap();
//!
//! let loco = LocoId(7);
//! assert!(layout.set_feedback_state(FeedbackId(1), FeedbackState::Occupied));
//! assert!(layout.reserve(TrackId(2), loco));
//! assert!(layout.lock(TrackId(2), loco));
//!
//! // Still occupied: the release is deferred.
//! assert!(layout.release(TrackId(2), loco));
//! assert_eq!(layout.track(TrackId(2)).unwrap().lock_state(), LockState::Locked(loco));
//!
//! // The train leaves; the release completes.
//! assert!(layout.set_feedback_state(FeedbackId(1), FeedbackState::Free));
//! assert_eq!(layout.track(TrackId(2)).unwrap().lock_state(), LockState::Free);
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use crate::accessory::{Accessory, AccessoryConfig};
use crate::error::LayoutError;
use crate::feedback::{Feedback, FeedbackConfig, Loco};
use crate::route::{Relation, Route, RouteConfig};
use crate::selector::{order_candidates, Candidate, SelectRouteApproach};
use crate::track::{Track, TrackConfig, TrackSnapshot, MAX_LENGTH, MIN_LENGTH};
use crate::traits::{
    EntityKind, HardwareRelay, NullPublisher, NullRelay, StatePublisher,
};
use crate::types::{
    AccessoryId, FeedbackId, FeedbackState, LocoId, Orientation, Reservation, RouteId, TrackId,
};

/// One lockable item along a route.
enum Claim {
    Track(Arc<Track>),
    Accessory(Arc<Accessory>),
}

impl Claim {
    fn holder(&self) -> Option<LocoId> {
        match self {
            Claim::Track(t) => t.holder(),
            Claim::Accessory(a) => a.lock_state().holder(),
        }
    }

    fn try_reserve(&self, loco: LocoId) -> Option<Reservation> {
        match self {
            Claim::Track(t) => t.try_reserve(loco),
            Claim::Accessory(a) => a.try_reserve(loco),
        }
    }

    /// Undo what [`try_reserve`](Self::try_reserve) did.
    fn undo_reserve(&self, loco: LocoId, reservation: Reservation) {
        match (self, reservation) {
            (_, Reservation::Held) => {}
            (Claim::Track(t), Reservation::New) => {
                let _ = t.unreserve(loco);
            }
            (Claim::Accessory(a), Reservation::New) => {
                let _ = a.unreserve(loco);
            }
            (Claim::Track(t), Reservation::HeldPendingCancelled) => t.restore_pending_release(loco),
            (Claim::Accessory(_), Reservation::HeldPendingCancelled) => {}
        }
    }

    fn try_lock(&self, loco: LocoId) -> Option<bool> {
        match self {
            Claim::Track(t) => t.try_lock(loco),
            Claim::Accessory(a) => a.try_lock(loco),
        }
    }

    fn unlock(&self, loco: LocoId) -> bool {
        match self {
            Claim::Track(t) => t.unlock(loco),
            Claim::Accessory(a) => a.unlock(loco),
        }
    }

    fn release(&self, loco: LocoId) -> bool {
        match self {
            Claim::Track(t) => t.release(loco),
            Claim::Accessory(a) => a.release(loco),
        }
    }
}

/// Registry of all layout objects.
pub struct Layout {
    default_approach: SelectRouteApproach,
    tracks: RwLock<BTreeMap<TrackId, Arc<Track>>>,
    routes: RwLock<BTreeMap<RouteId, Arc<Route>>>,
    accessories: RwLock<BTreeMap<AccessoryId, Arc<Accessory>>>,
    feedbacks: RwLock<BTreeMap<FeedbackId, Arc<Feedback>>>,
    locos: RwLock<BTreeMap<LocoId, Loco>>,
    relay: Arc<dyn HardwareRelay>,
    publisher: Arc<dyn StatePublisher>,
    use_counter: AtomicU64,
    rng: Mutex<StdRng>,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

impl Layout {
    /// Empty layout without hardware or observers.
    pub fn new() -> Self {
        Self {
            default_approach: SelectRouteApproach::DoNotCare,
            tracks: RwLock::new(BTreeMap::new()),
            routes: RwLock::new(BTreeMap::new()),
            accessories: RwLock::new(BTreeMap::new()),
            feedbacks: RwLock::new(BTreeMap::new()),
            locos: RwLock::new(BTreeMap::new()),
            relay: Arc::new(NullRelay),
            publisher: Arc::new(NullPublisher),
            use_counter: AtomicU64::new(0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Build an empty layout from configuration.
    pub fn from_config(config: &crate::config::LayoutConfig) -> Self {
        let layout = Self::new().with_default_approach(config.default_approach);
        match config.rng_seed {
            Some(seed) => layout.with_rng_seed(seed),
            None => layout,
        }
    }

    /// Set the hardware relay. Call before adding objects.
    pub fn with_relay(mut self, relay: Arc<dyn HardwareRelay>) -> Self {
        self.relay = relay;
        self
    }

    /// Set the state publisher. Call before adding segments; each segment
    /// keeps the publisher it was created with.
    pub fn with_publisher(mut self, publisher: Arc<dyn StatePublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Set the system default route-ordering approach.
    pub fn with_default_approach(mut self, approach: SelectRouteApproach) -> Self {
        self.default_approach = approach;
        self
    }

    /// Seed the generator used by [`SelectRouteApproach::Random`].
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// The system default approach.
    pub fn default_approach(&self) -> SelectRouteApproach {
        self.default_approach
    }

    /// Continue route stamps after the highest restored one.
    pub(crate) fn restore_use_counter(&self, highest: u64) {
        self.use_counter.fetch_max(highest, Ordering::AcqRel);
    }

    // ==================================================================
    // Lookup
    // ==================================================================

    /// Segment by id.
    pub fn track(&self, id: TrackId) -> Option<Arc<Track>> {
        self.tracks.read().get(&id).cloned()
    }

    /// Route by id.
    pub fn route(&self, id: RouteId) -> Option<Arc<Route>> {
        self.routes.read().get(&id).cloned()
    }

    /// Accessory by id.
    pub fn accessory(&self, id: AccessoryId) -> Option<Arc<Accessory>> {
        self.accessories.read().get(&id).cloned()
    }

    /// Sensor by id.
    pub fn feedback(&self, id: FeedbackId) -> Option<Arc<Feedback>> {
        self.feedbacks.read().get(&id).cloned()
    }

    /// Locomotive by id.
    pub fn loco(&self, id: LocoId) -> Option<Loco> {
        self.locos.read().get(&id).cloned()
    }

    /// All segment ids, ascending.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.read().keys().copied().collect()
    }

    /// All route ids, ascending.
    pub fn route_ids(&self) -> Vec<RouteId> {
        self.routes.read().keys().copied().collect()
    }

    /// All accessory ids, ascending.
    pub fn accessory_ids(&self) -> Vec<AccessoryId> {
        self.accessories.read().keys().copied().collect()
    }

    /// All sensor ids, ascending.
    pub fn feedback_ids(&self) -> Vec<FeedbackId> {
        self.feedbacks.read().keys().copied().collect()
    }

    /// All locomotives, ascending by id.
    pub fn locos(&self) -> Vec<Loco> {
        self.locos.read().values().cloned().collect()
    }

    /// Snapshots of every segment, ascending by id.
    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        let tracks: Vec<_> = self.tracks.read().values().cloned().collect();
        tracks.iter().map(|t| t.snapshot()).collect()
    }

    fn with_track<F>(&self, id: TrackId, op: &'static str, f: F) -> bool
    where
        F: FnOnce(&Track) -> bool,
    {
        match self.track(id) {
            Some(track) => f(&track),
            None => {
                warn!(track = %id, op, "unknown track");
                false
            }
        }
    }

    // ==================================================================
    // Segment reservation
    // ==================================================================

    /// Reserve `track` for `loco`. See [`Track::reserve`].
    #[must_use]
    pub fn reserve(&self, track: TrackId, loco: LocoId) -> bool {
        self.with_track(track, "reserve", |t| t.reserve(loco))
    }

    /// Reserve `track` for `loco`, overriding everything. See [`Track::reserve_force`].
    #[must_use]
    pub fn reserve_force(&self, track: TrackId, loco: LocoId) -> bool {
        self.with_track(track, "reserve_force", |t| t.reserve_force(loco))
    }

    /// Lock `track` for `loco`. See [`Track::lock`].
    #[must_use]
    pub fn lock(&self, track: TrackId, loco: LocoId) -> bool {
        self.with_track(track, "lock", |t| t.lock(loco))
    }

    /// Release `track` held by `loco`. See [`Track::release`].
    #[must_use]
    pub fn release(&self, track: TrackId, loco: LocoId) -> bool {
        self.with_track(track, "release", |t| t.release(loco))
    }

    /// Free `track` unconditionally. See [`Track::release_force`].
    #[must_use]
    pub fn release_force(&self, track: TrackId, loco: LocoId) -> bool {
        self.with_track(track, "release_force", |t| t.release_force(loco))
    }

    /// Block or unblock `track`. Returns false for an unknown segment.
    pub fn set_blocked(&self, track: TrackId, blocked: bool) -> bool {
        self.with_track(track, "set_blocked", |t| {
            t.set_blocked(blocked);
            true
        })
    }

    /// Record the orientation of the locomotive on `track`.
    pub fn set_orientation(&self, track: TrackId, orientation: Orientation) -> bool {
        self.with_track(track, "set_orientation", |t| {
            t.set_orientation(orientation);
            true
        })
    }

    // ==================================================================
    // Feedback
    // ==================================================================

    /// Apply a hardware sensor report.
    ///
    /// Returns false for an unknown sensor. Sensors attached to no segment
    /// only record their state. Reports for one sensor are applied to its
    /// segment one at a time, in the order the sensor recorded them.
    #[must_use]
    pub fn set_feedback_state(&self, sensor: FeedbackId, state: FeedbackState) -> bool {
        let Some(feedback) = self.feedback(sensor) else {
            warn!(%sensor, ?state, "unknown feedback");
            return false;
        };
        let (previous, applied) =
            feedback.report(state, |owner| match owner.and_then(|id| self.track(id)) {
                Some(track) => track.set_feedback_state(sensor, state),
                None => true,
            });
        if previous != state {
            trace!(%sensor, ?state, "feedback changed");
        }
        applied
    }

    // ==================================================================
    // Route selection
    // ==================================================================

    /// Valid routes leaving `track` for `loco`, ordered by `approach`.
    ///
    /// `SystemDefault` resolves to the segment's override, then to the
    /// layout default. Unknown segments yield an empty list. Unknown
    /// locomotives are treated as unknown length without push-pull.
    pub fn select_valid_routes(
        &self,
        track: TrackId,
        loco: LocoId,
        allow_loco_turn: bool,
        approach: SelectRouteApproach,
    ) -> Vec<RouteId> {
        let Some(source) = self.track(track) else {
            warn!(%track, "select routes on unknown track");
            return Vec::new();
        };
        let (length, push_pull) = self
            .loco(loco)
            .map(|l| (l.length, l.push_pull))
            .unwrap_or((0, false));
        let orientation = source.orientation();
        let approach = approach.resolve(&[source.approach(), self.default_approach]);

        let mut candidates = Vec::new();
        for route_id in source.routes() {
            let Some(route) = self.route(route_id) else {
                continue;
            };
            let config = route.config();
            if config.from_track != track {
                continue;
            }
            if config.from_orientation != orientation && !allow_loco_turn {
                trace!(route = %route_id, "skipped: orientation");
                continue;
            }
            let Some(destination_length) = self.destination_usable(config.to_track, loco) else {
                trace!(route = %route_id, "skipped: destination unavailable");
                continue;
            };
            if !self.relations_usable(&route, loco) {
                trace!(route = %route_id, "skipped: relation unavailable");
                continue;
            }
            if !route.fits_length(length) {
                trace!(route = %route_id, length, "skipped: train length");
                continue;
            }
            if !config.pushpull.accepts(push_pull) {
                trace!(route = %route_id, push_pull, "skipped: push-pull");
                continue;
            }
            candidates.push(Candidate {
                route: route_id,
                destination_length,
                last_used: route.last_used(),
            });
        }

        order_candidates(approach, &mut candidates, &mut *self.rng.lock());
        debug!(%track, %loco, ?approach, count = candidates.len(), "valid routes");
        candidates.into_iter().map(|c| c.route).collect()
    }

    /// Like [`select_valid_routes`](Self::select_valid_routes), allowing a
    /// turn when the locomotive is a push-pull train.
    pub fn select_routes_for_loco(
        &self,
        track: TrackId,
        loco: LocoId,
        approach: SelectRouteApproach,
    ) -> Vec<RouteId> {
        let allow_turn = self.loco(loco).map(|l| l.push_pull).unwrap_or(false);
        self.select_valid_routes(track, loco, allow_turn, approach)
    }

    /// Destination length if the segment could be claimed by `loco`.
    fn destination_usable(&self, id: TrackId, loco: LocoId) -> Option<u16> {
        let track = self.track(id)?;
        let snapshot = track.snapshot();
        if snapshot.blocked || snapshot.lock.held_by_other(loco) {
            return None;
        }
        Some(track.length())
    }

    fn relations_usable(&self, route: &Route, loco: LocoId) -> bool {
        route.config().relations.iter().all(|relation| match relation {
            Relation::Accessory { id, .. } => self.accessory(*id).is_some_and(|a| {
                !a.lock_state().held_by_other(loco) && self.relay.supports_protocol(a.protocol())
            }),
            Relation::Track { id } => self.track(*id).is_some_and(|t| {
                let snapshot = t.snapshot();
                !snapshot.blocked && !snapshot.lock.held_by_other(loco)
            }),
        })
    }

    // ==================================================================
    // Route reservation
    // ==================================================================

    /// Items a route claims, in order: relations, then the destination.
    fn claims(&self, route: &Route, include_destination: bool) -> Option<Vec<Claim>> {
        let config = route.config();
        let mut claims = Vec::with_capacity(config.relations.len() + 1);
        for relation in &config.relations {
            let claim = match relation {
                Relation::Accessory { id, .. } => Claim::Accessory(self.accessory(*id)?),
                Relation::Track { id } => Claim::Track(self.track(*id)?),
            };
            claims.push(claim);
        }
        if include_destination {
            claims.push(Claim::Track(self.track(config.to_track)?));
        }
        Some(claims)
    }

    /// Reserve every item of a route for `loco`, in route order.
    ///
    /// If any item fails, every item is put back the way this call found it
    /// and the call returns false: new reservations are dropped, and a
    /// deferred release that re-reserving cancelled is pending again.
    #[must_use]
    pub fn reserve_route(&self, route: RouteId, loco: LocoId) -> bool {
        let Some(r) = self.route(route) else {
            warn!(%route, "reserve unknown route");
            return false;
        };
        let Some(claims) = self.claims(&r, true) else {
            warn!(%route, "route references missing objects");
            return false;
        };

        let mut done: Vec<(&Claim, Reservation)> = Vec::with_capacity(claims.len());
        for claim in &claims {
            let Some(reservation) = claim.try_reserve(loco) else {
                debug!(%route, %loco, rolled_back = done.len(), "route reservation failed");
                for (claim, reservation) in done.into_iter().rev() {
                    claim.undo_reserve(loco, reservation);
                }
                return false;
            };
            done.push((claim, reservation));
        }
        debug!(%route, %loco, "route reserved");
        true
    }

    /// Lock every item of a route reserved by `loco` and set its accessories.
    ///
    /// Accessory commands go through the hardware relay after all items are
    /// locked; a failed command is logged and does not undo the lock. The
    /// route's last-used stamp is updated. If an item was taken away by a
    /// forced operation in between, the items this call locked go back to
    /// reserved and nothing is dispatched.
    #[must_use]
    pub fn lock_route(&self, route: RouteId, loco: LocoId) -> bool {
        let Some(r) = self.route(route) else {
            warn!(%route, "lock unknown route");
            return false;
        };
        let Some(claims) = self.claims(&r, true) else {
            warn!(%route, "route references missing objects");
            return false;
        };
        if claims.iter().any(|c| c.holder() != Some(loco)) {
            debug!(%route, %loco, "route lock failed: not reserved by loco");
            return false;
        }
        let mut locked: Vec<&Claim> = Vec::with_capacity(claims.len());
        for claim in &claims {
            match claim.try_lock(loco) {
                Some(true) => locked.push(claim),
                Some(false) => {}
                None => {
                    warn!(%route, %loco, rolled_back = locked.len(), "route lock lost a race");
                    for claim in locked.into_iter().rev() {
                        let _ = claim.unlock(loco);
                    }
                    return false;
                }
            }
        }

        for (id, state) in r.accessories() {
            let Some(accessory) = self.accessory(id) else {
                continue;
            };
            match self
                .relay
                .send_command(accessory.protocol(), accessory.address(), state)
            {
                Ok(()) => accessory.set_state(state),
                Err(e) => warn!(accessory = %id, error = %e, "accessory command failed"),
            }
        }

        let stamp = self.use_counter.fetch_add(1, Ordering::AcqRel) + 1;
        r.mark_used(stamp);
        info!(%route, %loco, "route locked");
        true
    }

    /// Release the relation items of a route held by `loco`.
    ///
    /// The destination segment stays with the locomotive. Intermediate
    /// segments follow [`Track::release`], so they may defer.
    #[must_use]
    pub fn release_route(&self, route: RouteId, loco: LocoId) -> bool {
        let Some(r) = self.route(route) else {
            warn!(%route, "release unknown route");
            return false;
        };
        let Some(claims) = self.claims(&r, false) else {
            warn!(%route, "route references missing objects");
            return false;
        };
        for claim in claims.iter().filter(|c| c.holder() == Some(loco)) {
            let _ = claim.release(loco);
        }
        debug!(%route, %loco, "route released");
        true
    }

    // ==================================================================
    // Configuration: sensors, accessories, locomotives
    // ==================================================================

    /// Register a sensor.
    pub fn add_feedback(&self, config: FeedbackConfig) -> Result<(), LayoutError> {
        let mut feedbacks = self.feedbacks.write();
        if feedbacks.contains_key(&config.id) {
            return Err(LayoutError::already_exists(EntityKind::Feedback, config.id.0));
        }
        feedbacks.insert(config.id, Arc::new(Feedback::new(config)));
        Ok(())
    }

    /// Remove a sensor that no segment or route references.
    pub fn delete_feedback(&self, id: FeedbackId) -> Result<(), LayoutError> {
        let feedback = self
            .feedback(id)
            .ok_or(LayoutError::not_found(EntityKind::Feedback, id.0))?;
        let used_by_route = self
            .routes
            .read()
            .values()
            .any(|r| r.config().speed_sensors.iter().any(|f| f == id));
        if feedback.track().is_some() || used_by_route {
            return Err(LayoutError::in_use(EntityKind::Feedback, id.0));
        }
        self.feedbacks.write().remove(&id);
        Ok(())
    }

    /// Register an accessory.
    pub fn add_accessory(&self, config: AccessoryConfig) -> Result<(), LayoutError> {
        let mut accessories = self.accessories.write();
        if accessories.contains_key(&config.id) {
            return Err(LayoutError::already_exists(EntityKind::Accessory, config.id.0));
        }
        accessories.insert(config.id, Arc::new(Accessory::new(config)));
        Ok(())
    }

    /// Remove an accessory that is unheld and not part of any route.
    pub fn delete_accessory(&self, id: AccessoryId) -> Result<(), LayoutError> {
        let accessory = self
            .accessory(id)
            .ok_or(LayoutError::not_found(EntityKind::Accessory, id.0))?;
        let used_by_route = self
            .routes
            .read()
            .values()
            .any(|r| r.accessories().any(|(a, _)| a == id));
        if !accessory.lock_state().is_free() || used_by_route {
            return Err(LayoutError::in_use(EntityKind::Accessory, id.0));
        }
        self.accessories.write().remove(&id);
        Ok(())
    }

    /// Register or replace a locomotive.
    pub fn add_loco(&self, loco: Loco) {
        self.locos.write().insert(loco.id, loco);
    }

    /// Remove a locomotive that holds no segment.
    pub fn delete_loco(&self, id: LocoId) -> Result<(), LayoutError> {
        if !self.locos.read().contains_key(&id) {
            return Err(LayoutError::not_found(EntityKind::Loco, id.0));
        }
        let tracks: Vec<_> = self.tracks.read().values().cloned().collect();
        if tracks
            .iter()
            .any(|t| t.holder() == Some(id) || t.loco_delayed() == Some(id))
        {
            return Err(LayoutError::in_use(EntityKind::Loco, id.0));
        }
        self.locos.write().remove(&id);
        Ok(())
    }

    // ==================================================================
    // Configuration: segments
    // ==================================================================

    fn check_length(length: u16) -> Result<(), LayoutError> {
        if (MIN_LENGTH..=MAX_LENGTH).contains(&length) {
            Ok(())
        } else {
            Err(LayoutError::InvalidLength(length))
        }
    }

    /// Attach `sensors` to `track`, returning each sensor with its current
    /// state. A sensor listed twice is an error. Nothing stays attached on
    /// failure.
    fn attach_feedbacks(
        &self,
        track: TrackId,
        sensors: &[FeedbackId],
    ) -> Result<Vec<(FeedbackId, FeedbackState)>, LayoutError> {
        if let Some(repeated) = sensors
            .iter()
            .enumerate()
            .find_map(|(i, id)| sensors[..i].contains(id).then_some(*id))
        {
            return Err(LayoutError::DuplicateFeedback {
                feedback: repeated,
                track,
            });
        }
        let mut attached: Vec<Arc<Feedback>> = Vec::new();
        let rollback = |attached: &[Arc<Feedback>]| {
            for f in attached {
                f.detach(track);
            }
        };
        for id in sensors {
            let Some(feedback) = self.feedback(*id) else {
                rollback(&attached);
                return Err(LayoutError::not_found(EntityKind::Feedback, id.0));
            };
            let was_ours = feedback.track() == Some(track);
            if !feedback.attach(track) {
                rollback(&attached);
                return Err(LayoutError::FeedbackInUse {
                    feedback: *id,
                    owner: feedback.track().unwrap_or(track),
                });
            }
            if !was_ours {
                attached.push(feedback);
            }
        }
        Ok(sensors
            .iter()
            .filter_map(|id| self.feedback(*id).map(|f| (*id, f.state())))
            .collect())
    }

    /// Register a segment; its sensors must exist and be unowned.
    pub fn add_track(&self, config: TrackConfig) -> Result<(), LayoutError> {
        Self::check_length(config.length)?;
        if self.tracks.read().contains_key(&config.id) {
            return Err(LayoutError::already_exists(EntityKind::Track, config.id.0));
        }
        let id = config.id;
        let sensors = self.attach_feedbacks(id, &config.feedbacks)?;
        let track = Track::with_publisher(config, Arc::clone(&self.publisher));
        track.set_feedbacks(sensors);

        let mut tracks = self.tracks.write();
        if tracks.contains_key(&id) {
            drop(tracks);
            for f in track.feedbacks() {
                if let Some(feedback) = self.feedback(f) {
                    feedback.detach(id);
                }
            }
            return Err(LayoutError::already_exists(EntityKind::Track, id.0));
        }
        tracks.insert(id, Arc::new(track));
        info!(track = %id, "track added");
        Ok(())
    }

    /// Apply a new configuration to an existing segment.
    ///
    /// Reservation state is kept. Sensors removed from the list are detached.
    pub fn update_track(&self, config: TrackConfig) -> Result<(), LayoutError> {
        Self::check_length(config.length)?;
        let track = self
            .track(config.id)
            .ok_or(LayoutError::not_found(EntityKind::Track, config.id.0))?;
        let old_sensors = track.feedbacks();
        let sensors = self.attach_feedbacks(config.id, &config.feedbacks)?;
        for removed in old_sensors.iter().filter(|f| !config.feedbacks.contains(f)) {
            if let Some(feedback) = self.feedback(*removed) {
                feedback.detach(config.id);
            }
        }

        track.set_name(config.name);
        track.set_kind(config.kind);
        track.set_length(config.length);
        track.set_release_when_free(config.release_when_free);
        track.set_approach(config.approach);
        track.set_orientation(config.orientation);
        track.set_blocked(config.blocked);
        track.set_feedbacks(sensors);
        Ok(())
    }

    /// Remove a segment that is unheld and has no routes.
    pub fn delete_track(&self, id: TrackId) -> Result<(), LayoutError> {
        let track = self
            .track(id)
            .ok_or(LayoutError::not_found(EntityKind::Track, id.0))?;
        if track.is_in_use() || !track.routes().is_empty() {
            return Err(LayoutError::in_use(EntityKind::Track, id.0));
        }
        for f in track.feedbacks() {
            if let Some(feedback) = self.feedback(f) {
                feedback.detach(id);
            }
        }
        self.tracks.write().remove(&id);
        info!(track = %id, "track deleted");
        Ok(())
    }

    // ==================================================================
    // Configuration: routes
    // ==================================================================

    /// Register a route; every referenced object must exist.
    pub fn add_route(&self, config: RouteConfig) -> Result<(), LayoutError> {
        if self.routes.read().contains_key(&config.id) {
            return Err(LayoutError::already_exists(EntityKind::Route, config.id.0));
        }
        for relation in &config.relations {
            if let Relation::Accessory { id, .. } = relation {
                if self.accessory(*id).is_none() {
                    return Err(LayoutError::not_found(EntityKind::Accessory, id.0));
                }
            }
        }
        for sensor in config.speed_sensors.iter() {
            if self.feedback(sensor).is_none() {
                return Err(LayoutError::not_found(EntityKind::Feedback, sensor.0));
            }
        }

        let route = Route::new(config);
        let mut touched = Vec::new();
        for id in route.tracks() {
            let track = self
                .track(id)
                .ok_or(LayoutError::not_found(EntityKind::Track, id.0))?;
            touched.push(track);
        }

        let id = route.id();
        let priority = route.config().priority;
        let mut routes = self.routes.write();
        if routes.contains_key(&id) {
            return Err(LayoutError::already_exists(EntityKind::Route, id.0));
        }
        routes.insert(id, Arc::new(route));
        drop(routes);
        for track in touched {
            track.add_route(id, priority);
        }
        info!(route = %id, "route added");
        Ok(())
    }

    /// Remove a route and its back-references.
    pub fn delete_route(&self, id: RouteId) -> Result<(), LayoutError> {
        let route = self
            .routes
            .write()
            .remove(&id)
            .ok_or(LayoutError::not_found(EntityKind::Route, id.0))?;
        for track_id in route.tracks() {
            if let Some(track) = self.track(track_id) {
                track.remove_route(id);
            }
        }
        info!(route = %id, "route deleted");
        Ok(())
    }
}
