//! Switches, signals and plain accessories.
//!
//! All three share one flat record tagged with an [`AccessoryKind`]; the kind
//! only changes how the two output states are named. Accessories can be
//! reserved and locked exactly like track segments so a route can claim the
//! switches and signals it sets.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::traits::{AccessoryState, Address, Protocol};
use crate::types::{AccessoryId, LockState, LocoId, Reservation};

/// What an accessory physically is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryKind {
    /// Generic two-state output (lights, uncoupler, ...).
    #[default]
    Accessory,
    /// Turnout.
    Switch,
    /// Signal.
    Signal,
}

impl AccessoryKind {
    /// Numeric form used in persisted fields.
    pub const fn as_u8(self) -> u8 {
        match self {
            AccessoryKind::Accessory => 0,
            AccessoryKind::Switch => 1,
            AccessoryKind::Signal => 2,
        }
    }

    /// Inverse of [`as_u8`](Self::as_u8).
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => AccessoryKind::Switch,
            2 => AccessoryKind::Signal,
            _ => AccessoryKind::Accessory,
        }
    }

    /// Kind-specific name of an output state.
    ///
    /// ```
    /// use rs_railcontrol::accessory::AccessoryKind;
    /// use rs_railcontrol::traits::AccessoryState;
    ///
    /// assert_eq!(AccessoryKind::Switch.state_name(AccessoryState::On), "turnout");
    /// assert_eq!(AccessoryKind::Signal.state_name(AccessoryState::Off), "stop");
    /// ```
    pub const fn state_name(self, state: AccessoryState) -> &'static str {
        match (self, state) {
            (AccessoryKind::Switch, AccessoryState::Off) => "straight",
            (AccessoryKind::Switch, AccessoryState::On) => "turnout",
            (AccessoryKind::Signal, AccessoryState::Off) => "stop",
            (AccessoryKind::Signal, AccessoryState::On) => "clear",
            (AccessoryKind::Accessory, AccessoryState::Off) => "off",
            (AccessoryKind::Accessory, AccessoryState::On) => "on",
        }
    }
}

/// Static configuration of an accessory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessoryConfig {
    /// Accessory id.
    pub id: AccessoryId,
    /// Display name.
    pub name: String,
    /// Switch, signal or plain accessory.
    #[serde(default)]
    pub kind: AccessoryKind,
    /// Decoder protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// Decoder address.
    pub address: Address,
    /// Last known output state.
    #[serde(default)]
    pub state: AccessoryState,
}

impl AccessoryConfig {
    /// Create a configuration with `Auto` protocol and `Off` state.
    pub fn new(id: AccessoryId, name: impl Into<String>, kind: AccessoryKind, address: Address) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            protocol: Protocol::Auto,
            address,
            state: AccessoryState::Off,
        }
    }

    /// Set the decoder protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }
}

#[derive(Debug)]
struct AccessoryInner {
    lock: LockState,
    state: AccessoryState,
}

/// A lockable switch, signal or accessory.
#[derive(Debug)]
pub struct Accessory {
    id: AccessoryId,
    name: String,
    kind: AccessoryKind,
    protocol: Protocol,
    address: Address,
    inner: Mutex<AccessoryInner>,
}

impl Accessory {
    /// Create from configuration; starts unreserved.
    pub fn new(config: AccessoryConfig) -> Self {
        Self {
            id: config.id,
            name: config.name,
            kind: config.kind,
            protocol: config.protocol,
            address: config.address,
            inner: Mutex::new(AccessoryInner {
                lock: LockState::Free,
                state: config.state,
            }),
        }
    }

    /// Accessory id.
    pub fn id(&self) -> AccessoryId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Switch, signal or plain accessory.
    pub fn kind(&self) -> AccessoryKind {
        self.kind
    }

    /// Decoder protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Decoder address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Last commanded output state.
    pub fn state(&self) -> AccessoryState {
        self.inner.lock().state
    }

    /// Record a commanded output state.
    pub fn set_state(&self, state: AccessoryState) {
        self.inner.lock().state = state;
    }

    /// Reservation state.
    pub fn lock_state(&self) -> LockState {
        self.inner.lock().lock
    }

    /// Reserve for `loco`; fails if held by another locomotive.
    #[must_use]
    pub fn reserve(&self, loco: LocoId) -> bool {
        self.try_reserve(loco).is_some()
    }

    pub(crate) fn try_reserve(&self, loco: LocoId) -> Option<Reservation> {
        let mut inner = self.inner.lock();
        let held = inner.lock.holder() == Some(loco);
        inner.lock.reserve(loco).then_some(if held {
            Reservation::Held
        } else {
            Reservation::New
        })
    }

    /// Lock for `loco`; requires a reservation by `loco`.
    #[must_use]
    pub fn lock(&self, loco: LocoId) -> bool {
        self.try_lock(loco).is_some()
    }

    /// Lock for `loco`. `Some(true)` if this call turned a reservation into
    /// a lock, `Some(false)` if `loco` already had it locked.
    pub(crate) fn try_lock(&self, loco: LocoId) -> Option<bool> {
        let mut inner = self.inner.lock();
        let newly = inner.lock == LockState::Reserved(loco);
        inner.lock.lock(loco).then_some(newly)
    }

    /// Step a lock by `loco` back to a reservation.
    #[must_use]
    pub fn unlock(&self, loco: LocoId) -> bool {
        self.inner.lock().lock.unlock(loco)
    }

    /// Release if held by `loco`.
    #[must_use]
    pub fn release(&self, loco: LocoId) -> bool {
        self.inner.lock().lock.release(loco)
    }

    /// Drop an unlocked reservation by `loco`.
    #[must_use]
    pub fn unreserve(&self, loco: LocoId) -> bool {
        self.inner.lock().lock.unreserve(loco)
    }

    /// Current configuration, for persistence.
    pub fn config(&self) -> AccessoryConfig {
        AccessoryConfig {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            protocol: self.protocol,
            address: self.address,
            state: self.state(),
        }
    }
}
