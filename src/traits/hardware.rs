//! Hardware relay abstraction.
//!
//! The layout core never talks to a command station directly. Everything that
//! has to reach the rails goes through a [`HardwareRelay`], with one
//! implementation per vendor adapter (serial, TCP, ...). Feedback travels the
//! other way as `(sensor, state)` events handed to
//! [`Layout::set_feedback_state`](crate::Layout::set_feedback_state).
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`HardwareRelay`] | Send accessory commands, report protocol support |
//! | [`Protocol`] | Digital protocol an accessory decoder speaks |
//! | [`AccessoryState`] | Output state of a two-aspect accessory |
//! | [`NullRelay`] | Relay that accepts everything and does nothing |
//!
//! # Example
//!
//! ```rust
//! use rs_railcontrol::traits::{AccessoryState, HardwareRelay, Protocol};
//! use rs_railcontrol::hal::MockRelay;
//!
//! let relay = MockRelay::new();
//! relay.send_command(Protocol::Dcc, 12, AccessoryState::On).unwrap();
//! assert_eq!(relay.commands().len(), 1);
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

/// Decoder address on the track bus.
pub type Address = u16;

/// Digital protocol spoken by an accessory decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Protocol chosen by the command station.
    #[default]
    Auto,
    /// NMRA DCC.
    Dcc,
    /// Märklin Motorola.
    Mm,
    /// Selectrix.
    Sx,
}

impl Protocol {
    /// Numeric form used in persisted fields.
    pub const fn as_u8(self) -> u8 {
        match self {
            Protocol::Auto => 0,
            Protocol::Dcc => 1,
            Protocol::Mm => 2,
            Protocol::Sx => 3,
        }
    }

    /// Inverse of [`as_u8`](Self::as_u8).
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Protocol::Auto),
            1 => Some(Protocol::Dcc),
            2 => Some(Protocol::Mm),
            3 => Some(Protocol::Sx),
            _ => None,
        }
    }
}

/// Output state of a two-aspect accessory.
///
/// For switches `Off` is straight and `On` is turnout; for signals `Off` is
/// stop and `On` is clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryState {
    /// Straight / stop / off.
    #[default]
    Off,
    /// Turnout / clear / on.
    On,
}

impl AccessoryState {
    /// Numeric form used in persisted fields.
    pub const fn as_u8(self) -> u8 {
        match self {
            AccessoryState::Off => 0,
            AccessoryState::On => 1,
        }
    }

    /// Inverse of [`as_u8`](Self::as_u8); anything non-zero is `On`.
    pub const fn from_u8(raw: u8) -> Self {
        if raw == 0 {
            AccessoryState::Off
        } else {
            AccessoryState::On
        }
    }
}

/// Errors raised by a hardware relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// The relay has no adapter for the protocol.
    UnsupportedProtocol(Protocol),
    /// The adapter is not connected to its command station.
    NotConnected,
    /// The adapter failed to transmit the command.
    Transmit(String),
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedProtocol(p) => write!(f, "protocol {:?} not supported", p),
            Self::NotConnected => write!(f, "hardware not connected"),
            Self::Transmit(e) => write!(f, "transmit error: {}", e),
        }
    }
}

impl std::error::Error for HardwareError {}

/// Capability interface to the command station(s).
///
/// Implementations must be cheap to call from any thread; the layout calls
/// them after releasing its own locks.
pub trait HardwareRelay: Send + Sync {
    /// Whether any attached adapter can drive decoders of this protocol.
    fn supports_protocol(&self, protocol: Protocol) -> bool;

    /// Drive the decoder at `address` to `state`.
    fn send_command(
        &self,
        protocol: Protocol,
        address: Address,
        state: AccessoryState,
    ) -> Result<(), HardwareError>;
}

/// Relay used when no hardware is attached. Accepts every command.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRelay;

impl HardwareRelay for NullRelay {
    fn supports_protocol(&self, _protocol: Protocol) -> bool {
        true
    }

    fn send_command(
        &self,
        _protocol: Protocol,
        _address: Address,
        _state: AccessoryState,
    ) -> Result<(), HardwareError> {
        Ok(())
    }
}
