//! BlueRemote Shared Types
//!
//! This crate provides the types shared between the remote-control client
//! and the peripheral simulator: device identifiers, the serial port
//! profile service UUID, the signal vocabulary, the link state machine
//! and the inbound/outbound codec.

pub mod codec;
pub mod error;
pub mod state_machine;

use std::fmt;
use std::str::FromStr;

pub use error::LinkError;
pub use state_machine::{LinkState, LinkStateMachine, LinkTransition, TransitionResult};

/// Standard serial port profile (SPP) service class UUID.
///
/// The paired car firmware only answers on this service.
pub const SPP_SERVICE_UUID: uuid::Uuid = uuid::Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Opaque platform address of a remote peripheral (e.g. `AA:BB:CC:DD:EE:FF`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap a platform address. Surrounding whitespace is dropped.
    pub fn new(address: impl Into<String>) -> Self {
        let address: String = address.into();
        Self(address.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = DeviceId::new(s);
        if id.0.is_empty() {
            return Err(LinkError::InvalidDeviceId(s.to_string()));
        }
        Ok(id)
    }
}

/// Remote-control commands understood by the car firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    SpeedUp,
    SpeedDown,
    /// Hand driving over to the car's own logic
    AutoMode,
    /// Take driving back
    ManualMode,
    /// A user-bound reserved button
    Custom(char),
}

impl RemoteCommand {
    /// The single-character signal sent over the link
    pub fn signal_char(&self) -> char {
        match self {
            RemoteCommand::Forward => 'F',
            RemoteCommand::Backward => 'B',
            RemoteCommand::Left => 'L',
            RemoteCommand::Right => 'R',
            RemoteCommand::Stop => 'S',
            RemoteCommand::SpeedUp => '+',
            RemoteCommand::SpeedDown => '-',
            RemoteCommand::AutoMode => 'A',
            RemoteCommand::ManualMode => 'M',
            RemoteCommand::Custom(c) => *c,
        }
    }

    pub fn signal(&self) -> String {
        self.signal_char().to_string()
    }

    /// Command selected by the driving-mode switch
    pub fn mode(auto: bool) -> Self {
        if auto {
            RemoteCommand::AutoMode
        } else {
            RemoteCommand::ManualMode
        }
    }

    /// Map a received signal character back to a command
    pub fn from_signal(c: char) -> Self {
        match c {
            'F' => RemoteCommand::Forward,
            'B' => RemoteCommand::Backward,
            'L' => RemoteCommand::Left,
            'R' => RemoteCommand::Right,
            'S' => RemoteCommand::Stop,
            '+' => RemoteCommand::SpeedUp,
            '-' => RemoteCommand::SpeedDown,
            'A' => RemoteCommand::AutoMode,
            'M' => RemoteCommand::ManualMode,
            other => RemoteCommand::Custom(other),
        }
    }
}

/// Validate a reserved-button binding.
///
/// The input is trimmed and must then be exactly one character.
pub fn parse_reserved_signal(input: &str) -> Result<char, LinkError> {
    let mut chars = input.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(LinkError::InvalidSignal(input.to_string())),
    }
}
