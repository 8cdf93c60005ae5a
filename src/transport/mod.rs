//! Transports that can carry the serial link
//!
//! - `rfcomm`: BlueZ RFCOMM sockets
//! - `serial`: kernel RFCOMM TTYs
//! - `tcp`: the peripheral simulator

pub mod paired;
pub mod rfcomm;
pub mod serial;
pub mod tcp;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use paired::paired_devices;
pub use rfcomm::{RfcommConfig, RfcommProvider};
pub use serial::{SerialConfig, SerialProvider, DEFAULT_BAUD_RATE};
pub use tcp::{TcpSimulationProvider, DEFAULT_SIMULATION_ADDRESS};
pub use traits::{LinkStream, TransportProvider};
