//! Link error kinds

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised on the serial link.
///
/// Only `WriteFailed` and `NotConnected` ever reach a caller directly; the
/// others are logged and surface as a disconnect.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Read failed: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("Write failed: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid signal {0:?}: expected exactly one character")]
    InvalidSignal(String),

    #[error("Invalid device id {0:?}")]
    InvalidDeviceId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LinkError::InvalidSignal("XY".into());
        assert!(err.to_string().contains("exactly one character"));
    }
}
