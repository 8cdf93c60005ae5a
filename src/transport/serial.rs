//! Serial device transport for links bound with `rfcomm bind` (e.g. /dev/rfcomm0)

use crate::transport::traits::{LinkStream, TransportProvider, TransportStream};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use blueremote_shared::DeviceId;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

impl TransportStream for SerialStream {}

/// Configuration for the serial device provider
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// TTY to open. When unset the device id itself is used as the path.
    pub path: Option<String>,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Opens a kernel-bound RFCOMM TTY as the link
pub struct SerialProvider {
    config: SerialConfig,
}

impl SerialProvider {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    fn path_for<'a>(&'a self, device: &'a DeviceId) -> &'a str {
        self.config.path.as_deref().unwrap_or_else(|| device.as_str())
    }
}

#[async_trait]
impl TransportProvider for SerialProvider {
    async fn open_stream(&self, device: &DeviceId, _service: Uuid) -> Result<LinkStream> {
        let path = self.path_for(device);
        debug!("[SERIAL] Opening {} at {} baud", path, self.config.baud_rate);

        let stream = tokio_serial::new(path, self.config.baud_rate)
            .open_native_async()
            .with_context(|| format!("opening serial device {}", path))?;
        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "Serial"
    }
}
