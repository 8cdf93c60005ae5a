//! Transport trait abstraction for pluggable link backends

use anyhow::Result;
use async_trait::async_trait;
use blueremote_shared::DeviceId;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

/// A bidirectional byte stream to a peripheral
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// The open link as handed to the connection manager
pub type LinkStream = Box<dyn TransportStream>;

/// Platform provider that opens streams to peripherals
#[async_trait]
pub trait TransportProvider: Send + Sync + 'static {
    /// Open a stream to `device` bound to the `service` UUID.
    ///
    /// May block for as long as the platform takes to connect; callers race
    /// it against cancellation and drop the future to abort.
    async fn open_stream(&self, device: &DeviceId, service: Uuid) -> Result<LinkStream>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
