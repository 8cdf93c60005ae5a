//! TCP transport used to simulate the Bluetooth link during development

use crate::transport::traits::{LinkStream, TransportProvider, TransportStream};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use blueremote_shared::DeviceId;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

/// Default address of the peripheral simulator
pub const DEFAULT_SIMULATION_ADDRESS: &str = "127.0.0.1:9000";

/// TCP stream wrapper implementing TransportStream
pub struct TcpTransportStream {
    inner: TcpStream,
}

impl TcpTransportStream {
    pub fn new(stream: TcpStream) -> Self {
        Self { inner: stream }
    }
}

impl AsyncRead for TcpTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl TransportStream for TcpTransportStream {}

/// Connects every device id to one simulator address
pub struct TcpSimulationProvider {
    address: String,
}

impl TcpSimulationProvider {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Default for TcpSimulationProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATION_ADDRESS)
    }
}

#[async_trait]
impl TransportProvider for TcpSimulationProvider {
    async fn open_stream(&self, device: &DeviceId, _service: Uuid) -> Result<LinkStream> {
        debug!("[TCP] Simulating {} at {}", device, self.address);
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("connecting to simulator at {}", self.address))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpTransportStream::new(stream)))
    }

    fn name(&self) -> &'static str {
        "TCP simulation"
    }
}
