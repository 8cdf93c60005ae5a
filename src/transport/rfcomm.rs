//! RFCOMM transport implementation for Bluetooth serial links

use crate::transport::traits::{LinkStream, TransportProvider, TransportStream};
use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use blueremote_shared::DeviceId;
use bluer::rfcomm::{Profile, Role, SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::{Address, Session};
use futures::StreamExt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// RFCOMM stream wrapper implementing TransportStream
pub struct RfcommTransportStream {
    inner: RfcommStream,
    peer_addr: Address,
    /// Keeps the D-Bus session alive for as long as the link
    _session: Option<Session>,
}

impl RfcommTransportStream {
    /// Create a new RFCOMM transport stream
    pub fn new(stream: RfcommStream, peer_addr: Address) -> Self {
        Self {
            inner: stream,
            peer_addr,
            _session: None,
        }
    }

    fn with_session(stream: RfcommStream, peer_addr: Address, session: Session) -> Self {
        Self {
            inner: stream,
            peer_addr,
            _session: Some(session),
        }
    }

    /// Get the peer Bluetooth address
    pub fn peer_address(&self) -> Address {
        self.peer_addr
    }
}

impl AsyncRead for RfcommTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for RfcommTransportStream {
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

impl TransportStream for RfcommTransportStream {}

/// Configuration for the RFCOMM provider
#[derive(Debug, Clone, Default)]
pub struct RfcommConfig {
    /// Fixed RFCOMM channel. When unset the channel is resolved from the
    /// service UUID through a registered client profile.
    pub channel: Option<u8>,
}

/// RFCOMM provider for Bluetooth serial port links
pub struct RfcommProvider {
    config: RfcommConfig,
}

impl RfcommProvider {
    /// Create a new RFCOMM provider
    pub fn new(config: RfcommConfig) -> Self {
        Self { config }
    }

    async fn connect_channel(address: Address, channel: u8) -> Result<RfcommTransportStream> {
        let socket_addr = RfcommAddr::new(address, channel);
        debug!("[BT] Connecting to {} channel {}", address, channel);

        let stream = RfcommStream::connect(socket_addr)
            .await
            .map_err(|e| anyhow!("RFCOMM connect failed: {}", e))?;

        Ok(RfcommTransportStream::new(stream, address))
    }

    /// Resolve `service` on the remote device and connect to it
    async fn connect_profile(address: Address, service: Uuid) -> Result<RfcommTransportStream> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;

        let profile = Profile {
            uuid: service,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut requests = session
            .register_profile(profile)
            .await
            .context("registering serial port profile")?;

        let device = adapter.device(address)?;
        debug!("[BT] Connecting profile {} on {}", service, address);

        let connect = device.connect_profile(&service);
        tokio::pin!(connect);
        let mut connect_done = false;

        let request = loop {
            tokio::select! {
                result = &mut connect, if !connect_done => {
                    result.map_err(|e| anyhow!("Profile connect failed: {}", e))?;
                    connect_done = true;
                }
                request = requests.next() => match request {
                    Some(request) if request.device() == address => break request,
                    Some(request) => {
                        debug!("[BT] Ignoring profile connection from {}", request.device());
                    }
                    None => bail!("Profile registration closed"),
                },
            }
        };

        let stream = request.accept()?;
        Ok(RfcommTransportStream::with_session(stream, address, session))
    }
}

#[async_trait]
impl TransportProvider for RfcommProvider {
    async fn open_stream(&self, device: &DeviceId, service: Uuid) -> Result<LinkStream> {
        let address: Address = device
            .as_str()
            .parse()
            .map_err(|e| anyhow!("Invalid Bluetooth address {}: {}", device, e))?;

        let stream = match self.config.channel {
            Some(channel) => Self::connect_channel(address, channel).await?,
            None => Self::connect_profile(address, service).await?,
        };

        info!("[BT] Connected to {}", stream.peer_address());
        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}
