//! In-memory transport for exercising the connection manager

use crate::transport::traits::{LinkStream, TransportProvider, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use blueremote_shared::DeviceId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Faults {
    read: AtomicBool,
    write: AtomicBool,
}

/// Manager side of a mock link
pub struct MockStream {
    inner: DuplexStream,
    faults: Arc<Faults>,
    live: Arc<AtomicUsize>,
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.faults.read.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected read fault",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.faults.write.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write fault",
            )));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl TransportStream for MockStream {}

impl TransportStream for DuplexStream {}

/// Peripheral side of a mock link
pub struct MockPeer {
    pub device: DeviceId,
    pub service: Uuid,
    pub stream: DuplexStream,
    faults: Arc<Faults>,
}

impl MockPeer {
    /// Make the manager's next read fail
    pub async fn break_reads(&mut self) {
        self.faults.read.store(true, Ordering::SeqCst);
        // Wake the pending read so it observes the fault
        let _ = self.stream.write_all(b"\0").await;
    }

    /// Make every manager write fail
    pub fn break_writes(&self) {
        self.faults.write.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockState {
    failing: HashSet<String>,
    gates: HashMap<String, oneshot::Receiver<()>>,
}

/// Provider handing out duplex pipes; the peer ends arrive on a channel
pub struct MockProvider {
    state: Mutex<MockState>,
    peers: mpsc::UnboundedSender<MockPeer>,
    opened: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let provider = Self {
            state: Mutex::new(MockState::default()),
            peers,
            opened: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        };
        (Arc::new(provider), rx)
    }

    /// Opening `device` fails
    pub fn fail(&self, device: &str) {
        self.state.lock().failing.insert(device.to_string());
    }

    /// Opening `device` stays pending until the returned sender fires.
    /// Dropping the sender fails the open.
    pub fn hold(&self, device: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().gates.insert(device.to_string(), rx);
        tx
    }

    /// Streams successfully opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Streams currently alive on the manager side
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportProvider for MockProvider {
    async fn open_stream(&self, device: &DeviceId, service: Uuid) -> Result<LinkStream> {
        let gate = self.state.lock().gates.remove(device.as_str());
        if let Some(gate) = gate {
            gate.await.map_err(|_| anyhow!("{} went away", device))?;
        }

        if self.state.lock().failing.contains(device.as_str()) {
            return Err(anyhow!("{} unreachable", device));
        }

        let (local, remote) = tokio::io::duplex(4096);
        let faults = Arc::new(Faults::default());

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        let stream = MockStream {
            inner: local,
            faults: faults.clone(),
            live: self.live.clone(),
        };

        let _ = self.peers.send(MockPeer {
            device: device.clone(),
            service,
            stream: remote,
            faults,
        });
        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}
