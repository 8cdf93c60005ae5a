//! Open link shared by the read loop and the writer
//!
//! Both halves reach the stream through one slot, so the manager can drop
//! the stream on `close()` without waiting for a pending read or write.

use crate::transport::LinkStream;
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

type Slot = Arc<Mutex<Option<LinkStream>>>;

fn released() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "link released")
}

/// Owner handle: releasing it drops the stream immediately
pub struct LinkSlot {
    slot: Slot,
}

impl LinkSlot {
    /// Split `stream` into the owner handle and its two halves
    pub fn open(stream: LinkStream) -> (Self, LinkReader, LinkWriter) {
        let slot = Arc::new(Mutex::new(Some(stream)));
        (
            Self { slot: slot.clone() },
            LinkReader { slot: slot.clone() },
            LinkWriter { slot },
        )
    }

    /// Drop the stream. Pending and later I/O on either half fails with
    /// `NotConnected`. Returns whether a stream was still held.
    pub fn release(&self) -> bool {
        let stream = self.slot.lock().take();
        stream.is_some()
    }
}

/// Inbound half, owned by the read loop
pub struct LinkReader {
    slot: Slot,
}

impl AsyncRead for LinkReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.slot.lock().as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Err(released())),
        }
    }
}

/// Outbound half, shared by senders behind the writer lock
pub struct LinkWriter {
    slot: Slot,
}

impl AsyncWrite for LinkWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.slot.lock().as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(released())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.slot.lock().as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Err(released())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.slot.lock().as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
