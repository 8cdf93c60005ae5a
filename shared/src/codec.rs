//! Inbound/outbound codec for the raw serial byte stream
//!
//! Outbound signals are written verbatim as UTF-8 bytes. Inbound bytes are
//! decoded lossily as UTF-8 and split into messages according to
//! [`Framing`]:
//!
//! - [`Framing::Chunk`] (default): every non-empty read is one message, so a
//!   line split across two reads arrives as two messages.
//! - [`Framing::Line`]: reads are reassembled and one message is produced
//!   per `\n`-terminated line.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Default read buffer size for the inbound loop
pub const READ_BUFFER_SIZE: usize = 1024;

/// Longest pending line kept by [`Framing::Line`] before it is flushed as-is
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// How inbound bytes are split into messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One message per physical read
    #[default]
    Chunk,
    /// One message per newline-terminated line
    Line,
}

/// Encode an outbound signal
pub fn encode_signal(signal: &str) -> Bytes {
    Bytes::copy_from_slice(signal.as_bytes())
}

/// Decode one chunk of inbound bytes as text
pub fn decode_chunk(chunk: &[u8]) -> String {
    String::from_utf8_lossy(chunk).into_owned()
}

/// Length of `buf` without a trailing UTF-8 sequence that is still
/// missing continuation bytes
fn char_boundary(buf: &[u8]) -> usize {
    let tail = buf.len().saturating_sub(3);
    for i in (tail..buf.len()).rev() {
        let width = match buf[i] {
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if i + width > buf.len() { i } else { buf.len() };
    }
    buf.len()
}

/// Streaming decoder turning reads into inbound messages
#[derive(Debug, Default)]
pub struct InboundDecoder {
    framing: Framing,
    /// Partial line data being accumulated
    buffer: BytesMut,
}

impl InboundDecoder {
    /// Create a new decoder with the given framing
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: BytesMut::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Feed one read worth of bytes, returning the complete messages it yields
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }

        match self.framing {
            Framing::Chunk => vec![decode_chunk(chunk)],
            Framing::Line => {
                self.buffer.extend_from_slice(chunk);
                let mut messages = Vec::new();

                while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                    let line = self.buffer.split_to(pos + 1);
                    messages.push(decode_chunk(&line));
                }

                if self.buffer.len() > MAX_LINE_LEN {
                    let line = match char_boundary(&self.buffer) {
                        0 => self.buffer.split(),
                        end => self.buffer.split_to(end),
                    };
                    messages.push(decode_chunk(&line));
                }

                messages
            }
        }
    }

    /// Bytes held back waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}
