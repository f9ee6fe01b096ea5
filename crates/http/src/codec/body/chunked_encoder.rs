use crate::codec::header::FastWrite;
use crate::protocol::{Headers, PayloadItem, SendError};
use bytes::BytesMut;
use std::io::Write;

use tokio_util::codec::Encoder;

/// Encodes a body with chunked transfer coding, one chunk per non-empty write.
///
/// Empty chunks are skipped since a zero size chunk terminates the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }

    /// Writes the terminal chunk followed by trailer fields.
    pub fn encode_trailers(&mut self, trailers: &Headers, dst: &mut BytesMut) {
        if self.eof {
            return;
        }
        self.eof = true;
        dst.extend_from_slice(b"0\r\n");
        trailers.write_to(dst);
    }
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<PayloadItem> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) if bytes.is_empty() => Ok(()),
            PayloadItem::Chunk(bytes) => {
                write!(FastWrite(dst), "{:X}\r\n", bytes.len())?;
                dst.reserve(bytes.len() + 2);
                dst.extend_from_slice(&bytes);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}
