//! Streaming request body.

use crate::connection::RequestStream;
use crate::protocol::{Headers, Message, ParseError, PayloadItem};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::fmt;
use tracing::{error, trace};

/// The body of the request being served, read straight from the connection.
///
/// The body borrows the connection's request stream, so it must be fully read (or
/// [drained](RequestBody::drain)) before the next request on the connection can be decoded.
/// The connection drains whatever the handler left unread.
pub struct RequestBody<'conn> {
    stream: &'conn mut RequestStream,
    eof: bool,
    trailers: Headers,
}

impl fmt::Debug for RequestBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody").field("eof", &self.eof).field("trailers", &self.trailers).finish_non_exhaustive()
    }
}

impl<'conn> RequestBody<'conn> {
    pub(crate) fn new(stream: &'conn mut RequestStream) -> Self {
        Self { stream, eof: false, trailers: Headers::new() }
    }

    /// Reads the next piece of the body, `None` once it is complete.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ParseError> {
        if self.eof {
            return Ok(None);
        }

        match self.stream.next().await {
            Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => Ok(Some(bytes)),
            Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                self.eof = true;
                self.trailers = self.stream.decoder_mut().take_trailers();
                trace!(trailers = self.trailers.len(), "request body complete");
                Ok(None)
            }
            Some(Ok(Message::Header(_))) => {
                error!("received request head while reading a body");
                Err(ParseError::invalid_body("received request head while reading a body"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::PrematureEof),
        }
    }

    /// Reads the rest of the body into memory.
    pub async fn read_to_end(&mut self) -> Result<Bytes, ParseError> {
        let mut buf = BytesMut::new();
        while let Some(bytes) = self.chunk().await? {
            buf.extend_from_slice(&bytes);
        }
        Ok(buf.freeze())
    }

    /// Reads and discards the rest of the body, returning how many bytes were skipped.
    pub async fn drain(&mut self) -> Result<u64, ParseError> {
        let mut skipped = 0;
        while let Some(bytes) = self.chunk().await? {
            skipped += bytes.len() as u64;
        }
        if skipped > 0 {
            trace!(skipped, "drained unread request body");
        }
        Ok(skipped)
    }

    /// Whether the whole body has been read.
    pub fn is_finished(&self) -> bool {
        self.eof
    }

    /// Trailer fields of a chunked body; empty until the body is finished.
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }
}
