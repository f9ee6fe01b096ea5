use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{Headers, PayloadItem, PayloadSize, SendError};
use bytes::BytesMut;

use tokio_util::codec::Encoder;

/// Frames response body bytes according to the headers that were sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// content-length payload
    Length(LengthEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// no framing, the body ends when the connection closes
    UntilClose,

    /// no body may be sent, anything written is discarded
    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    /// Body delimited by closing the connection, for HTTP/1.0 bodies of unknown length.
    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::UntilClose | Kind::NoBody => true,
        }
    }

    /// Ends the body, emitting trailer fields when the body is chunked.
    ///
    /// Trailers are silently dropped for other framings.
    pub fn finish(&mut self, trailers: Option<&Headers>, dst: &mut BytesMut) -> Result<(), SendError> {
        match (&mut self.kind, trailers) {
            (Kind::Chunked(encoder), Some(trailers)) => {
                encoder.encode_trailers(trailers, dst);
                Ok(())
            }
            _ => self.encode(PayloadItem::Eof, dst),
        }
    }
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(n) => PayloadEncoder::fix_length(n),
            PayloadSize::Chunked => PayloadEncoder::chunked(),
            PayloadSize::Empty => PayloadEncoder::empty(),
        }
    }
}

impl Encoder<PayloadItem> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::UntilClose => {
                if let PayloadItem::Chunk(bytes) = item {
                    dst.extend_from_slice(&bytes);
                }
                Ok(())
            }
            Kind::NoBody => Ok(()),
        }
    }
}
