//! Streaming content encoders for the response body.

use crate::encoding::{ContentCoding, Writer};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io;
use std::io::Write;
use tracing::trace;
use zstd::stream::write::Encoder as ZstdEncoder;

/// A content encoder writing its output into an in-memory [`Writer`].
///
/// Input is pushed with [`Encoder::write`], compressed output is collected with
/// [`Encoder::take`] and [`Encoder::finish`].
pub enum Encoder {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
    Zstd(ZstdEncoder<'static, Writer>),
    Br(Box<brotli::CompressorWriter<Writer>>),
}

impl Encoder {
    /// Creates the encoder for a coding; `identity` needs none.
    pub fn new(coding: ContentCoding) -> io::Result<Option<Self>> {
        let encoder = match coding {
            ContentCoding::Identity => return Ok(None),
            ContentCoding::Gzip => Self::Gzip(GzEncoder::new(Writer::new(), Compression::default())),
            ContentCoding::Deflate => Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::default())),
            ContentCoding::Zstd => Self::Zstd(ZstdEncoder::new(Writer::new(), 3)?),
            ContentCoding::Br => Self::Br(Box::new(brotli::CompressorWriter::new(
                Writer::new(),
                32 * 1024, // 32 KiB buffer
                3,         // BROTLI_PARAM_QUALITY
                22,        // BROTLI_PARAM_LGWIN
            ))),
        };
        Ok(Some(encoder))
    }

    pub fn coding(&self) -> ContentCoding {
        match self {
            Encoder::Gzip(_) => ContentCoding::Gzip,
            Encoder::Deflate(_) => ContentCoding::Deflate,
            Encoder::Zstd(_) => ContentCoding::Zstd,
            Encoder::Br(_) => ContentCoding::Br,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let result = match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
            Self::Zstd(encoder) => encoder.write_all(data),
            Self::Br(encoder) => encoder.write_all(data),
        };
        if let Err(e) = &result {
            trace!(coding = self.coding().name(), cause = %e, "error encoding body");
        }
        result
    }

    /// Takes the output produced so far.
    pub fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
            Self::Zstd(encoder) => encoder.get_mut().take(),
            Self::Br(encoder) => encoder.get_mut().take(),
        }
    }

    /// Completes the stream and returns the remaining output.
    pub fn finish(self) -> io::Result<Bytes> {
        match self {
            Self::Gzip(encoder) => encoder.finish().map(Writer::into_bytes),
            Self::Deflate(encoder) => encoder.finish().map(Writer::into_bytes),
            Self::Zstd(encoder) => encoder.finish().map(Writer::into_bytes),
            Self::Br(mut encoder) => {
                encoder.flush()?;
                Ok(encoder.into_inner().into_bytes())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use std::io::Read;

    fn encode(coding: ContentCoding, input: &[u8]) -> Vec<u8> {
        let mut encoder = Encoder::new(coding).unwrap().unwrap();
        let mut output = Vec::new();
        for chunk in input.chunks(1000) {
            encoder.write(chunk).unwrap();
            output.extend_from_slice(&encoder.take());
        }
        output.extend_from_slice(&encoder.finish().unwrap());
        output
    }

    #[test]
    fn gzip_and_deflate() {
        let input = "tern ".repeat(2000).into_bytes();

        let mut decoded = Vec::new();
        GzDecoder::new(&encode(ContentCoding::Gzip, &input)[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, input);

        let mut decoded = Vec::new();
        ZlibDecoder::new(&encode(ContentCoding::Deflate, &input)[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn zstd_and_br() {
        let input = "tern ".repeat(2000).into_bytes();

        let decoded = zstd::decode_all(&encode(ContentCoding::Zstd, &input)[..]).unwrap();
        assert_eq!(decoded, input);

        let mut decoded = Vec::new();
        brotli::Decompressor::new(&encode(ContentCoding::Br, &input)[..], 4096).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn identity_needs_no_encoder() {
        assert!(Encoder::new(ContentCoding::Identity).unwrap().is_none());
    }
}
