//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module decodes bodies framed as described in
//! [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1):
//! a series of `size[;ext]CRLF data CRLF` chunks closed by a zero sized chunk,
//! optionally followed by trailer fields and a final empty line.
//!
//! Trailer fields are parsed with the same line rules as request headers and kept on the
//! decoder until [`ChunkedDecoder::take_trailers`] collects them.

use crate::codec::header::FieldDecoder;
use crate::protocol::{Headers, ParseError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    size_digits: usize,
    trailer_decoder: FieldDecoder,
    trailers: Headers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// LF closing the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after chunk data
    BodyCr,
    /// LF after chunk data
    BodyLf,
    /// Trailer fields up to the final empty line
    Trailers,
    /// The terminal chunk and its trailers were consumed
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: Size,
            remaining_size: 0,
            size_digits: 0,
            trailer_decoder: FieldDecoder::new(),
            trailers: Headers::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == End
    }

    /// Takes the trailer fields read after the terminal chunk.
    pub fn take_trailers(&mut self) -> Headers {
        std::mem::take(&mut self.trailers)
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut buf = None;

            self.state = match self.step(src, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::PrematureEof),
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

fn invalid(reason: &str) -> Poll<Result<ChunkedState, ParseError>> {
    Poll::Ready(Err(ParseError::invalid_body(reason)))
}

impl ChunkedDecoder {
    fn step(&mut self, src: &mut BytesMut, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        match self.state {
            Size => self.read_size(src),
            SizeLws => self.read_size_lws(src),
            Extension => Self::read_extension(src),
            SizeLf => self.read_size_lf(src),
            Body => self.read_body(src, buf),
            BodyCr => Self::read_body_cr(src),
            BodyLf => Self::read_body_lf(src),
            Trailers => self.read_trailers(src),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_size(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' if self.size_digits > 0 => return Poll::Ready(Ok(SizeLws)),
            b';' if self.size_digits > 0 => return Poll::Ready(Ok(Extension)),
            b'\r' if self.size_digits > 0 => return Poll::Ready(Ok(SizeLf)),
            b'\n' if self.size_digits > 0 => return Poll::Ready(Ok(self.after_size_line())),
            _ => return invalid("invalid chunk size line"),
        };

        self.size_digits += 1;
        match self.remaining_size.checked_mul(16).and_then(|size| size.checked_add(u64::from(digit))) {
            Some(size) => self.remaining_size = size,
            None => return invalid("chunk size overflow"),
        }
        Poll::Ready(Ok(Size))
    }

    fn read_size_lws(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            // whitespace may follow the size, digits may not
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Ok(self.after_size_line())),
            _ => invalid("invalid chunk size linear white space"),
        }
    }

    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        // extensions are ignored up to the end of the line
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => invalid("chunk extension contains a bare newline"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(self.after_size_line())),
            _ => invalid("invalid chunk size LF"),
        }
    }

    fn after_size_line(&mut self) -> ChunkedState {
        self.size_digits = 0;
        if self.remaining_size == 0 { Trailers } else { Body }
    }

    fn read_body(&mut self, src: &mut BytesMut, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        // cap remaining bytes at the max capacity of usize
        let remaining = usize::try_from(self.remaining_size).unwrap_or(usize::MAX);
        let read_size = std::cmp::min(remaining, src.len());

        self.remaining_size -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if self.remaining_size > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            b'\n' => Poll::Ready(Ok(Size)),
            _ => invalid("missing CRLF after chunk data"),
        }
    }

    fn read_body_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => invalid("missing CRLF after chunk data"),
        }
    }

    fn read_trailers(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match self.trailer_decoder.decode(src) {
            Ok(Some(trailers)) => {
                trace!(count = trailers.len(), "read chunked trailers");
                self.trailers = trailers;
                Poll::Ready(Ok(End))
            }
            Ok(None) => Poll::Pending,
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_chunk());
        assert_eq!(std::str::from_utf8(item.as_bytes().unwrap()).unwrap(), "1234567890abcdef");

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.is_finished());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_chunks() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b", world"));

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_chunks_with_extensions() {
        let mut buffer: BytesMut = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0;last\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_chunks_with_trailers() {
        let mut buffer: BytesMut =
            BytesMut::from(&b"5\r\nhello\r\n0\r\nChecksum: abc\r\nExpires: never\r\n\r\nGET / HTTP/1.1"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        let trailers = decoder.take_trailers();
        assert_eq!(trailers.get("checksum"), Some("abc"));
        assert_eq!(trailers.get("expires"), Some("never"));
        assert_eq!(&buffer[..], b"GET / HTTP/1.1");
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap();
        assert_eq!(chunk.unwrap().as_bytes().unwrap(), &Bytes::copy_from_slice(b"hel"));

        buffer.extend_from_slice(b"lo\r\n0\r\n");
        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"lo"));

        // the final empty line has not arrived yet
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::PrematureEof)));

        buffer.extend_from_slice(b"\r\n");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut BytesMut::from(&b"xyz\r\n"[..])).is_err());

        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut BytesMut::from(&b"\r\n"[..])).is_err());

        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut BytesMut::from(&b"fffffffffffffffff\r\n"[..])).is_err());
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidBody { .. })));
    }

    #[test]
    fn test_bare_lf_lines() {
        let mut buffer: BytesMut = BytesMut::from(&b"3\nabc\n0\n\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().as_ref(), b"abc");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_large_chunk() {
        let size = 1024 * 1024;
        let mut data = Vec::with_capacity(size + 16);
        data.extend(format!("{:x}\r\n", size).into_bytes());
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let mut buffer = BytesMut::from(&data[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().len(), size);
        assert!(chunk.as_bytes().unwrap().iter().all(|&b| b == b'A'));

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_zero_size_chunk() {
        let mut buffer: BytesMut = BytesMut::from(&b"0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.take_trailers().is_empty());
    }
}
