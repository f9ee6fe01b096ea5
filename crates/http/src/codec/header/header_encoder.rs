//! Encoder for the response status line and header block.
//!
//! Responses are always written as `HTTP/1.1`, whatever version the request used;
//! framing headers are decided by the response writer before encoding.

use crate::protocol::{Headers, SendError};

use bytes::{BufMut, BytesMut};
use http::StatusCode;
use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<(StatusCode, &Headers)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (StatusCode, &Headers), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (status, headers) = item;

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), reason_phrase(status))?;
        headers.write_to(dst);
        Ok(())
    }
}

/// The canonical reason phrase of a status, or a generic one for unregistered codes.
pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

/// Writes formatted output straight into a `BytesMut`.
pub(crate) struct FastWrite<'a>(pub &'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_status_and_headers() {
        let mut headers = Headers::new();
        headers.add("Content-Length", "2").unwrap();
        headers.add("X-Trace", "abc").unwrap();

        let mut dst = BytesMut::new();
        HeaderEncoder.encode((StatusCode::NOT_FOUND, &headers), &mut dst).unwrap();
        assert_eq!(&dst[..], b"HTTP/1.1 404 Not Found\r\nContent-Length: 2\r\nX-Trace: abc\r\n\r\n");
    }

    #[test]
    fn unknown_status() {
        let mut dst = BytesMut::new();
        let status = StatusCode::from_u16(599).unwrap();
        HeaderEncoder.encode((status, &Headers::new()), &mut dst).unwrap();
        assert_eq!(&dst[..], b"HTTP/1.1 599 Unknown Status\r\n\r\n");
    }
}
