//! Incremental reader for a block of header fields terminated by an empty line.
//!
//! The same reader is used for request headers, chunked trailers and multipart part headers.
//! Lines end with CRLF; a bare LF is tolerated.

use crate::codec::header::{MAX_HEADER_LINES, MAX_LINE_SIZE};
use crate::protocol::{Header, Headers, ParseError};
use crate::utils::ensure;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDecoder {
    headers: Headers,
    lines: usize,
}

impl FieldDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FieldDecoder {
    type Item = Headers;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(line) = next_line(src, MAX_LINE_SIZE)? {
            if line.is_empty() {
                self.lines = 0;
                return Ok(Some(std::mem::take(&mut self.headers)));
            }

            self.lines += 1;
            ensure!(self.lines <= MAX_HEADER_LINES, ParseError::too_many_headers(MAX_HEADER_LINES));
            self.headers.merge(Header::parse_line(&line)?);
        }
        Ok(None)
    }
}

/// Splits the next line off `src`, without its CRLF or LF terminator.
///
/// Returns `None` while no complete line is buffered; fails once a line grows past `max_size`.
pub(crate) fn next_line(src: &mut BytesMut, max_size: usize) -> Result<Option<BytesMut>, ParseError> {
    match memchr::memchr(b'\n', src) {
        Some(index) => {
            let mut line = src.split_to(index + 1);
            line.truncate(index);
            if line.last() == Some(&b'\r') {
                line.truncate(index - 1);
            }
            ensure!(line.len() <= max_size, ParseError::too_large_header(line.len(), max_size));
            Ok(Some(line))
        }
        None => {
            ensure!(src.len() <= max_size, ParseError::too_large_header(src.len(), max_size));
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn read_block() {
        let str = indoc! {r##"
        Host: 127.0.0.1:8080
        Accept: text/html
        accept: application/json
        Content-Length: 3

        abc"##};

        let mut buf = BytesMut::from(str);
        let headers = FieldDecoder::new().decode(&mut buf).unwrap().unwrap();

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("host"), Some("127.0.0.1:8080"));
        assert_eq!(headers.get("Accept"), Some("text/html, application/json"));
        assert_eq!(&buf[..], b"abc");
    }

    #[test]
    fn partial_block() {
        let mut decoder = FieldDecoder::new();
        let mut buf = BytesMut::from(&b"Host: a\r\nX-Long: par"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"tial\r\n\r\n");
        let headers = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(headers.get("x-long"), Some("partial"));
        assert_eq!(headers.get("host"), Some("a"));
    }

    #[test]
    fn too_many_lines() {
        let mut block = String::new();
        for i in 0..=MAX_HEADER_LINES {
            block.push_str(&format!("X-H{i}: v\r\n"));
        }
        block.push_str("\r\n");

        let result = FieldDecoder::new().decode(&mut BytesMut::from(block.as_str()));
        assert!(matches!(result, Err(ParseError::TooManyHeaders { .. })));
    }

    #[test]
    fn too_long_line() {
        let line = format!("X-Big: {}", "a".repeat(MAX_LINE_SIZE));
        let result = FieldDecoder::new().decode(&mut BytesMut::from(line.as_str()));
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn folded_line_rejected() {
        let mut buf = BytesMut::from(&b"X-A: 1\r\n  continued\r\n\r\n"[..]);
        assert!(matches!(FieldDecoder::new().decode(&mut buf), Err(ParseError::InvalidHeader { .. })));
    }
}
