//! Decoder for the request head: the request line followed by the header block.
//!
//! The request line is `method SP target SP version`, tokens separated by runs of
//! whitespace. Empty lines before it are skipped. A line longer than [`MAX_LINE_SIZE`]
//! is rejected, as `414` when the target had already started and `400` otherwise.
//!
//! Once the head is complete the body framing is derived from `Transfer-Encoding`
//! (its final coding must be `chunked`) or `Content-Length` (default `0`).

use crate::codec::header::{FieldDecoder, MAX_LINE_SIZE};
use crate::protocol::{Headers, ParseError, PayloadSize, RequestHead};
use crate::utils::{ensure, split_elements};
use bytes::{Buf, BytesMut};
use http::{Method, Version};
use percent_encoding::percent_decode_str;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Default)]
pub struct HeaderDecoder {
    line: Option<RequestLine>,
    fields: FieldDecoder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestLine {
    method: Method,
    target: String,
    version: Version,
}

impl HeaderDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the request line has been read and the header block is still pending.
    pub fn is_reading_fields(&self) -> bool {
        self.line.is_some()
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.line.is_none() {
            match decode_request_line(src)? {
                Some(line) => self.line = Some(line),
                None => return Ok(None),
            }
        }

        let Some(headers) = self.fields.decode(src)? else {
            return Ok(None);
        };

        let Some(RequestLine { method, target, version }) = self.line.take() else {
            return Ok(None);
        };

        let payload_size = parse_payload(&headers)?;
        let (path, query) = parse_target(&target)?;
        trace!(%method, %target, ?payload_size, "decoded request head");

        Ok(Some((RequestHead::new(method, target, path, query, version, headers), payload_size)))
    }
}

fn decode_request_line(src: &mut BytesMut) -> Result<Option<RequestLine>, ParseError> {
    // skip empty lines preceding the request line
    loop {
        match src.first() {
            Some(b'\n') => src.advance(1),
            Some(b'\r') if src.get(1) == Some(&b'\n') => src.advance(2),
            Some(b'\r') if src.len() == 1 => return Ok(None),
            Some(_) => break,
            None => return Ok(None),
        }
    }

    let line_end = memchr::memchr(b'\n', src);
    let line_len = line_end.unwrap_or(src.len());
    if line_len > MAX_LINE_SIZE {
        return Err(line_too_long(&src[..line_len]));
    }

    let Some(line_end) = line_end else {
        return Ok(None);
    };

    let mut line = src.split_to(line_end + 1);
    line.truncate(line_end);
    if line.last() == Some(&b'\r') {
        line.truncate(line_end - 1);
    }

    parse_request_line(&line).map(Some)
}

fn line_too_long(line: &[u8]) -> ParseError {
    let mut tokens = line.split(|b| b.is_ascii_whitespace()).filter(|t| !t.is_empty());
    let method_done = line.iter().position(|b| b.is_ascii_whitespace()).is_some_and(|i| i > 0);
    if method_done && tokens.nth(1).is_some() {
        ParseError::UriTooLong { max_size: MAX_LINE_SIZE }
    } else {
        ParseError::invalid_request_line(format!("request line exceeds {MAX_LINE_SIZE} bytes"))
    }
}

fn parse_request_line(line: &[u8]) -> Result<RequestLine, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::invalid_request_line("request line is not valid UTF-8"))?;
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    let &[method, target, version] = tokens.as_slice() else {
        return Err(ParseError::invalid_request_line(format!("expected 3 tokens in {line:?}")));
    };

    let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;
    let version = parse_version(version)?;
    Ok(RequestLine { method, target: target.to_string(), version })
}

/// Parses a strict `HTTP/d.d` version token.
fn parse_version(token: &str) -> Result<Version, ParseError> {
    let invalid = || ParseError::invalid_request_line(format!("invalid version {token:?}"));
    let digits = token.strip_prefix("HTTP/").ok_or_else(invalid)?.as_bytes();
    let &[major, b'.', minor] = digits else {
        return Err(invalid());
    };
    ensure!(major.is_ascii_digit() && minor.is_ascii_digit(), invalid());

    match (major, minor) {
        (b'1', b'0') => Ok(Version::HTTP_10),
        (b'1', _) => Ok(Version::HTTP_11),
        _ => Err(ParseError::UnsupportedVersion { version: token.to_string() }),
    }
}

/// Splits a request target into its decoded path and raw query.
///
/// Accepts origin-form, absolute-form (scheme and authority are dropped) and `*`.
/// Repeated slashes in the path collapse into one, the query is left untouched.
pub(crate) fn parse_target(target: &str) -> Result<(String, Option<String>), ParseError> {
    if target == "*" {
        return Ok(("*".to_string(), None));
    }

    let origin = if target.starts_with('/') {
        target
    } else {
        let (scheme, rest) = target.split_once("://").ok_or_else(|| ParseError::invalid_uri(target))?;
        ensure!(
            !scheme.is_empty() && scheme.bytes().all(|b| b.is_ascii_alphanumeric() || b"+-.".contains(&b)),
            ParseError::invalid_uri(target)
        );
        match rest.find(['/', '?', '#']) {
            Some(index) => &rest[index..],
            None => "",
        }
    };

    let origin = origin.split('#').next().unwrap_or_default();
    let (raw_path, query) = match origin.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (origin, None),
    };

    let mut collapsed = String::with_capacity(raw_path.len() + 1);
    if !raw_path.starts_with('/') {
        collapsed.push('/');
    }
    for c in raw_path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }

    let path = percent_decode_str(&collapsed).decode_utf8_lossy().into_owned();
    Ok((path, query))
}

/// Determines the body framing of a request.
///
/// refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length>
fn parse_payload(headers: &Headers) -> Result<PayloadSize, ParseError> {
    let codings: Vec<&str> = headers.get_all("Transfer-Encoding").flat_map(split_elements).collect();
    if let Some(last) = codings.last() {
        return if last.eq_ignore_ascii_case("chunked") {
            Ok(PayloadSize::Chunked)
        } else {
            Err(ParseError::UnsupportedTransferEncoding { value: codings.join(", ") })
        };
    }

    match headers.get("Content-Length") {
        None => Ok(PayloadSize::Empty),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(0) => Ok(PayloadSize::Empty),
            Ok(length) => Ok(PayloadSize::Length(length)),
            Err(_) => Err(ParseError::invalid_content_length(format!("value {value} is not u64"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode_str(str: &str) -> Result<Option<(RequestHead, PayloadSize)>, ParseError> {
        HeaderDecoder::new().decode(&mut BytesMut::from(str))
    }

    #[test]
    fn test_bytes_mut_lens() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##};

        let mut bytes = BytesMut::from(str);
        let result = HeaderDecoder::new().decode(&mut bytes).unwrap();

        assert!(result.is_some());
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let (head, payload_size) = decode_str(str).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(head.method(), &Method::GET);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.path(), "/index.html");
        assert_eq!(head.query(), None);
        assert_eq!(head.headers().len(), 3);
        assert_eq!(head.headers().get("accept"), Some("*/*"));
        assert_eq!(head.headers().get("HOST"), Some("127.0.0.1:8080"));
        assert_eq!(head.headers().get("user-agent"), Some("curl/7.79.1"));
    }

    #[test]
    fn from_edge() {
        let str = indoc! {r##"
        GET /index/?a=1&b=2&a=3 HTTP/1.1
        Host: 127.0.0.1:8080
        Connection: keep-alive
        sec-ch-ua: "#Not_A Brand";v="99", "Microsoft Edge";v="109", "Chromium";v="109"
        sec-ch-ua-platform: "macOS"
        Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8
        Accept-Encoding: gzip, deflate, br
        Accept-Language: zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7

        "##};

        let (head, payload_size) = decode_str(str).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(head.path(), "/index/");
        assert_eq!(head.query(), Some("a=1&b=2&a=3"));
        assert_eq!(head.target(), "/index/?a=1&b=2&a=3");
        assert_eq!(head.headers().len(), 7);
        assert_eq!(
            head.headers().get("sec-ch-ua"),
            Some(r##""#Not_A Brand";v="99", "Microsoft Edge";v="109", "Chromium";v="109""##)
        );
        assert_eq!(head.headers().get("sec-ch-ua-platform"), Some("\"macOS\""));
        assert_eq!(head.headers().get("accept-encoding"), Some("gzip, deflate, br"));
    }

    #[test]
    fn skip_leading_empty_lines_and_whitespace_runs() {
        let (head, _) = decode_str("\r\n\r\nPOST   /upload \t HTTP/1.0\r\nHost: a\r\n\r\n").unwrap().unwrap();
        assert_eq!(head.method(), &Method::POST);
        assert_eq!(head.path(), "/upload");
        assert_eq!(head.version(), Version::HTTP_10);
    }

    #[test]
    fn partial_request_line() {
        let mut decoder = HeaderDecoder::new();
        let mut buf = BytesMut::from(&b"GET /ind"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(!decoder.is_reading_fields());

        buf.extend_from_slice(b"ex HTTP/1.1\r\nHost: a\r\n");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.is_reading_fields());

        buf.extend_from_slice(b"\r\n");
        let (head, _) = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(head.path(), "/index");
        assert!(!decoder.is_reading_fields());
    }

    #[test]
    fn request_line_errors() {
        assert!(matches!(decode_str("GET /\r\n\r\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode_str("GET / HTTP/1.1 extra\r\n\r\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode_str("GET / HTTP/1.10\r\n\r\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode_str("GET / http/1.1\r\n\r\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode_str("GET / HTTP/2.0\r\n\r\n"), Err(ParseError::UnsupportedVersion { .. })));
        assert!(matches!(decode_str("G(T / HTTP/1.1\r\n\r\n"), Err(ParseError::InvalidMethod)));
        assert!(matches!(decode_str("GET index HTTP/1.1\r\n\r\n"), Err(ParseError::InvalidUri { .. })));

        let (head, _) = decode_str("GET / HTTP/1.5\r\n\r\n").unwrap().unwrap();
        assert_eq!(head.version(), Version::HTTP_11);
    }

    #[test]
    fn too_long_line() {
        let long_target = format!("GET /{} HTTP/1.1\r\n", "a".repeat(MAX_LINE_SIZE));
        assert!(matches!(decode_str(&long_target), Err(ParseError::UriTooLong { .. })));

        let long_method = "A".repeat(MAX_LINE_SIZE + 1);
        assert!(matches!(decode_str(&long_method), Err(ParseError::InvalidRequestLine { .. })));
    }

    #[test]
    fn target_forms() {
        assert_eq!(parse_target("/a//b///c?x=//y").unwrap(), ("/a/b/c".to_string(), Some("x=//y".to_string())));
        assert_eq!(parse_target("http://example.com:8080/p%20q?z=1").unwrap(), ("/p q".to_string(), Some("z=1".to_string())));
        assert_eq!(parse_target("https://example.com").unwrap(), ("/".to_string(), None));
        assert_eq!(parse_target("/doc#frag").unwrap(), ("/doc".to_string(), None));
        assert_eq!(parse_target("*").unwrap(), ("*".to_string(), None));
        assert!(parse_target("example.com/x").is_err());
    }

    #[test]
    fn body_framing() {
        let (_, size) = decode_str("POST / HTTP/1.1\r\nContent-Length: 12\r\n\r\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Length(12));

        let (_, size) = decode_str("POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Chunked);

        let result = decode_str("POST / HTTP/1.1\r\nTransfer-Encoding: chunked, gzip\r\n\r\n");
        assert!(matches!(result, Err(ParseError::UnsupportedTransferEncoding { .. })));

        let result = decode_str("POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidContentLength { .. })));

        // repeated lengths are merged into one field and no longer parse
        let result = decode_str("POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 1\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn bad_header_line() {
        let result = decode_str("GET / HTTP/1.1\r\nHost : a\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHeader { .. })));
    }
}
