//! Content-coding negotiation and compression.
//!
//! The response writer negotiates a coding from the request's `Accept-Encoding` against
//! the configured codings, then streams the body through an [`Encoder`].

use crate::utils::split_elements;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io;
use std::str::FromStr;

mod encoder;

pub use encoder::Encoder;

/// A content coding the server can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCoding {
    Identity,
    Gzip,
    Deflate,
    Br,
    Zstd,
}

impl ContentCoding {
    pub fn name(&self) -> &'static str {
        match self {
            ContentCoding::Identity => "identity",
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
            ContentCoding::Br => "br",
            ContentCoding::Zstd => "zstd",
        }
    }
}

impl fmt::Display for ContentCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentCoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "identity" => Ok(ContentCoding::Identity),
            "gzip" | "x-gzip" => Ok(ContentCoding::Gzip),
            "deflate" => Ok(ContentCoding::Deflate),
            "br" => Ok(ContentCoding::Br),
            "zstd" => Ok(ContentCoding::Zstd),
            other => Err(format!("unsupported content coding {other:?}")),
        }
    }
}

/// Picks the coding to apply from an `Accept-Encoding` value.
///
/// Candidates are `identity` followed by `offered` in order; each gets the q-value the client
/// listed for it, or the `*` q-value when it is not listed. Codings the client did not accept
/// at all never win. The highest q-value wins, earlier candidates win ties. Without an
/// `Accept-Encoding` header only `identity` is acceptable.
pub fn negotiate(accept_encoding: Option<&str>, offered: &[ContentCoding]) -> ContentCoding {
    let Some(accept_encoding) = accept_encoding else {
        return ContentCoding::Identity;
    };

    let accepted: Vec<(&str, f32)> = split_elements(accept_encoding).into_iter().map(parse_quality).collect();
    let quality_of = |name: &str| {
        accepted
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .or_else(|| accepted.iter().find(|(n, _)| *n == "*"))
            .map(|(_, q)| *q)
    };

    let mut best = (ContentCoding::Identity, 0.0_f32);
    for coding in std::iter::once(ContentCoding::Identity).chain(offered.iter().copied()) {
        if let Some(q) = quality_of(coding.name())
            && q > best.1
        {
            best = (coding, q);
        }
    }
    best.0
}

/// Splits `gzip;q=0.5` into its name and q-value; a missing or malformed q-value counts as 1.
fn parse_quality(element: &str) -> (&str, f32) {
    let mut parts = element.split(';');
    let name = parts.next().unwrap_or_default().trim();
    let q = parts
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("q"))
        .map(|(_, v)| v.trim().parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0))
        .unwrap_or(1.0);
    (name, q)
}

/// Whether a content type matches one of the compressible patterns.
///
/// Patterns are matched against the type's essence; a leading `*` matches any prefix and a
/// trailing `*` any suffix, e.g. `text/*`, `*/json`, `*+xml`.
pub fn is_compressible(content_type: &str, patterns: &[String]) -> bool {
    let essence = match content_type.parse::<mime::Mime>() {
        Ok(mime) => mime.essence_str().to_string(),
        Err(_) => content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase(),
    };

    patterns.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        if pattern == "*" {
            true
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            essence.ends_with(suffix)
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            essence.starts_with(prefix)
        } else {
            essence == pattern
        }
    })
}

/// An in-memory sink the compressors write into.
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContentCoding::*;

    const OFFERED: [ContentCoding; 2] = [Gzip, Deflate];

    #[test]
    fn negotiation() {
        assert_eq!(negotiate(None, &OFFERED), Identity);
        assert_eq!(negotiate(Some("gzip, deflate, br"), &OFFERED), Gzip);
        assert_eq!(negotiate(Some("deflate"), &OFFERED), Deflate);
        assert_eq!(negotiate(Some("gzip;q=0.5, deflate;q=0.8"), &OFFERED), Deflate);
        assert_eq!(negotiate(Some("gzip, identity"), &OFFERED), Identity);
        assert_eq!(negotiate(Some("gzip;q=0, deflate;q=0"), &OFFERED), Identity);
        assert_eq!(negotiate(Some("*"), &OFFERED), Identity);
        assert_eq!(negotiate(Some("identity;q=0, *;q=0.5"), &OFFERED), Gzip);
        assert_eq!(negotiate(Some("br"), &OFFERED), Identity);
        assert_eq!(negotiate(Some("br, gzip;q=0.9"), &[Gzip, Br]), Br);
    }

    #[test]
    fn compressible_types() {
        let patterns: Vec<String> =
            ["text/*", "*/javascript", "*icon", "*+xml", "*/json"].iter().map(|s| s.to_string()).collect();
        assert!(is_compressible("text/html; charset=utf-8", &patterns));
        assert!(is_compressible("application/javascript", &patterns));
        assert!(is_compressible("image/x-icon", &patterns));
        assert!(is_compressible("image/svg+xml", &patterns));
        assert!(is_compressible("application/json", &patterns));
        assert!(!is_compressible("image/png", &patterns));
        assert!(!is_compressible("application/octet-stream", &patterns));
    }

    #[test]
    fn coding_names() {
        assert_eq!("GZIP".parse::<ContentCoding>(), Ok(Gzip));
        assert_eq!(Zstd.to_string(), "zstd");
        assert!("compress".parse::<ContentCoding>().is_err());
    }
}
