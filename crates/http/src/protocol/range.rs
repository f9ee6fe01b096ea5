//! `Range` header parsing.

use crate::utils::split_elements;
use std::fmt;

/// An inclusive, zero-based span of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes in the span.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Whether any of the span lies within a resource of `length` bytes.
    pub fn is_satisfiable(&self, length: u64) -> bool {
        self.start < length
    }

    /// The `Content-Range` value announcing this span of a `total` byte resource.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }

    /// The `Content-Range` value of a 416 response.
    pub fn unsatisfied(total: u64) -> String {
        format!("bytes */{total}")
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Parses a `Range` value against a resource of `length` bytes.
///
/// Several ranges collapse into one span from the smallest start to the largest end. Ends
/// are clamped to the resource. Anything malformed yields `None`, meaning the header is to
/// be ignored. A span starting at or past `length` is returned as is; see
/// [`ByteRange::is_satisfiable`].
pub fn parse_range(value: &str, length: u64) -> Option<ByteRange> {
    let specs = value.trim().strip_prefix("bytes=")?;
    let last = length.checked_sub(1);

    let mut span: Option<(u64, u64)> = None;
    for spec in split_elements(specs) {
        let (first, second) = spec.split_once('-')?;
        let (first, second) = (first.trim(), second.trim());

        let (start, end) = match (first.is_empty(), second.is_empty()) {
            // suffix: the last N bytes
            (true, false) => {
                let suffix = parse_number(second)?;
                if suffix == 0 {
                    return None;
                }
                (length.saturating_sub(suffix), last.unwrap_or(0))
            }
            (false, true) => (parse_number(first)?, last.unwrap_or(0)),
            (false, false) => {
                let (start, end) = (parse_number(first)?, parse_number(second)?);
                if end < start {
                    return None;
                }
                (start, end)
            }
            (true, true) => return None,
        };

        span = Some(match span {
            Some((min, max)) => (min.min(start), max.max(end)),
            None => (start, end),
        });
    }

    let (start, end) = span?;
    let end = last.map_or(end, |last| end.min(last));
    Some(ByteRange::new(start, end.max(start)))
}

fn parse_number(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_ranges() {
        assert_eq!(parse_range("bytes=0-99", 1000), Some(ByteRange::new(0, 99)));
        assert_eq!(parse_range("bytes=-50", 1000), Some(ByteRange::new(950, 999)));
        assert_eq!(parse_range("bytes=900-", 1000), Some(ByteRange::new(900, 999)));
        assert_eq!(parse_range("bytes=900-5000", 1000), Some(ByteRange::new(900, 999)));
        assert_eq!(parse_range("bytes=-5000", 1000), Some(ByteRange::new(0, 999)));
    }

    #[test]
    fn unsatisfiable() {
        let range = parse_range("bytes=2000-", 1000).unwrap();
        assert!(!range.is_satisfiable(1000));
        assert_eq!(ByteRange::unsatisfied(1000), "bytes */1000");
        assert!(!parse_range("bytes=0-", 0).unwrap().is_satisfiable(0));
    }

    #[test]
    fn multiple_ranges_merge() {
        assert_eq!(parse_range("bytes=500-599, 0-99", 1000), Some(ByteRange::new(0, 599)));
        assert_eq!(parse_range("bytes=10-20,-100", 1000), Some(ByteRange::new(10, 999)));
    }

    #[test]
    fn malformed_is_ignored() {
        for value in ["bytes=", "bytes=a-b", "bytes=5-1", "bytes=-", "bytes=-0", "items=0-1", "bytes=1", "bytes=+1-2"] {
            assert_eq!(parse_range(value, 1000), None, "{value}");
        }
    }

    #[test]
    fn content_range() {
        let range = ByteRange::new(0, 99);
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(1000), "bytes 0-99/1000");
    }
}
