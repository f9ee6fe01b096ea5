//! Ordered, case-insensitive header container.
//!
//! Unlike `http::HeaderMap`, [`Headers`] keeps fields in insertion order and keeps the
//! original spelling of each name for output, while every lookup ignores ASCII case.

use crate::protocol::{HeaderError, ParseError};
use crate::utils::split_elements;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::time::SystemTime;

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    /// Creates a header field, trimming the value.
    ///
    /// Names must be non-empty tokens; neither part may contain line breaks.
    pub fn new(name: impl Into<String>, value: impl AsRef<str>) -> Result<Self, HeaderError> {
        let name = name.into();
        if name.is_empty() {
            return Err(HeaderError::EmptyName);
        }
        if name.bytes().any(|b| b <= b' ' || b == b':' || b == 0x7f) {
            return Err(HeaderError::InvalidName { name });
        }

        let value = value.as_ref().trim();
        if value.bytes().any(|b| b == b'\r' || b == b'\n') {
            return Err(HeaderError::InvalidValue { name });
        }

        Ok(Self { name, value: value.to_string() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Parses one wire header line (without its line terminator).
    ///
    /// The line must start with the field name and the name must be directly followed
    /// by a colon; obsolete line folding is rejected.
    pub fn parse_line(line: &[u8]) -> Result<Self, ParseError> {
        if line.first().is_some_and(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::invalid_header("header line starts with whitespace"));
        }

        let colon = line
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| ParseError::invalid_header(format!("missing colon in {:?}", latin1(line))))?;

        if colon > 0 && line[colon - 1].is_ascii_whitespace() {
            return Err(ParseError::invalid_header("whitespace before colon"));
        }

        Ok(Header::new(latin1(&line[..colon]), latin1(&line[colon + 1..]))?)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Decodes header bytes, falling back to ISO-8859-1 for non UTF-8 input.
pub(crate) fn latin1(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// An ordered collection of header fields with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.fields.iter()
    }

    /// Appends a field, keeping any existing fields of the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl AsRef<str>) -> Result<(), HeaderError> {
        self.fields.push(Header::new(name, value)?);
        Ok(())
    }

    /// Appends a field read off the wire; a repeated name has its value joined onto the
    /// earlier field with `", "`.
    pub(crate) fn merge(&mut self, header: Header) {
        match self.fields.iter_mut().find(|h| h.name.eq_ignore_ascii_case(&header.name)) {
            Some(existing) => {
                existing.value.push_str(", ");
                existing.value.push_str(&header.value);
            }
            None => self.fields.push(header),
        }
    }

    /// Returns the value of the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|h| h.name.eq_ignore_ascii_case(name)).map(Header::value)
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().filter(move |h| h.name.eq_ignore_ascii_case(name)).map(Header::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Parses the first field with the given name as an HTTP-date.
    pub fn get_date(&self, name: &str) -> Option<SystemTime> {
        self.get(name).and_then(|value| httpdate::parse_http_date(value).ok())
    }

    /// Removes the first field with the given name and appends a new one at the end.
    pub fn replace(&mut self, name: impl Into<String>, value: impl AsRef<str>) -> Result<Option<Header>, HeaderError> {
        let header = Header::new(name, value)?;
        let previous =
            self.fields.iter().position(|h| h.name.eq_ignore_ascii_case(&header.name)).map(|i| self.fields.remove(i));
        self.fields.push(header);
        Ok(previous)
    }

    /// Removes every field with the given name, returning the first one removed.
    pub fn remove(&mut self, name: &str) -> Option<Header> {
        let index = self.fields.iter().position(|h| h.name.eq_ignore_ascii_case(name))?;
        let first = self.fields.remove(index);
        self.fields.retain(|h| !h.name.eq_ignore_ascii_case(name));
        Some(first)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Parses the first field with the given name as a value followed by `;` separated parameters.
    pub fn params(&self, name: &str) -> Option<HeaderParams> {
        self.get(name).map(HeaderParams::parse)
    }

    /// Whether a comma separated field contains the given token, ignoring case.
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).flat_map(split_elements).any(|element| element.eq_ignore_ascii_case(token))
    }

    /// Serializes all fields followed by the terminating empty line.
    pub fn write_to(&self, dst: &mut BytesMut) {
        for header in &self.fields {
            dst.reserve(header.name.len() + header.value.len() + 4);
            dst.put_slice(header.name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(header.value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// A header value split into its primary value and `;` separated parameters,
/// e.g. `multipart/form-data; boundary="xyz"`.
///
/// Parameter names are lowercased and surrounding quotes are stripped from values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderParams {
    value: String,
    params: Vec<(String, String)>,
}

impl HeaderParams {
    pub fn parse(raw: &str) -> Self {
        let mut parts = split_params(raw).into_iter();
        let value = parts.next().unwrap_or_default().to_string();
        let params = parts
            .map(|param| match param.split_once('=') {
                Some((name, value)) => (name.trim().to_ascii_lowercase(), unquote(value.trim())),
                None => (param.to_ascii_lowercase(), String::new()),
            })
            .collect();
        Self { value, params }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

fn split_params(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, b) in raw.bytes().enumerate() {
        match b {
            b'"' => quoted = !quoted,
            b';' if !quoted => {
                parts.push(raw[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(raw[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}
