//! Evaluation of conditional request headers and byte ranges (RFC 9110 section 13).
//!
//! Preconditions are evaluated in this order:
//!
//! 1. `If-Match`, falling back to `If-Unmodified-Since` when absent: a failure is `412`
//! 2. `If-None-Match`: a match is `304` for `GET`/`HEAD` and `412` otherwise
//! 3. `If-Modified-Since` when `If-None-Match` is absent, for `GET`/`HEAD` only: `304`
//!
//! A `GET`/`HEAD` that passes all preconditions and carries a `Range` header gets `206`,
//! or `416` when the range starts past the end, unless `If-Range` no longer matches.

use crate::date::truncate_to_secs;
use crate::protocol::range::{ByteRange, parse_range};
use crate::protocol::Headers;
use crate::utils::split_elements;
use http::{Method, StatusCode};
use std::time::SystemTime;

/// The validators of the resource a request targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validators<'a> {
    pub last_modified: Option<SystemTime>,
    pub etag: Option<&'a str>,
}

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub status: StatusCode,
    /// the span to send, set for `206`
    pub range: Option<ByteRange>,
}

/// Status implied by the precondition headers: `200`, `304` or `412`.
pub fn conditional_status(method: &Method, headers: &Headers, validators: Validators<'_>) -> StatusCode {
    let last_modified = validators.last_modified.map(truncate_to_secs);

    if let Some(if_match) = headers.get("if-match") {
        if !match_etag(true, if_match, validators.etag) {
            return StatusCode::PRECONDITION_FAILED;
        }
    } else if let (Some(since), Some(modified)) = (headers.get_date("if-unmodified-since"), last_modified)
        && modified > since
    {
        return StatusCode::PRECONDITION_FAILED;
    }

    let safe = matches!(*method, Method::GET | Method::HEAD);
    if let Some(if_none_match) = headers.get("if-none-match") {
        if match_etag(false, if_none_match, validators.etag) {
            return if safe { StatusCode::NOT_MODIFIED } else { StatusCode::PRECONDITION_FAILED };
        }
    } else if safe
        && let (Some(since), Some(modified)) = (headers.get_date("if-modified-since"), last_modified)
        && modified <= since
    {
        return StatusCode::NOT_MODIFIED;
    }

    StatusCode::OK
}

/// The span a `Range` header selects, or `None` when the whole resource is to be sent.
///
/// The header is ignored when malformed, or when `If-Range` names a validator the
/// resource no longer has. Weak entity tags never satisfy `If-Range`.
pub fn requested_range(headers: &Headers, validators: Validators<'_>, length: u64) -> Option<ByteRange> {
    let range = headers.get("range")?;

    if let Some(if_range) = headers.get("if-range") {
        let if_range = if_range.trim();
        let fresh = if if_range.starts_with('"') || if_range.starts_with("W/") {
            match_etag(true, if_range, validators.etag)
        } else {
            match (crate::date::parse_date(if_range), validators.last_modified) {
                (Some(date), Some(modified)) => truncate_to_secs(modified) == date,
                _ => false,
            }
        };
        if !fresh {
            return None;
        }
    }

    parse_range(range, length)
}

/// Full evaluation for a resource of `length` bytes: `200`, `206`, `304`, `412` or `416`.
pub fn evaluate(method: &Method, headers: &Headers, validators: Validators<'_>, length: u64) -> Evaluation {
    let status = conditional_status(method, headers, validators);
    if status != StatusCode::OK || !matches!(*method, Method::GET | Method::HEAD) {
        return Evaluation { status, range: None };
    }

    match requested_range(headers, validators, length) {
        Some(range) if range.is_satisfiable(length) => Evaluation { status: StatusCode::PARTIAL_CONTENT, range: Some(range) },
        Some(_) => Evaluation { status: StatusCode::RANGE_NOT_SATISFIABLE, range: None },
        None => Evaluation { status, range: None },
    }
}

/// Whether an entity tag list matches `etag`.
///
/// `*` matches any existing resource. Strong comparison fails when either tag is weak;
/// weak comparison ignores the `W/` prefix.
pub fn match_etag(strong: bool, list: &str, etag: Option<&str>) -> bool {
    let Some(etag) = etag else {
        return false;
    };
    if strong && is_weak(etag) {
        return split_elements(list).contains(&"*");
    }

    split_elements(list).into_iter().any(|candidate| {
        if candidate == "*" {
            true
        } else if strong {
            !is_weak(candidate) && candidate == etag
        } else {
            strip_weak(candidate) == strip_weak(etag)
        }
    })
}

fn is_weak(etag: &str) -> bool {
    etag.starts_with("W/")
}

fn strip_weak(etag: &str) -> &str {
    etag.strip_prefix("W/").unwrap_or(etag)
}
