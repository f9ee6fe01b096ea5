//! Header processing for requests and responses.
//!
//! - [`HeaderDecoder`] parses the request line and the request header block
//! - [`FieldDecoder`] reads any block of header fields terminated by an empty line;
//!   it is shared with chunked trailers and multipart part headers
//! - [`HeaderEncoder`] serializes the response status line and header block
//!
//! # Limits
//!
//! - a single line, including the request line, may not exceed [`MAX_LINE_SIZE`] bytes
//! - a header block may not contain more than [`MAX_HEADER_LINES`] lines

mod field_decoder;
mod header_decoder;
mod header_encoder;

pub use field_decoder::FieldDecoder;
pub use header_decoder::HeaderDecoder;
pub use header_encoder::{HeaderEncoder, reason_phrase};

pub(crate) use field_decoder::next_line;
pub(crate) use header_encoder::FastWrite;

/// Maximum length of a request line or header line, in bytes
pub const MAX_LINE_SIZE: usize = 8192;

/// Maximum number of lines in one header block
pub const MAX_HEADER_LINES: usize = 100;
