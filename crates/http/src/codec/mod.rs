//! Streaming codecs for HTTP/1.1 messages.
//!
//! All codecs are `tokio_util::codec` state machines over `BytesMut`, so they cope with
//! requests arriving in arbitrary fragments.
//!
//! - [`RequestDecoder`]: request head followed by the framed body
//! - [`header`]: request line and header block parsing, response head encoding
//! - [`body`]: length-delimited and chunked body decoders and encoders
//! - [`multipart`]: `multipart/form-data` part scanner

pub mod body;
pub mod header;
pub mod multipart;
mod request_decoder;

pub use request_decoder::RequestDecoder;
