//! Body codecs for request and response payloads.
//!
//! ## Decoders
//! - [`PayloadDecoder`] picks [`LengthDecoder`] or [`ChunkedDecoder`] from the request framing;
//!   both fail with [`crate::protocol::ParseError::PrematureEof`] when the stream ends early
//!
//! ## Encoders
//! - [`PayloadEncoder`] picks [`LengthEncoder`] or [`ChunkedEncoder`] from the response framing;
//!   bodies that must stay empty (`HEAD`, `204`, `304`) discard what is written

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
