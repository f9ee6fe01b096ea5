//! Protocol types shared by the codecs, the connection loop and handlers.
//!
//! - [`Headers`]: an ordered, case-insensitive multimap of header fields
//! - [`RequestHead`] and [`Request`]: a parsed request, its route and parameters
//! - [`RequestBody`] and [`Multipart`]: streaming readers for the request body
//! - [`Response`] and [`ResponseBody`]: the response writer
//! - [`range`] and [`conditional`]: byte ranges and validator evaluation
//! - [`HttpError`], [`ParseError`], [`SendError`]: errors of each side

mod body;
mod error;
mod headers;
mod message;
mod multipart;
mod request;
mod response;

pub mod conditional;
pub mod range;

pub use body::RequestBody;
pub use error::{HeaderError, HttpError, ParseError, SendError};
pub use headers::{Header, HeaderParams, Headers};
pub use message::{Message, PayloadItem, PayloadSize};
pub use multipart::{Multipart, Part};
pub use request::{FormPart, PartContent, Request, RequestHead};
pub use response::{ContentInfo, Response, ResponseBody, ResponseSettings};
