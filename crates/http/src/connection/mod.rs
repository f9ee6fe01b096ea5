//! Connection handling.
//!
//! [`HttpConnection`] owns one accepted connection and runs its transactions one after
//! another: decode a request head, dispatch it through the [`Service`], finish the
//! response, drain what the handler left of the request body, then either wait for the
//! next request or close.
//!
//! Reads go through a [`TimeoutReader`], so a client idle for longer than the socket
//! timeout is dropped: silently between requests, with `408 Request Timeout` in the
//! middle of one.

mod dispatch;
mod http_connection;
mod timeout;

use crate::codec::RequestDecoder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;

pub use dispatch::Service;
pub use http_connection::HttpConnection;
pub use timeout::TimeoutReader;

pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// The decoded request side of a connection.
pub(crate) type RequestStream = FramedRead<TimeoutReader<ReadStream>, RequestDecoder>;
