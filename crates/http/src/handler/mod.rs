//! Request handlers.
//!
//! A [`Handler`] reads the request and writes the response itself, then reports an
//! [`Outcome`]: either the response was fully written, or the connection should answer
//! with a default error page for a status.
//!
//! Handlers shipped with the crate:
//!
//! - [`FileHandler`]: serves a directory tree with validators, ranges and listings
//! - [`NotFound`]: answers every request with `404`, installed at `/{*}` as the catch-all

use crate::protocol::{Request, Response};
use crate::router::Router;
use async_trait::async_trait;
use http::StatusCode;
use std::error::Error;
use std::sync::Arc;

mod file;

pub use file::FileHandler;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// The route table of a server.
pub type Routes = Router<Arc<dyn Handler>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// the handler wrote the complete response
    Handled,
    /// the handler wrote nothing, answer with an error page for the status
    Status(StatusCode),
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<Outcome, BoxError>;
}

/// The catch-all handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

#[async_trait]
impl Handler for NotFound {
    async fn serve(&self, _request: &mut Request<'_>, _response: &mut Response<'_>) -> Result<Outcome, BoxError> {
        Ok(Outcome::Status(StatusCode::NOT_FOUND))
    }
}
