//! An asynchronous HTTP/1.1 server engine.
//!
//! The crate covers the whole path of an exchange: request parsing, routing through a radix
//! tree, conditional and range evaluation, content coding and response framing. A static
//! file handler and a TOML configured server are built on top of it.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use http::{Method, StatusCode};
//! use tern_http::config::ServerConfig;
//! use tern_http::handler::{BoxError, Handler, Outcome};
//! use tern_http::protocol::{Request, Response};
//! use tern_http::server::Server;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Handler for Hello {
//!     async fn serve(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<Outcome, BoxError> {
//!         let name = request.param("name").unwrap_or("world").to_string();
//!         response.send(StatusCode::OK, &format!("Hello {name}!")).await?;
//!         Ok(Outcome::Handled)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .config(ServerConfig::default())
//!         .route("/hello/{name}", &[Method::GET], Hello)?
//!         .build()?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: incremental decoders and encoders for request heads, bodies and multipart
//! - [`protocol`]: headers, requests, responses and the conditional and range rules
//! - [`router`]: the radix tree mapping path patterns to handlers
//! - [`handler`]: the [`handler::Handler`] trait and the static [`handler::FileHandler`]
//! - [`connection`]: the per connection request loop and method dispatch
//! - [`server`]: listener, worker limit, TLS and shutdown
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - Request heads are limited to 8KB per line and 100 header fields

pub mod codec;
pub mod config;
pub mod connection;
pub mod date;
pub mod encoding;
pub mod handler;
pub mod protocol;
pub mod router;
pub mod server;

mod utils;
