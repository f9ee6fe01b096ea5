//! Server bootstrap: route installation, the listener and the accept loop.
//!
//! ```no_run
//! use tern_http::config::ServerConfig;
//! use tern_http::server::Server;
//!
//! # async fn run() -> Result<(), tern_http::server::ServerError> {
//! let config = ServerConfig::load("tern.toml")?;
//! let server = Server::builder().config(config).build()?;
//! server.start().await
//! # }
//! ```
//!
//! Every accepted connection runs on its own task. The number of connections served at once
//! is bounded by `workers`: the accept loop waits for a free worker before it accepts, so
//! an exhausted pool leaves new connections in the listener backlog.

mod tls;

use crate::config::{ConfigError, ServerConfig};
use crate::connection::{HttpConnection, Service};
use crate::handler::{FileHandler, Handler, NotFound, Routes};
use crate::router::RouteError;
use http::Method;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use tls::acceptor as tls_acceptor;

/// Methods the catch-all route answers with `404`
const CATCH_ALL_METHODS: [Method; 5] = [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH];

/// Limit for a TLS handshake to complete
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("invalid tls setup: {reason}")]
    Tls { reason: String },
}

#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    routes: Routes,
    tls: Option<TlsAcceptor>,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ServerBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers `handler` for `methods` on a route pattern; a later registration of the
    /// same pattern and method replaces it.
    pub fn route<H>(mut self, pattern: &str, methods: &[Method], handler: H) -> Result<Self, ServerError>
    where
        H: Handler + 'static,
    {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        self.routes.add_methods(pattern, methods, handler)?;
        Ok(self)
    }

    /// Serves over TLS with `acceptor` instead of the `tls` section of the configuration.
    pub fn tls_acceptor(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Installs the static file handler and the catch-all route, then prepares the server.
    pub fn build(self) -> Result<Server, ServerError> {
        let Self { config, mut routes, tls } = self;
        config.validate()?;

        if let Some(root) = &config.files.root {
            let prefix = config.files.prefix.as_deref().unwrap_or("/");
            let files: Arc<dyn Handler> =
                Arc::new(FileHandler::new(root, prefix).allow_generated_index(config.files.allow_generated_index));
            let base = prefix.trim_end_matches('/');
            routes.add(if base.is_empty() { "/" } else { base }, Method::GET, Arc::clone(&files))?;
            routes.add(&format!("{base}/{{*}}"), Method::GET, files)?;
            info!(root = %root.display(), prefix, "serving static files");
        }
        if !routes.contains("/{*}") {
            let not_found: Arc<dyn Handler> = Arc::new(NotFound);
            routes.add_methods("/{*}", &CATCH_ALL_METHODS, not_found)?;
        }

        let tls = match (tls, &config.tls) {
            (Some(acceptor), _) => Some(acceptor),
            (None, Some(tls_config)) => Some(tls::acceptor(tls_config)?),
            (None, None) => None,
        };

        let service = Arc::new(Service::new(routes, &config)?);
        Ok(Server { config, service, tls, shutdown: CancellationToken::new() })
    }
}

pub struct Server {
    config: ServerConfig,
    service: Arc<Service>,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("service", &self.service)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// A handle that stops the server from another task.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle { shutdown: self.shutdown.clone() }
    }

    /// Binds the configured address and serves until stopped.
    pub async fn start(&self) -> Result<(), ServerError> {
        let address = self.config.address();
        let listener =
            TcpListener::bind(&address).await.map_err(|source| ServerError::Bind { address: address.clone(), source })?;
        info!(%address, tls = self.tls.is_some(), workers = self.config.workers, "start listening");
        self.serve(listener).await
    }

    /// Serves connections accepted from `listener` until stopped.
    ///
    /// Stopping ends the accept loop right away; open connections finish the request they
    /// are serving, then close.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let workers = Arc::new(Semaphore::new(self.config.workers));

        loop {
            let permit = select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&workers).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                break;
            };

            let (stream, remote) = select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };
            debug!(%remote, "accepted connection");

            let service = Arc::clone(&self.service);
            let shutdown = self.shutdown.clone();
            let tls = self.tls.clone();
            tokio::spawn(async move {
                let _permit = permit;
                serve_connection(stream, remote, tls, service, shutdown).await;
            });
        }

        info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    tls: Option<TlsAcceptor>,
    service: Arc<Service>,
    shutdown: CancellationToken,
) {
    let timeout = service.socket_timeout();
    let result = match tls {
        Some(acceptor) => match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
            Ok(Ok(stream)) => {
                let (reader, writer) = tokio::io::split(stream);
                HttpConnection::new(reader, writer, timeout).secure(true).process(service, shutdown).await
            }
            Ok(Err(e)) => {
                warn!(%remote, cause = %e, "tls handshake failed");
                return;
            }
            Err(_) => {
                warn!(%remote, "tls handshake timed out");
                return;
            }
        },
        None => {
            let (reader, writer) = stream.into_split();
            HttpConnection::new(reader, writer, timeout).process(service, shutdown).await
        }
    };

    match result {
        Ok(()) => debug!(%remote, "connection closed"),
        Err(e) => warn!(%remote, cause = %e, "connection closed with error"),
    }
}

#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
}

impl ServerHandle {
    pub fn stop(&self) {
        info!("stopping server");
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
