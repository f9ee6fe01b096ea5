//! Request dispatch: route resolution and the methods the server answers itself.

use crate::config::{ConfigError, CorsConfig, ServerConfig};
use crate::handler::{BoxError, Outcome, Routes};
use crate::protocol::{ContentInfo, Request, Response, ResponseSettings};
use http::{Method, StatusCode};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

/// Methods the server knows; anything else without a handler is `501 Not Implemented`.
const KNOWN_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
    Method::TRACE,
    Method::CONNECT,
];

/// Everything a connection needs to serve requests, shared by all connections.
pub struct Service {
    routes: Routes,
    settings: ResponseSettings,
    cors: CorsConfig,
    directory_index: Option<String>,
    socket_timeout: Option<Duration>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("settings", &self.settings)
            .field("cors", &self.cors)
            .field("directory_index", &self.directory_index)
            .field("socket_timeout", &self.socket_timeout)
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn new(routes: Routes, config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            routes,
            settings: ResponseSettings::from_config(&config.compression)?,
            cors: config.cors.clone(),
            directory_index: config.files.directory_index.clone().filter(|index| !index.is_empty()),
            socket_timeout: config.socket_timeout(),
        })
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn settings(&self) -> &ResponseSettings {
        &self.settings
    }

    pub fn socket_timeout(&self) -> Option<Duration> {
        self.socket_timeout
    }

    /// Serves one request.
    ///
    /// A path ending in `/` is first tried with the directory index appended; when that
    /// yields `404` before anything was sent, the original path is served instead.
    pub(crate) async fn dispatch(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<Outcome, BoxError> {
        self.add_cors_headers(request, response)?;

        if let Some(index) = &self.directory_index
            && request.path().ends_with('/')
        {
            let original = request.path().to_string();
            request.set_path(format!("{original}{index}"));
            let outcome = self.dispatch_method(request, response).await?;
            if outcome != Outcome::Status(StatusCode::NOT_FOUND) || response.is_headers_sent() {
                return Ok(outcome);
            }
            trace!(path = %original, "no directory index, serving the directory path");
            request.set_path(original);
        }

        self.dispatch_method(request, response).await
    }

    async fn dispatch_method(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<Outcome, BoxError> {
        let method = request.method().clone();
        if method == Method::OPTIONS && request.head().target() == "*" {
            let allowed = self.routes.all_methods();
            return self.options(request, response, &allowed).await;
        }

        let Some(route) = request.route() else {
            let status = if KNOWN_METHODS.contains(&method) { StatusCode::NOT_FOUND } else { StatusCode::NOT_IMPLEMENTED };
            return Ok(Outcome::Status(status));
        };

        let handler = route.handler(&method).or_else(|| match method {
            Method::HEAD => route.handler(&Method::GET),
            _ => None,
        });
        if let Some(handler) = handler {
            return handler.serve(request, response).await;
        }

        let allowed: Vec<Method> = route.methods().cloned().collect();
        match method {
            Method::TRACE => self.trace(request, response).await,
            Method::OPTIONS => self.options(request, response, &allowed).await,
            method if !KNOWN_METHODS.contains(&method) => Ok(Outcome::Status(StatusCode::NOT_IMPLEMENTED)),
            method => {
                debug!(%method, path = %request.path(), "method not allowed");
                response.set_header("Allow", allow_header(&allowed))?;
                Ok(Outcome::Status(StatusCode::METHOD_NOT_ALLOWED))
            }
        }
    }

    /// Echoes the request back as `message/http`.
    async fn trace(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<Outcome, BoxError> {
        let head = request.head();
        let mut message = format!("{} {} {:?}\r\n", head.method(), head.target(), head.version());
        for header in head.headers() {
            message.push_str(&format!("{}: {}\r\n", header.name(), header.value()));
        }
        message.push_str("\r\n");
        let mut message = message.into_bytes();
        message.extend_from_slice(&request.body().read_to_end().await?);

        let info = ContentInfo {
            length: Some(message.len() as u64),
            content_type: Some("message/http"),
            ..ContentInfo::default()
        };
        response.send_headers_with(StatusCode::OK, info).await?;
        response.body()?.write(&message).await?;
        response.finish().await?;
        Ok(Outcome::Handled)
    }

    /// Answers `OPTIONS` with the allowed methods, plus the preflight headers for a CORS
    /// preflight request.
    async fn options(&self, request: &mut Request<'_>, response: &mut Response<'_>, allowed: &[Method]) -> Result<Outcome, BoxError> {
        let allow = allow_header(allowed);
        let headers = request.headers();
        if self.cors.is_enabled() && headers.contains("origin") && headers.contains("access-control-request-method") {
            let methods = self.cors.allow_methods.clone().unwrap_or_else(|| allow.clone());
            response.set_header("Access-Control-Allow-Methods", methods)?;
            let allow_headers =
                self.cors.allow_headers.as_deref().or_else(|| headers.get("access-control-request-headers"));
            if let Some(allow_headers) = allow_headers {
                response.set_header("Access-Control-Allow-Headers", allow_headers)?;
            }
            if let Some(max_age) = self.cors.max_age {
                response.set_header("Access-Control-Max-Age", max_age.to_string())?;
            }
        }

        response.set_header("Allow", allow)?;
        response.set_header("Content-Length", "0")?;
        response.send_headers(StatusCode::OK).await?;
        response.finish().await?;
        Ok(Outcome::Handled)
    }

    fn add_cors_headers(&self, request: &Request<'_>, response: &mut Response<'_>) -> Result<(), BoxError> {
        let Some(allow_origin) = &self.cors.allow_origin else {
            return Ok(());
        };
        let Some(origin) = request.headers().get("origin") else {
            return Ok(());
        };

        // a wildcard cannot be combined with credentials, name the origin instead
        if allow_origin == "*" && self.cors.allow_credentials {
            response.set_header("Access-Control-Allow-Origin", origin)?;
            response.add_header("Vary", "Origin")?;
        } else {
            response.set_header("Access-Control-Allow-Origin", allow_origin)?;
        }
        if let Some(expose) = &self.cors.expose_headers {
            response.set_header("Access-Control-Expose-Headers", expose)?;
        }
        if self.cors.allow_credentials {
            response.set_header("Access-Control-Allow-Credentials", "true")?;
        }
        Ok(())
    }
}

/// The `Allow` value for the methods of a route; `HEAD`, `OPTIONS` and `TRACE` are always
/// answered.
fn allow_header(methods: &[Method]) -> String {
    let mut allowed: Vec<&str> = methods.iter().map(Method::as_str).collect();
    if methods.contains(&Method::GET) {
        allowed.push(Method::HEAD.as_str());
    }
    allowed.push(Method::OPTIONS.as_str());
    allowed.push(Method::TRACE.as_str());

    let mut seen = Vec::with_capacity(allowed.len());
    for method in allowed {
        if !seen.contains(&method) {
            seen.push(method);
        }
    }
    seen.join(", ")
}
