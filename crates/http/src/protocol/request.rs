//! The request being served.

use crate::handler::{Handler, Routes};
use crate::protocol::{Headers, Multipart, ParseError, Part, RequestBody};
use crate::router::RouteMatch;
use bytes::Bytes;
use http::{Method, Version};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

/// Method, target, version and header fields of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    method: Method,
    target: String,
    path: String,
    query: Option<String>,
    version: Version,
    headers: Headers,
}

impl RequestHead {
    pub fn new(
        method: Method,
        target: String,
        path: String,
        query: Option<String>,
        version: Version,
        headers: Headers,
    ) -> Self {
        Self { method, target, path, query, version, headers }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as sent.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The percent-decoded path of the target.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string, without the `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Whether the client asked to close the connection after this exchange.
    pub fn wants_close(&self) -> bool {
        self.headers.contains_token("connection", "close")
            || (self.version == Version::HTTP_10 && !self.headers.contains_token("connection", "keep-alive"))
    }
}

type Route<'conn> = RouteMatch<'conn, Arc<dyn Handler>>;

/// A request with its body, route and parameters.
///
/// Parameters are looked up path parameters first, then query parameters, then form fields
/// once [`Request::form`] or [`Request::parts`] has read them.
///
/// Files of uploaded parts belong to the request and are deleted when it is dropped.
pub struct Request<'conn> {
    head: RequestHead,
    body: RequestBody<'conn>,
    routes: Option<&'conn Routes>,
    route: Option<Route<'conn>>,
    query_params: Vec<(String, String)>,
    form_params: Vec<(String, String)>,
    secure: bool,
    uploads: Vec<TempPath>,
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("head", &self.head)
            .field("route", &self.route.as_ref().map(RouteMatch::pattern))
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

/// A part read by [`Request::parts`].
#[derive(Debug)]
pub struct FormPart {
    pub part: Part,
    pub content: PartContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartContent {
    /// a form field, kept in memory
    Memory(Bytes),
    /// an uploaded file, stored in a temporary file owned by the request
    File { path: PathBuf, size: u64 },
}

impl<'conn> Request<'conn> {
    pub(crate) fn new(head: RequestHead, body: RequestBody<'conn>, routes: Option<&'conn Routes>, secure: bool) -> Self {
        let query_params = head.query().map(parse_urlencoded).unwrap_or_default();
        let mut request = Self {
            head,
            body,
            routes,
            route: None,
            query_params,
            form_params: Vec::new(),
            secure,
            uploads: Vec::new(),
        };
        request.resolve();
        request
    }

    fn resolve(&mut self) {
        self.route = self.routes.and_then(|routes| routes.lookup(&self.head.path));
        trace!(path = %self.head.path, route = ?self.route.as_ref().map(RouteMatch::pattern), "resolved route");
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        &self.head.path
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    pub fn body(&mut self) -> &mut RequestBody<'conn> {
        &mut self.body
    }

    /// The route the path resolved to.
    pub(crate) fn route(&self) -> Option<&Route<'conn>> {
        self.route.as_ref()
    }

    /// The pattern of the matched route, e.g. `/users/{id}`.
    pub fn route_pattern(&self) -> Option<&str> {
        self.route.as_ref().map(RouteMatch::pattern)
    }

    /// Rewrites the path and resolves route and path parameters again.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.head.path = path.into();
        self.resolve();
    }

    /// All parameters, path parameters first, then query, then form fields.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        let path = self.route.iter().flat_map(|route| route.params());
        path.chain(&self.query_params).chain(&self.form_params).map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The first parameter named `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params().find(|(n, _)| *n == name).map(|(_, value)| value)
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// `scheme://host` of the request, when it carries a `Host` header.
    pub fn base_url(&self) -> Option<String> {
        let host = self.head.headers.get("host")?.trim();
        let scheme = if self.secure { "https" } else { "http" };
        (!host.is_empty()).then(|| format!("{scheme}://{host}"))
    }

    fn content_type_is(&self, essence: &str) -> bool {
        self.head.headers.params("content-type").is_some_and(|ct| ct.value().eq_ignore_ascii_case(essence))
    }

    /// Reads an `application/x-www-form-urlencoded` body into the parameters.
    ///
    /// Other content types leave the body untouched.
    pub async fn form(&mut self) -> Result<&[(String, String)], ParseError> {
        if self.content_type_is("application/x-www-form-urlencoded") && !self.body.is_finished() {
            let bytes = self.body.read_to_end().await?;
            let fields: Vec<(String, String)> =
                serde_urlencoded::from_bytes(&bytes).map_err(|e| ParseError::invalid_body(format!("invalid form: {e}")))?;
            self.form_params.extend(fields);
        }
        Ok(&self.form_params)
    }

    /// A streaming reader for a `multipart/form-data` body.
    pub fn multipart(&mut self) -> Result<Multipart<'_, 'conn>, ParseError> {
        let boundary = self.boundary()?;
        Multipart::new(&mut self.body, &boundary)
    }

    fn boundary(&self) -> Result<String, ParseError> {
        let params = self
            .head
            .headers
            .params("content-type")
            .filter(|ct| ct.value().eq_ignore_ascii_case("multipart/form-data"))
            .ok_or_else(|| ParseError::invalid_body("content type is not multipart/form-data"))?;
        params.get("boundary").map(str::to_string).ok_or_else(|| ParseError::invalid_body("missing multipart boundary"))
    }

    /// Reads every part of a `multipart/form-data` body.
    ///
    /// Parts without a file name are form fields: they are kept in memory and added to the
    /// parameters. File parts are written to temporary files that live as long as the request.
    pub async fn parts(&mut self) -> Result<Vec<FormPart>, ParseError> {
        let boundary = self.boundary()?;
        let mut multipart = Multipart::new(&mut self.body, &boundary)?;
        let mut parts = Vec::new();

        while let Some(part) = multipart.next_part().await? {
            let content = if part.filename().is_some() {
                let (file, path) = tempfile::NamedTempFile::new()?.into_parts();
                let mut file = tokio::fs::File::from_std(file);
                let mut size = 0;
                while let Some(bytes) = multipart.chunk().await? {
                    file.write_all(&bytes).await?;
                    size += bytes.len() as u64;
                }
                file.flush().await?;
                debug!(name = ?part.name(), size, path = %path.display(), "stored uploaded file");
                let content = PartContent::File { path: path.to_path_buf(), size };
                self.uploads.push(path);
                content
            } else {
                let bytes = multipart.read_part().await?;
                if let Some(name) = part.name() {
                    self.form_params.push((name.to_string(), String::from_utf8_lossy(&bytes).into_owned()));
                }
                PartContent::Memory(bytes)
            };
            parts.push(FormPart { part, content });
        }
        Ok(parts)
    }

    /// Paths of the temporary files holding uploaded parts.
    pub fn uploads(&self) -> impl Iterator<Item = &Path> {
        self.uploads.iter().map(|path| &**path)
    }
}

fn parse_urlencoded(query: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str(query).unwrap_or_else(|e| {
        debug!(cause = %e, "ignoring malformed query string");
        Vec::new()
    })
}
