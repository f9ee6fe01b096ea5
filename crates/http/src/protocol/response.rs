//! The response writer.
//!
//! A [`Response`] moves through three states: headers pending, headers sent and closed.
//! Header fields can only change while headers are pending. Sending the headers fixes the
//! body framing (`Content-Length`, chunked, or until close for HTTP/1.0) and the content
//! coding; the body is then written through [`Response::body`].

use crate::codec::body::PayloadEncoder;
use crate::codec::header::{HeaderEncoder, reason_phrase};
use crate::config::{CompressionConfig, ConfigError};
use crate::date::{DateService, format_date};
use crate::encoding::{ContentCoding, Encoder, is_compressible, negotiate};
use crate::protocol::range::ByteRange;
use crate::protocol::{Header, Headers, PayloadItem, RequestHead, SendError};
use crate::utils::{ensure, escape_html};
use bytes::{Bytes, BytesMut};
use http::{StatusCode, Version};
use std::fmt;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder as _;
use tracing::{debug, trace};

/// Size of the buffer used to copy bodies from readers
const COPY_BUF_SIZE: usize = 16 * 1024;

/// Compression settings applied by [`Response::send_headers_with`].
#[derive(Debug, Clone)]
pub struct ResponseSettings {
    pub compression: bool,
    /// bodies of known length up to this size are not compressed
    pub min_compress_size: u64,
    pub codings: Vec<ContentCoding>,
    pub compressible_types: Vec<String>,
}

impl ResponseSettings {
    pub fn from_config(config: &CompressionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            compression: config.enabled,
            min_compress_size: config.min_size,
            codings: config.codings()?,
            compressible_types: config.compressible_types.clone(),
        })
    }
}

impl Default for ResponseSettings {
    fn default() -> Self {
        let config = CompressionConfig::default();
        Self {
            compression: config.enabled,
            min_compress_size: config.min_size,
            codings: vec![ContentCoding::Gzip, ContentCoding::Deflate],
            compressible_types: config.compressible_types,
        }
    }
}

/// What is known about a body before sending it, see [`Response::send_headers_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentInfo<'a> {
    /// full length of the resource, `None` when unknown
    pub length: Option<u64>,
    pub last_modified: Option<SystemTime>,
    pub etag: Option<&'a str>,
    /// defaults to `application/octet-stream`
    pub content_type: Option<&'a str>,
    /// the span of the resource being sent
    pub range: Option<ByteRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    HeadersSent,
    Closed,
}

/// What the response needs to know about the request it answers.
#[derive(Debug, Clone)]
struct Exchange {
    head: bool,
    version: Version,
    close: bool,
    accept_encoding: Option<String>,
}

impl Default for Exchange {
    fn default() -> Self {
        Self { head: false, version: Version::HTTP_11, close: false, accept_encoding: None }
    }
}

pub struct Response<'conn> {
    headers: Headers,
    state: State,
    status: Option<StatusCode>,
    settings: &'conn ResponseSettings,
    exchange: Exchange,
    coding: ContentCoding,
    body: ResponseBody<'conn>,
}

impl fmt::Debug for Response<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("headers", &self.headers)
            .field("state", &self.state)
            .field("status", &self.status)
            .field("coding", &self.coding)
            .finish_non_exhaustive()
    }
}

impl<'conn> Response<'conn> {
    pub(crate) fn new(writer: &'conn mut (dyn AsyncWrite + Send + Unpin), settings: &'conn ResponseSettings) -> Self {
        Self {
            headers: Headers::new(),
            state: State::Pending,
            status: None,
            settings,
            exchange: Exchange::default(),
            coding: ContentCoding::Identity,
            body: ResponseBody::new(writer),
        }
    }

    /// Adapts the response to the request: `HEAD` bodies are discarded, the version and
    /// `Connection` preference decide persistence, `Accept-Encoding` drives compression.
    pub(crate) fn bind(&mut self, head: &RequestHead) {
        self.exchange = Exchange {
            head: *head.method() == http::Method::HEAD,
            version: head.version(),
            close: head.wants_close(),
            accept_encoding: head.headers().get("accept-encoding").map(str::to_string),
        };
    }

    /// Marks the connection to be closed after this response.
    pub(crate) fn close_after(&mut self) {
        self.exchange.close = true;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl AsRef<str>) -> Result<(), SendError> {
        ensure!(self.state == State::Pending, SendError::HeadersAlreadySent);
        self.headers.add(name, value)?;
        Ok(())
    }

    /// Sets a header, replacing the first field of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl AsRef<str>) -> Result<(), SendError> {
        ensure!(self.state == State::Pending, SendError::HeadersAlreadySent);
        self.headers.replace(name, value)?;
        Ok(())
    }

    pub fn remove_header(&mut self, name: &str) -> Result<Option<Header>, SendError> {
        ensure!(self.state == State::Pending, SendError::HeadersAlreadySent);
        Ok(self.headers.remove(name))
    }

    /// Drops every header field set so far, e.g. before replacing the response with an
    /// error page.
    pub fn clear_headers(&mut self) -> Result<(), SendError> {
        ensure!(self.state == State::Pending, SendError::HeadersAlreadySent);
        self.headers = Headers::new();
        self.coding = ContentCoding::Identity;
        Ok(())
    }

    /// The status sent, `None` while headers are pending.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn is_headers_sent(&self) -> bool {
        self.state != State::Pending
    }

    /// Whether the sent headers announce that the connection closes.
    pub fn close_requested(&self) -> bool {
        self.is_headers_sent() && self.headers.contains_token("connection", "close")
    }

    /// Whether the body was completely written.
    pub fn is_complete(&self) -> bool {
        self.state == State::Closed
    }

    /// Sends the interim `100 Continue` response.
    pub async fn send_continue(&mut self) -> Result<(), SendError> {
        ensure!(self.state == State::Pending, SendError::HeadersAlreadySent);
        self.body.writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        self.body.writer.flush().await?;
        debug!("sent 100 continue");
        Ok(())
    }

    /// Sends the status line and headers.
    ///
    /// Adds `Date` when missing. A status that allows a body but has no framing header gets
    /// `Transfer-Encoding: chunked`, or `Connection: close` for HTTP/1.0 clients.
    pub async fn send_headers(&mut self, status: StatusCode) -> Result<(), SendError> {
        ensure!(self.state == State::Pending, SendError::HeadersAlreadySent);

        if !self.headers.contains("date") {
            self.headers.add("Date", DateService::get_global_instance().http_date())?;
        }

        let status_allows_body = !(status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED);
        if status_allows_body && !self.headers.contains("content-length") && !self.headers.contains("transfer-encoding") {
            if self.exchange.version == Version::HTTP_11 {
                self.headers.add("Transfer-Encoding", "chunked")?;
            } else {
                self.exchange.close = true;
            }
        }
        if self.exchange.close && !self.headers.contains_token("connection", "close") {
            self.headers.replace("Connection", "close")?;
        }

        let payload = if self.exchange.head || !status_allows_body {
            PayloadEncoder::empty()
        } else if self.headers.contains_token("transfer-encoding", "chunked") {
            PayloadEncoder::chunked()
        } else if let Some(length) = self.headers.get("content-length") {
            let length =
                length.trim().parse::<u64>().map_err(|_| SendError::invalid_body(format!("invalid content-length {length}")))?;
            PayloadEncoder::fix_length(length)
        } else {
            PayloadEncoder::until_close()
        };
        let discard = payload.is_empty();
        self.body.payload = payload;
        if !discard {
            self.body.encoder = Encoder::new(self.coding)?;
        }

        HeaderEncoder.encode((status, &self.headers), &mut self.body.buf)?;
        self.state = State::HeadersSent;
        self.status = Some(status);
        trace!(status = status.as_u16(), headers = self.headers.len(), "sending response headers");

        if discard {
            // nothing follows, push the headers out now
            self.body.write_buffered().await?;
            self.body.writer.flush().await?;
        }
        Ok(())
    }

    /// Sends the headers for a body described by `info`.
    ///
    /// With a range, `Content-Range` is added, the length becomes the range length and `200`
    /// becomes `206`. Unless the framing is already set, a whole body is compressed with the
    /// best coding the client accepts when the client speaks HTTP/1.1, the length is unknown
    /// or above the configured minimum, and the content type is compressible. Otherwise a
    /// known length is sent as `Content-Length`.
    pub async fn send_headers_with(&mut self, status: StatusCode, info: ContentInfo<'_>) -> Result<(), SendError> {
        ensure!(self.state == State::Pending, SendError::HeadersAlreadySent);

        let mut status = status;
        let mut length = info.length;
        if let Some(range) = info.range {
            let total = info.length.map_or_else(|| "*".to_string(), |length| length.to_string());
            self.headers.replace("Content-Range", format!("bytes {range}/{total}"))?;
            length = Some(range.len());
            if status == StatusCode::OK {
                status = StatusCode::PARTIAL_CONTENT;
            }
        }

        if !self.headers.contains("content-type") {
            self.headers.add("Content-Type", info.content_type.unwrap_or("application/octet-stream"))?;
        }

        if !self.headers.contains("content-length") && !self.headers.contains("transfer-encoding") {
            let settings = self.settings;
            let coding = if settings.compression {
                negotiate(self.exchange.accept_encoding.as_deref(), &settings.codings)
            } else {
                ContentCoding::Identity
            };
            let http11 = self.exchange.version == Version::HTTP_11;
            let large_enough = length.is_none_or(|length| length > settings.min_compress_size);
            let compressible =
                self.headers.get("content-type").is_some_and(|ct| is_compressible(ct, &settings.compressible_types));

            // Content-Range counts identity bytes
            let whole = info.range.is_none();
            if coding != ContentCoding::Identity && http11 && large_enough && compressible && whole {
                self.headers.add("Transfer-Encoding", "chunked")?;
                self.headers.replace("Content-Encoding", coding.name())?;
                self.coding = coding;
            } else if let Some(length) = length {
                self.headers.add("Content-Length", length.to_string())?;
            }
        }

        if !self.headers.contains("vary") {
            self.headers.add("Vary", "Accept-Encoding")?;
        }
        if let Some(last_modified) = info.last_modified
            && !self.headers.contains("last-modified")
        {
            // never claim a modification in the future
            self.headers.add("Last-Modified", format_date(last_modified.min(SystemTime::now())))?;
        }
        if let Some(etag) = info.etag
            && !self.headers.contains("etag")
        {
            self.headers.add("ETag", etag)?;
        }

        self.send_headers(status).await
    }

    /// The body writer; the same instance for the whole response.
    pub fn body(&mut self) -> Result<&mut ResponseBody<'conn>, SendError> {
        ensure!(self.state != State::Pending, SendError::HeadersNotSent);
        Ok(&mut self.body)
    }

    /// Copies a body from `reader`: the bytes of `range` when given, otherwise `length`
    /// bytes or everything up to the end of the reader.
    pub async fn send_body<R>(&mut self, reader: R, length: Option<u64>, range: Option<ByteRange>) -> Result<(), SendError>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = reader;
        let count = match range {
            Some(range) => {
                let skipped = tokio::io::copy(&mut (&mut reader).take(range.start), &mut tokio::io::sink()).await?;
                ensure!(skipped == range.start, SendError::invalid_body("body ended before the requested range"));
                Some(range.len())
            }
            None => length,
        };

        let body = self.body()?;
        let mut reader = reader.take(count.unwrap_or(u64::MAX));
        let mut buf = vec![0; COPY_BUF_SIZE];
        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            body.write(&buf[..read]).await?;
        }
        Ok(())
    }

    /// Completes the body and flushes the connection.
    pub async fn finish(&mut self) -> Result<(), SendError> {
        match self.state {
            State::Pending => Err(SendError::HeadersNotSent),
            State::HeadersSent => {
                self.body.finish().await?;
                self.state = State::Closed;
                Ok(())
            }
            State::Closed => Ok(()),
        }
    }

    /// Sends a complete HTML response showing `text`, escaped.
    pub async fn send(&mut self, status: StatusCode, text: &str) -> Result<(), SendError> {
        let title = format!("{} {}", status.as_u16(), reason_phrase(status));
        let html = format!(
            "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n<p>{}</p>\n</body>\n</html>\n",
            escape_html(text)
        );

        for name in ["content-length", "transfer-encoding", "content-encoding"] {
            self.remove_header(name)?;
        }
        self.set_header("Content-Type", "text/html; charset=utf-8")?;
        let info = ContentInfo { length: Some(html.len() as u64), ..ContentInfo::default() };
        self.send_headers_with(status, info).await?;
        self.body()?.write(html.as_bytes()).await?;
        self.finish().await
    }

    /// Sends an error page, with a default text for the status when none is given.
    pub async fn send_error(&mut self, status: StatusCode, text: Option<&str>) -> Result<(), SendError> {
        let text = text.unwrap_or_else(|| default_text(status));
        self.send(status, text).await
    }

    /// Redirects to `url` with `301` when permanent, `302` otherwise.
    pub async fn redirect(&mut self, url: &str, permanent: bool) -> Result<(), SendError> {
        self.set_header("Location", url)?;
        let status = if permanent { StatusCode::MOVED_PERMANENTLY } else { StatusCode::FOUND };
        self.send(status, &format!("Moved to {url}")).await
    }
}

fn default_text(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "The request could not be understood.",
        StatusCode::FORBIDDEN => "Access to the requested resource is forbidden.",
        StatusCode::NOT_FOUND => "The requested resource was not found.",
        StatusCode::METHOD_NOT_ALLOWED => "The method is not allowed for the requested resource.",
        StatusCode::INTERNAL_SERVER_ERROR => "The server encountered an internal error.",
        status => reason_phrase(status),
    }
}

/// Writes the response body with the framing and coding fixed by the headers.
pub struct ResponseBody<'conn> {
    writer: &'conn mut (dyn AsyncWrite + Send + Unpin),
    payload: PayloadEncoder,
    encoder: Option<Encoder>,
    buf: BytesMut,
    finished: bool,
}

impl fmt::Debug for ResponseBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("payload", &self.payload)
            .field("coding", &self.encoder.as_ref().map(Encoder::coding))
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<'conn> ResponseBody<'conn> {
    fn new(writer: &'conn mut (dyn AsyncWrite + Send + Unpin)) -> Self {
        Self { writer, payload: PayloadEncoder::empty(), encoder: None, buf: BytesMut::new(), finished: false }
    }

    /// Writes a piece of the body.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), SendError> {
        ensure!(!self.finished, SendError::invalid_body("body already finished"));
        if self.payload.is_empty() || data.is_empty() {
            return Ok(());
        }

        let chunk = match &mut self.encoder {
            Some(encoder) => {
                encoder.write(data)?;
                encoder.take()
            }
            None => Bytes::copy_from_slice(data),
        };
        self.payload.encode(PayloadItem::Chunk(chunk), &mut self.buf)?;
        self.write_buffered().await
    }

    pub async fn flush(&mut self) -> Result<(), SendError> {
        self.write_buffered().await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Ends the body. Fails when a length-delimited body is incomplete.
    pub async fn finish(&mut self) -> Result<(), SendError> {
        self.finish_inner(None).await
    }

    /// Ends a chunked body with trailer fields; other framings drop the trailers.
    pub async fn finish_with_trailers(&mut self, trailers: &Headers) -> Result<(), SendError> {
        self.finish_inner(Some(trailers)).await
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    async fn finish_inner(&mut self, trailers: Option<&Headers>) -> Result<(), SendError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if let Some(encoder) = self.encoder.take() {
            let rest = encoder.finish()?;
            self.payload.encode(PayloadItem::Chunk(rest), &mut self.buf)?;
        }
        self.payload.finish(trailers, &mut self.buf)?;
        self.flush().await
    }

    async fn write_buffered(&mut self) -> Result<(), SendError> {
        if !self.buf.is_empty() {
            self.writer.write_all(&self.buf).await?;
            self.buf.clear();
        }
        Ok(())
    }
}
