use crate::codec::RequestDecoder;
use crate::connection::{ReadStream, RequestStream, Service, TimeoutReader, WriteStream};
use crate::handler::Outcome;
use crate::protocol::{HttpError, Message, ParseError, Request, RequestBody, RequestHead, Response};
use futures::{FutureExt, StreamExt};
use http::{StatusCode, Version};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Initial capacity of the read buffer
const READ_BUF_SIZE: usize = 8 * 1024;

/// An HTTP/1.x connection, serving requests until either side closes it.
///
/// Each transaction:
/// - rejects a request without exactly one `Host` (HTTP/1.1) or with an unknown `Expect`
/// - sends `100 Continue` when the client expects it
/// - dispatches the request; a handler error or panic becomes `500` while nothing was sent,
///   and aborts the connection otherwise
/// - completes the response and drains the unread request body
///
/// The connection stays open for HTTP/1.1 clients as long as no `Connection: close` was sent
/// and the server is not stopping.
pub struct HttpConnection {
    framed_read: RequestStream,
    writer: WriteStream,
    secure: bool,
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection").field("secure", &self.secure).finish_non_exhaustive()
    }
}

impl HttpConnection {
    /// A connection reading requests from `reader` and writing responses to `writer`.
    /// Reads idle for longer than `timeout` fail.
    pub fn new<R, W>(reader: R, writer: W, timeout: Option<Duration>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: ReadStream = Box::new(reader);
        Self {
            framed_read: FramedRead::with_capacity(TimeoutReader::new(reader, timeout), RequestDecoder::new(), READ_BUF_SIZE),
            writer: Box::new(writer),
            secure: false,
        }
    }

    /// Marks the connection as running over TLS.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub async fn process(self, service: Arc<Service>, shutdown: CancellationToken) -> Result<(), HttpError> {
        let Self { mut framed_read, mut writer, secure } = self;

        let result = serve(&mut framed_read, &mut writer, secure, &service, &shutdown).await;

        // close our side first, the peer then sees the end of the last response
        if let Err(e) = writer.shutdown().await {
            debug!(cause = %e, "failed to shut down connection");
        }
        result
    }
}

async fn serve(
    framed_read: &mut RequestStream,
    writer: &mut WriteStream,
    secure: bool,
    service: &Service,
    shutdown: &CancellationToken,
) -> Result<(), HttpError> {
    loop {
        let next = select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("server stopping, closing connection");
                return Ok(());
            }
            next = framed_read.next() => next,
        };

        let head = match next {
            Some(Ok(Message::Header(head))) => head,
            Some(Ok(Message::Payload(_))) => {
                error!("received body data without a request head");
                return Err(ParseError::invalid_body("body data without a request head").into());
            }
            Some(Err(e)) => return reject(in_request(framed_read), writer, service, e).await,
            None => {
                debug!("client closed connection");
                return Ok(());
            }
        };

        if !transaction(head, framed_read, writer, secure, service, shutdown).await? {
            return Ok(());
        }
    }
}

/// Whether part of a request was already received.
fn in_request(framed_read: &RequestStream) -> bool {
    framed_read.decoder().in_request() || !framed_read.read_buffer().iter().all(u8::is_ascii_whitespace)
}

/// Handles a request that could not be decoded: the connection closes, with an error
/// response unless the client simply went away.
async fn reject(in_request: bool, writer: &mut WriteStream, service: &Service, e: ParseError) -> Result<(), HttpError> {
    let silent = match &e {
        ParseError::MissingRequestLine => true,
        e if e.is_timeout() => !in_request,
        ParseError::Io { .. } => true,
        _ => false,
    };
    if silent {
        debug!(cause = %e, "closing connection");
        return Ok(());
    }

    warn!(cause = %e, "failed to decode request");
    let mut response = Response::new(&mut **writer, service.settings());
    response.close_after();
    response.send_error(e.status(), None).await?;
    Err(e.into())
}

/// Serves one request, returning whether the connection stays open.
async fn transaction(
    head: RequestHead,
    framed_read: &mut RequestStream,
    writer: &mut WriteStream,
    secure: bool,
    service: &Service,
    shutdown: &CancellationToken,
) -> Result<bool, HttpError> {
    let mut response = Response::new(&mut **writer, service.settings());
    response.bind(&head);
    if head.version() != Version::HTTP_11 || shutdown.is_cancelled() {
        response.close_after();
    }

    if let Some(status) = preprocess(&head) {
        debug!(status = status.as_u16(), path = %head.path(), "rejecting request");
        response.close_after();
        response.send_error(status, None).await?;
        return Ok(false);
    }
    if head.headers().contains("expect") {
        response.send_continue().await?;
    }

    let method = head.method().clone();
    let mut request = Request::new(head, RequestBody::new(framed_read), Some(service.routes()), secure);

    let result = AssertUnwindSafe(service.dispatch(&mut request, &mut response)).catch_unwind().await;
    let failure = match result {
        Ok(Ok(Outcome::Handled)) if response.is_headers_sent() => None,
        Ok(Ok(Outcome::Handled)) => Some("handler returned without a response".to_string()),
        Ok(Ok(Outcome::Status(status))) => {
            if response.is_headers_sent() {
                warn!(status = status.as_u16(), "handler asked for an error page after responding");
            } else {
                response.send_error(status, None).await?;
            }
            None
        }
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("handler panicked".to_string()),
    };

    if let Some(cause) = failure {
        error!(%method, path = %request.path(), cause = %cause, "failed to handle request");
        if response.is_headers_sent() {
            // a started response cannot be taken back
            warn!("response already started, aborting connection");
            return Ok(false);
        }
        response.clear_headers()?;
        response.send_error(StatusCode::INTERNAL_SERVER_ERROR, None).await?;
    }

    if let Err(e) = response.finish().await {
        warn!(cause = %e, "response incomplete, closing connection");
        return Ok(false);
    }
    if let Err(e) = request.body().drain().await {
        debug!(cause = %e, "failed to drain request body, closing connection");
        return Ok(false);
    }

    debug!(
        %method,
        path = %request.path(),
        status = response.status().map(|status| status.as_u16()),
        "served request"
    );
    Ok(!response.close_requested())
}

/// Checks the request headers the connection is responsible for.
fn preprocess(head: &RequestHead) -> Option<StatusCode> {
    if head.version() == Version::HTTP_11 {
        let mut hosts = head.headers().get_all("host");
        let single_host = matches!((hosts.next(), hosts.next()), (Some(host), None) if !host.contains(','));
        if !single_host {
            return Some(StatusCode::BAD_REQUEST);
        }
    }

    if let Some(expect) = head.headers().get("expect")
        && !expect.eq_ignore_ascii_case("100-continue")
    {
        return Some(StatusCode::EXPECTATION_FAILED);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::handler::{BoxError, FileHandler, Handler, NotFound, Routes};
    use crate::protocol::ContentInfo;
    use async_trait::async_trait;
    use http::Method;
    use std::path::Path;
    use tokio::io::AsyncReadExt;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn serve(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<Outcome, BoxError> {
            let body = request.body().read_to_end().await?;
            let info = ContentInfo { length: Some(body.len() as u64), content_type: Some("text/plain"), ..Default::default() };
            response.send_headers_with(StatusCode::OK, info).await?;
            response.body()?.write(&body).await?;
            response.finish().await?;
            Ok(Outcome::Handled)
        }
    }

    struct Fail;

    #[async_trait]
    impl Handler for Fail {
        async fn serve(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<Outcome, BoxError> {
            match request.param("mode") {
                Some("error") => Err("boom".into()),
                Some("panic") => panic!("boom"),
                Some("dirty") => {
                    response.set_header("Location", "/elsewhere")?;
                    response.set_header("ETag", "\"v9\"")?;
                    response.set_header("Content-Range", "bytes 0-9/100")?;
                    Err("gave up".into())
                }
                Some("partial") => {
                    response.send_headers(StatusCode::OK).await?;
                    response.body()?.write(b"partial").await?;
                    Err("broken".into())
                }
                _ => Ok(Outcome::Status(StatusCode::IM_A_TEAPOT)),
            }
        }
    }

    fn service_with(root: &Path, config: &ServerConfig) -> Arc<Service> {
        let files: Arc<dyn Handler> = Arc::new(FileHandler::new(root, "/static"));
        let not_found: Arc<dyn Handler> = Arc::new(NotFound);

        let mut routes = Routes::new();
        routes.add("/static", Method::GET, Arc::clone(&files)).unwrap();
        routes.add("/static/{*}", Method::GET, files).unwrap();
        routes.add_methods("/echo", &[Method::POST, Method::PUT], Arc::new(Echo)).unwrap();
        routes.add("/fail/{mode}", Method::GET, Arc::new(Fail)).unwrap();
        routes
            .add_methods("/{*}", &[Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH], not_found)
            .unwrap();
        Arc::new(Service::new(routes, config).unwrap())
    }

    fn site() -> (tempfile::TempDir, Arc<Service>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>tern</h1>").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        let service = service_with(dir.path(), &ServerConfig::default());
        (dir, service)
    }

    /// Sends `request` on a fresh connection, closes the client side and collects everything
    /// the server writes until it closes.
    async fn exchange(service: &Arc<Service>, request: &[u8]) -> String {
        let (out, _) = exchange_with_result(service, request).await;
        out
    }

    async fn exchange_with_result(service: &Arc<Service>, request: &[u8]) -> (String, Result<(), HttpError>) {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let connection = HttpConnection::new(reader, writer, None);
        let task = tokio::spawn(connection.process(Arc::clone(service), CancellationToken::new()));

        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let result = task.await.unwrap();
        (String::from_utf8_lossy(&out).into_owned(), result)
    }

    fn split(response: &str) -> (&str, &str) {
        let end = response.find("\r\n\r\n").unwrap() + 4;
        (&response[..end], &response[end..])
    }

    fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
        head.lines().find_map(|line| line.strip_prefix(name)?.strip_prefix(": "))
    }

    #[tokio::test]
    async fn static_file_and_revalidation() {
        let (_dir, service) = site();

        let out = exchange(&service, b"GET /static/index.html HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let (head, body) = split(&out);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
        assert!(header(head, "Content-Type").unwrap().starts_with("text/html"));
        assert!(header(head, "Last-Modified").is_some());
        assert_eq!(header(head, "Content-Length"), Some("13"));
        assert_eq!(body, "<h1>tern</h1>");
        let etag = header(head, "ETag").unwrap();

        let request = format!("GET /static/index.html HTTP/1.1\r\nHost: localhost\r\nIf-None-Match: {etag}\r\n\r\n");
        let out = exchange(&service, request.as_bytes()).await;
        let (head, body) = split(&out);
        assert!(head.starts_with("HTTP/1.1 304 Not Modified\r\n"), "{head}");
        assert_eq!(header(head, "ETag"), Some(etag));
        assert!(body.is_empty());

        let out = exchange(&service, b"GET /static/index.html HTTP/1.1\r\nHost: localhost\r\nRange: bytes=0-4\r\n\r\n").await;
        let (head, body) = split(&out);
        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"), "{head}");
        assert_eq!(header(head, "Content-Range"), Some("bytes 0-4/13"));
        assert_eq!(body, "<h1>t");

        let out = exchange(&service, b"GET /static/index.html HTTP/1.1\r\nHost: localhost\r\nRange: bytes=100-\r\n\r\n").await;
        let (head, _) = split(&out);
        assert!(head.starts_with("HTTP/1.1 416 Range Not Satisfiable\r\n"), "{head}");
        assert_eq!(header(head, "Content-Range"), Some("bytes */13"));
    }

    #[tokio::test]
    async fn directories() {
        let (_dir, service) = site();

        let out = exchange(&service, b"GET /static/ HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let (head, body) = split(&out);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
        assert_eq!(body, "<h1>tern</h1>");

        let out = exchange(&service, b"GET /static/docs?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let (head, _) = split(&out);
        assert!(head.starts_with("HTTP/1.1 301 Moved Permanently\r\n"), "{head}");
        assert_eq!(header(head, "Location"), Some("/static/docs/?x=1"));

        let out = exchange(&service, b"GET /static/docs/ HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{out}");
    }

    #[tokio::test]
    async fn keep_alive_and_pipelining() {
        let (_dir, service) = site();
        let requests = concat!(
            "POST /echo HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
            "GET /nowhere HTTP/1.1\r\nHost: a\r\nContent-Length: 7\r\n\r\nignored",
            "PUT /echo HTTP/1.1\r\nHost: a\r\nContent-Length: 3\r\n\r\nabc",
        );
        let out = exchange(&service, requests.as_bytes()).await;

        assert_eq!(out.matches("HTTP/1.1 ").count(), 3, "{out}");
        let first = out.find("hello world").unwrap();
        let second = out.find("HTTP/1.1 404 Not Found").unwrap();
        let third = out.rfind("HTTP/1.1 200 OK").unwrap();
        assert!(first < second && second < third);
        assert!(out.ends_with("abc"));
        assert!(!out.contains("Connection: close"));
    }

    #[tokio::test]
    async fn http10_closes_after_response() {
        let (_dir, service) = site();
        let out = exchange(&service, b"GET /nowhere HTTP/1.0\r\n\r\nGET /nowhere HTTP/1.0\r\n\r\n").await;
        assert_eq!(out.matches("HTTP/1.1 404 Not Found").count(), 1);
        assert!(out.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn built_in_methods() {
        let (_dir, service) = site();

        let out = exchange(&service, b"HEAD /static/index.html HTTP/1.1\r\nHost: a\r\n\r\n").await;
        let (head, body) = split(&out);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
        assert_eq!(header(head, "Content-Length"), Some("13"));
        assert!(body.is_empty());

        let out = exchange(&service, b"DELETE /echo HTTP/1.1\r\nHost: a\r\n\r\n").await;
        let (head, _) = split(&out);
        assert!(head.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{head}");
        assert_eq!(header(head, "Allow"), Some("POST, PUT, OPTIONS, TRACE"));

        let out = exchange(&service, b"BREW /echo HTTP/1.1\r\nHost: a\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 501 Not Implemented\r\n"), "{out}");

        let out = exchange(&service, b"OPTIONS * HTTP/1.1\r\nHost: a\r\n\r\n").await;
        let (head, _) = split(&out);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
        let allow = header(head, "Allow").unwrap();
        for method in ["GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"] {
            assert!(allow.contains(method), "{allow}");
        }

        let out = exchange(&service, b"TRACE /echo HTTP/1.1\r\nHost: a\r\nX-Trace: 1\r\n\r\n").await;
        let (head, body) = split(&out);
        assert_eq!(header(head, "Content-Type"), Some("message/http"));
        assert_eq!(body, "TRACE /echo HTTP/1.1\r\nHost: a\r\nX-Trace: 1\r\n\r\n");
    }

    #[tokio::test]
    async fn unknown_methods_without_catch_all() {
        let mut routes = Routes::new();
        routes.add("/echo", Method::POST, Arc::new(Echo)).unwrap();
        let service = Arc::new(Service::new(routes, &ServerConfig::default()).unwrap());

        let out = exchange(&service, b"BREW /nowhere HTTP/1.1\r\nHost: a\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 501 Not Implemented\r\n"), "{out}");

        let out = exchange(&service, b"GET /nowhere HTTP/1.1\r\nHost: a\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"), "{out}");
    }

    #[tokio::test]
    async fn rejected_requests() {
        let (_dir, service) = site();

        for (request, status) in [
            ("GET / HTTP/1.1\r\n\r\n", "400 Bad Request"),
            ("GET / HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n", "400 Bad Request"),
            ("GET / HTTP/1.1\r\nHost: a\r\nExpect: teapot\r\n\r\n", "417 Expectation Failed"),
            ("GET / HTTP/2.0\r\nHost: a\r\n\r\n", "505 HTTP Version Not Supported"),
            ("GARBAGE\r\n\r\n", "400 Bad Request"),
        ] {
            let requests = format!("{request}GET /nowhere HTTP/1.1\r\nHost: a\r\n\r\n");
            let out = exchange(&service, requests.as_bytes()).await;
            assert!(out.starts_with(&format!("HTTP/1.1 {status}\r\n")), "{out}");
            assert!(out.contains("Connection: close\r\n"));
            assert_eq!(out.matches("HTTP/1.1 ").count(), 1, "{out}");
        }
    }

    #[tokio::test]
    async fn expect_continue() {
        let (_dir, service) = site();
        let out =
            exchange(&service, b"POST /echo HTTP/1.1\r\nHost: a\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\nok").await;
        assert!(out.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"), "{out}");
        assert!(out.ends_with("\r\n\r\nok"));
    }

    #[tokio::test]
    async fn handler_failures() {
        let (_dir, service) = site();

        let out = exchange(&service, b"GET /fail/error HTTP/1.1\r\nHost: a\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{out}");

        let out = exchange(&service, b"GET /fail/panic HTTP/1.1\r\nHost: a\r\n\r\nGET /nowhere HTTP/1.1\r\nHost: a\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{out}");
        assert!(out.contains("HTTP/1.1 404 Not Found\r\n"));

        let out = exchange(&service, b"GET /fail/dirty HTTP/1.1\r\nHost: a\r\n\r\n").await;
        let (head, body) = split(&out);
        assert!(head.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{head}");
        for name in ["Location", "ETag", "Content-Range"] {
            assert_eq!(header(head, name), None, "{head}");
        }
        assert_eq!(header(head, "Content-Type"), Some("text/html; charset=utf-8"));
        assert!(body.contains("500 Internal Server Error"));

        let out = exchange(&service, b"GET /fail/other HTTP/1.1\r\nHost: a\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 418 I'm a teapot\r\n"), "{out}");

        let out = exchange(&service, b"GET /fail/partial HTTP/1.1\r\nHost: a\r\n\r\nGET /nowhere HTTP/1.1\r\nHost: a\r\n\r\n").await;
        let (head, body) = split(&out);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
        assert_eq!(body, "7\r\npartial\r\n");
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn connection_future_is_send() {
        let (_dir, service) = site();
        let (_client, server) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(server);
        let process = HttpConnection::new(reader, writer, None).process(service, CancellationToken::new());
        assert_send(&process);
    }

    #[tokio::test]
    async fn silent_close() {
        let (_dir, service) = site();
        let (out, result) = exchange_with_result(&service, b"").await;
        assert!(out.is_empty());
        assert!(result.is_ok());

        let (out, result) = exchange_with_result(&service, b"\r\n\r\n").await;
        assert!(out.is_empty());
        assert!(result.is_ok());

        let (out, _) = exchange_with_result(&service, b"GET /nowh").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn cors_headers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.cors.allow_origin = Some("*".to_string());
        config.cors.max_age = Some(600);
        let service = service_with(dir.path(), &config);

        let out = exchange(&service, b"PUT /echo HTTP/1.1\r\nHost: a\r\nOrigin: http://b\r\nContent-Length: 0\r\n\r\n").await;
        let (head, _) = split(&out);
        assert_eq!(header(head, "Access-Control-Allow-Origin"), Some("*"));

        let preflight = b"OPTIONS /echo HTTP/1.1\r\nHost: a\r\nOrigin: http://b\r\n\
            Access-Control-Request-Method: PUT\r\nAccess-Control-Request-Headers: X-Token\r\n\r\n";
        let out = exchange(&service, preflight).await;
        let (head, _) = split(&out);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
        assert_eq!(header(head, "Access-Control-Allow-Methods"), Some("POST, PUT, OPTIONS, TRACE"));
        assert_eq!(header(head, "Access-Control-Allow-Headers"), Some("X-Token"));
        assert_eq!(header(head, "Access-Control-Max-Age"), Some("600"));

        let out = exchange(&service, b"PUT /echo HTTP/1.1\r\nHost: a\r\nContent-Length: 0\r\n\r\n").await;
        assert!(!out.contains("Access-Control"));
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeouts() {
        let (_dir, service) = site();

        // in the middle of a request head
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let connection = HttpConnection::new(reader, writer, Some(Duration::from_secs(5)));
        let task = tokio::spawn(connection.process(Arc::clone(&service), CancellationToken::new()));
        client.write_all(b"GET / HTTP/1.1\r\nHost: a\r\n").await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.starts_with(b"HTTP/1.1 408 Request Timeout\r\n"));
        assert!(task.await.unwrap().is_err());

        // idle between requests
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let connection = HttpConnection::new(reader, writer, Some(Duration::from_secs(5)));
        let task = tokio::spawn(connection.process(Arc::clone(&service), CancellationToken::new()));
        client.write_all(b"GET /nowhere HTTP/1.1\r\nHost: a\r\n\r\n").await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out).matches("HTTP/1.1 ").count(), 1);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn stops_between_requests() {
        let (_dir, service) = site();
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(HttpConnection::new(reader, writer, None).process(service, shutdown.clone()));

        client.write_all(b"GET /nowhere HTTP/1.1\r\nHost: a\r\n\r\n").await.unwrap();
        let mut buf = vec![0; 1024];
        let read = client.read(&mut buf).await.unwrap();
        assert!(buf[..read].starts_with(b"HTTP/1.1 404 Not Found\r\n"));

        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
    }
}
