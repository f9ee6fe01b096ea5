use http::StatusCode;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("missing request line")]
    MissingRequestLine,

    #[error("invalid request line: {reason}")]
    InvalidRequestLine { reason: String },

    #[error("request uri too long, exceed the limit {max_size}")]
    UriTooLong { max_size: usize },

    #[error("unsupported http version: {version}")]
    UnsupportedVersion { version: String },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri: {uri}")]
    InvalidUri { uri: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("unsupported transfer-encoding: {value}")]
    UnsupportedTransferEncoding { value: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("stream ended before the body was complete")]
    PrematureEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_request_line<S: ToString>(str: S) -> Self {
        Self::InvalidRequestLine { reason: str.to_string() }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { uri: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Whether the failure is a socket read timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io { source } if source.kind() == io::ErrorKind::TimedOut)
    }

    /// The status a server answers with when this error prevented a request from being parsed.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UriTooLong { .. } => StatusCode::URI_TOO_LONG,
            Self::UnsupportedVersion { .. } => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            e if e.is_timeout() => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("response headers were already sent")]
    HeadersAlreadySent,

    #[error("response headers have not been sent yet")]
    HeadersNotSent,

    #[error("invalid header: {source}")]
    InvalidHeader {
        #[from]
        source: HeaderError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Rejected header field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header name must not be empty")]
    EmptyName,

    #[error("invalid header name: {name:?}")]
    InvalidName { name: String },

    #[error("header value of {name} contains a line break")]
    InvalidValue { name: String },
}

impl From<HeaderError> for ParseError {
    fn from(e: HeaderError) -> Self {
        ParseError::invalid_header(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_status() {
        assert_eq!(ParseError::UriTooLong { max_size: 8192 }.status(), StatusCode::URI_TOO_LONG);
        assert_eq!(ParseError::invalid_request_line("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ParseError::UnsupportedVersion { version: "HTTP/2.0".into() }.status(),
            StatusCode::HTTP_VERSION_NOT_SUPPORTED
        );
        let timeout = ParseError::io(io::Error::from(io::ErrorKind::TimedOut));
        assert!(timeout.is_timeout());
        assert_eq!(timeout.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
