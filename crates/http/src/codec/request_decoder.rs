//! Streaming decoder for HTTP requests.
//!
//! The decoder operates in two phases:
//! 1. the request head is parsed by [`HeaderDecoder`] and yielded as [`Message::Header`]
//! 2. the body, if any, is yielded piece by piece as [`Message::Payload`] by a
//!    [`PayloadDecoder`], ending with [`PayloadItem::Eof`]
//!
//! After the end-of-body marker the decoder is ready for the next request on the same
//! connection. Trailer fields of a chunked body are kept until [`RequestDecoder::take_trailers`].
//!
//! # Example
//!
//! ```
//! use tern_http::codec::RequestDecoder;
//! use tern_http::protocol::Message;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET /users/42 HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let Some(Message::Header(head)) = decoder.decode(&mut buffer).unwrap() else { panic!() };
//! assert_eq!(head.path(), "/users/42");
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Headers, Message, ParseError, PayloadItem, RequestHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// The decoder keeps its phase in `payload_decoder`:
/// - `None`: parsing the request head
/// - `Some(PayloadDecoder)`: parsing the body
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    trailers: Headers,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether a request is partially decoded: its request line, head or body has started.
    pub fn in_request(&self) -> bool {
        self.payload_decoder.is_some() || self.header_decoder.is_reading_fields()
    }

    /// Whether the decoder is in the middle of a body.
    pub fn in_body(&self) -> bool {
        self.payload_decoder.is_some()
    }

    /// Takes the trailer fields of the last chunked body.
    pub fn take_trailers(&mut self) -> Headers {
        std::mem::take(&mut self.trailers)
    }

    fn decode_payload(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<Message<RequestHead>>, ParseError> {
        let Some(payload_decoder) = &mut self.payload_decoder else {
            return Ok(None);
        };

        let item = if eof { payload_decoder.decode_eof(src)? } else { payload_decoder.decode(src)? };
        let message = match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                // the body is complete, the next bytes belong to the next request
                self.trailers = payload_decoder.take_trailers();
                self.payload_decoder = None;
                Some(Message::Payload(item))
            }
            None => None,
        };
        Ok(message)
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<RequestHead>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.payload_decoder.is_some() {
            return self.decode_payload(src, false);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.trailers = Headers::new();
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header(head))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.payload_decoder.is_some() {
            return self.decode_payload(src, true);
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            // a clean end of stream between requests
            None if src.iter().all(u8::is_ascii_whitespace) && !self.header_decoder.is_reading_fields() => Ok(None),
            None if self.header_decoder.is_reading_fields() => Err(ParseError::PrematureEof),
            None => Err(ParseError::MissingRequestLine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use indoc::indoc;

    #[test]
    fn pipelined_requests() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Host: localhost
        Content-Length: 5

        helloGET /next HTTP/1.1
        Host: localhost

        "##};

        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(str);

        let Some(Message::Header(head)) = decoder.decode(&mut buf).unwrap() else { panic!("expected head") };
        assert_eq!(head.method(), &Method::POST);
        assert!(decoder.in_body());

        let item = decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap();
        assert_eq!(item.as_bytes().unwrap().as_ref(), b"hello");
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert!(!decoder.in_request());

        let Some(Message::Header(head)) = decoder.decode(&mut buf).unwrap() else { panic!("expected head") };
        assert_eq!(head.path(), "/next");
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert!(buf.is_empty());
    }

    #[test]
    fn chunked_body_with_trailers() {
        let mut buf = BytesMut::from(
            &b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n"[..],
        );
        let mut decoder = RequestDecoder::new();

        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_header());
        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_payload());
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert_eq!(decoder.take_trailers().get("x-sum"), Some("1"));
    }

    #[test]
    fn end_of_stream() {
        let mut decoder = RequestDecoder::new();
        assert!(decoder.decode_eof(&mut BytesMut::new()).unwrap().is_none());
        assert!(decoder.decode_eof(&mut BytesMut::from("\r\n")).unwrap().is_none());

        let mut decoder = RequestDecoder::new();
        let result = decoder.decode_eof(&mut BytesMut::from("GET / HT"));
        assert!(matches!(result, Err(ParseError::MissingRequestLine)));

        let mut decoder = RequestDecoder::new();
        let result = decoder.decode_eof(&mut BytesMut::from("GET / HTTP/1.1\r\nHost: a\r\n"));
        assert!(matches!(result, Err(ParseError::PrematureEof)));

        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from("PUT / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_header());
        assert!(decoder.decode_eof(&mut buf).unwrap().unwrap().is_payload());
        assert!(matches!(decoder.decode_eof(&mut buf), Err(ParseError::PrematureEof)));
    }
}
