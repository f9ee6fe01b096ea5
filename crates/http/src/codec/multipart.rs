//! Decoder for `multipart/form-data` bodies (RFC 2046 / RFC 7578).
//!
//! The body is scanned for the delimiter `CRLF--boundary`; the very first delimiter may
//! omit its leading CRLF. Everything before it is preamble and is discarded, everything
//! after the terminal delimiter `--boundary--` is epilogue and is discarded as well.
//!
//! For every part the decoder yields its headers, then its data in pieces, then a
//! [`MultipartItem::PartEnd`]. The terminal delimiter yields [`MultipartItem::End`].
//! A stream that ends before the terminal delimiter is a format error.

use crate::codec::header::{next_line, FieldDecoder, MAX_LINE_SIZE};
use crate::protocol::{Headers, ParseError};
use crate::utils::ensure;
use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem::Finder;
use tokio_util::codec::Decoder;
use tracing::trace;

/// RFC 2046 limits boundaries to 70 characters
const MAX_BOUNDARY_LEN: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartItem {
    /// headers of the next part
    Headers(Headers),
    /// a piece of the current part's data
    Data(Bytes),
    /// the current part's data is complete
    PartEnd,
    /// the terminal boundary was read
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    AfterBoundary,
    Headers,
    Data,
    Epilogue,
}

#[derive(Debug, Clone)]
pub struct MultipartDecoder {
    state: State,
    /// `CRLF--boundary`
    delimiter: Vec<u8>,
    finder: Finder<'static>,
    fields: FieldDecoder,
    /// no preamble bytes were discarded yet
    at_start: bool,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Result<Self, ParseError> {
        ensure!(
            !boundary.is_empty() && boundary.len() <= MAX_BOUNDARY_LEN,
            ParseError::invalid_body(format!("invalid multipart boundary {boundary:?}"))
        );

        let delimiter = format!("\r\n--{boundary}").into_bytes();
        let finder = Finder::new(&delimiter).into_owned();
        Ok(Self { state: State::Preamble, delimiter, finder, fields: FieldDecoder::new(), at_start: true })
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Epilogue
    }

    fn decode_preamble(&mut self, src: &mut BytesMut) -> Option<()> {
        // the first delimiter may come without its leading CRLF
        let dash_boundary = &self.delimiter[2..];
        if self.at_start && src.starts_with(dash_boundary) {
            src.advance(dash_boundary.len());
            return Some(());
        }
        if self.at_start && dash_boundary.starts_with(src) {
            return None;
        }

        match self.finder.find(src) {
            Some(index) => {
                src.advance(index + self.delimiter.len());
                self.at_start = false;
                Some(())
            }
            None => {
                if src.len() >= self.delimiter.len() {
                    // keep a tail that may hold the start of a delimiter
                    src.advance(src.len() - (self.delimiter.len() - 1));
                    self.at_start = false;
                }
                None
            }
        }
    }

    fn decode_data(&mut self, src: &mut BytesMut) -> Option<MultipartItem> {
        match self.finder.find(src) {
            Some(0) => {
                src.advance(self.delimiter.len());
                self.state = State::AfterBoundary;
                Some(MultipartItem::PartEnd)
            }
            Some(index) => Some(MultipartItem::Data(src.split_to(index).freeze())),
            None => {
                let safe = src.len().saturating_sub(self.delimiter.len() - 1);
                (safe > 0).then(|| MultipartItem::Data(src.split_to(safe).freeze()))
            }
        }
    }
}

impl Decoder for MultipartDecoder {
    type Item = MultipartItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Preamble => match self.decode_preamble(src) {
                    Some(()) => self.state = State::AfterBoundary,
                    None => return Ok(None),
                },

                State::AfterBoundary => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if src.starts_with(b"--") {
                        src.advance(2);
                        self.state = State::Epilogue;
                        trace!("read terminal multipart boundary");
                        return Ok(Some(MultipartItem::End));
                    }
                    let Some(line) = next_line(src, MAX_LINE_SIZE)? else {
                        return Ok(None);
                    };
                    // only transport padding may follow a boundary
                    ensure!(
                        line.iter().all(|b| *b == b' ' || *b == b'\t'),
                        ParseError::invalid_body("unexpected bytes after multipart boundary")
                    );
                    self.state = State::Headers;
                }

                State::Headers => {
                    return match self.fields.decode(src)? {
                        Some(headers) => {
                            self.state = State::Data;
                            Ok(Some(MultipartItem::Headers(headers)))
                        }
                        None => Ok(None),
                    };
                }

                State::Data => return Ok(self.decode_data(src)),

                State::Epilogue => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if self.state == State::Epilogue => Ok(None),
            None => Err(ParseError::invalid_body("multipart body ended before its terminal boundary")),
        }
    }
}
