//! Streaming `multipart/form-data` reader over a request body.

use crate::codec::multipart::{MultipartDecoder, MultipartItem};
use crate::protocol::{Headers, ParseError, RequestBody};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Reads the parts of a multipart body one after the other.
///
/// ```ignore
/// let mut multipart = request.multipart()?;
/// while let Some(part) = multipart.next_part().await? {
///     let data = multipart.read_part().await?;
/// }
/// ```
#[derive(Debug)]
pub struct Multipart<'a, 'conn> {
    body: &'a mut RequestBody<'conn>,
    decoder: MultipartDecoder,
    buf: BytesMut,
    /// the request body is exhausted
    eof: bool,
    /// data of the current part remains unread
    in_part: bool,
    /// the terminal boundary was read
    done: bool,
}

/// Headers and form-data disposition of one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    headers: Headers,
    name: Option<String>,
    filename: Option<String>,
}

impl Part {
    fn new(headers: Headers) -> Self {
        let disposition = headers.params("content-disposition");
        let name = disposition.as_ref().and_then(|d| d.get("name")).map(str::to_string);
        let filename = disposition.as_ref().and_then(|d| d.get("filename")).map(str::to_string);
        Self { headers, name, filename }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The form field name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The file name, present for file uploads.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

impl<'a, 'conn> Multipart<'a, 'conn> {
    pub fn new(body: &'a mut RequestBody<'conn>, boundary: &str) -> Result<Self, ParseError> {
        Ok(Self {
            body,
            decoder: MultipartDecoder::new(boundary)?,
            buf: BytesMut::new(),
            eof: false,
            in_part: false,
            done: false,
        })
    }

    /// Advances to the next part, skipping whatever is left of the current one.
    ///
    /// Returns `None` once the terminal boundary has been read.
    pub async fn next_part(&mut self) -> Result<Option<Part>, ParseError> {
        while self.in_part {
            self.chunk().await?;
        }
        if self.done {
            return Ok(None);
        }

        match self.next_item().await? {
            MultipartItem::Headers(headers) => {
                self.in_part = true;
                Ok(Some(Part::new(headers)))
            }
            MultipartItem::End => {
                self.done = true;
                Ok(None)
            }
            _ => Err(ParseError::invalid_body("expected multipart part headers")),
        }
    }

    /// Reads the next piece of the current part, `None` at its end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ParseError> {
        if !self.in_part {
            return Ok(None);
        }
        match self.next_item().await? {
            MultipartItem::Data(bytes) => Ok(Some(bytes)),
            MultipartItem::PartEnd => {
                self.in_part = false;
                Ok(None)
            }
            _ => Err(ParseError::invalid_body("unexpected multipart item inside a part")),
        }
    }

    /// Reads the rest of the current part into memory.
    pub async fn read_part(&mut self) -> Result<Bytes, ParseError> {
        let mut data = BytesMut::new();
        while let Some(bytes) = self.chunk().await? {
            data.extend_from_slice(&bytes);
        }
        Ok(data.freeze())
    }

    async fn next_item(&mut self) -> Result<MultipartItem, ParseError> {
        loop {
            if let Some(item) = self.decoder.decode(&mut self.buf)? {
                return Ok(item);
            }
            if self.eof {
                return self
                    .decoder
                    .decode_eof(&mut self.buf)?
                    .ok_or_else(|| ParseError::invalid_body("multipart body ended unexpectedly"));
            }
            match self.body.chunk().await? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }
}
