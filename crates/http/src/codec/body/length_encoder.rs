use crate::protocol::{PayloadItem, SendError};
use bytes::BytesMut;
use tokio_util::codec::Encoder;

/// Encodes a body whose length was announced in `Content-Length`.
///
/// Writing more than the announced length, or finishing with bytes still owed,
/// is an error: the response would otherwise desynchronize the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_finish(&self) -> bool {
        self.remaining == 0
    }
}

impl Encoder<PayloadItem> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.len() as u64 > self.remaining {
                    return Err(SendError::invalid_body(format!(
                        "body exceeds declared length, {} bytes written with {} remaining",
                        bytes.len(),
                        self.remaining
                    )));
                }
                dst.extend_from_slice(&bytes);
                self.remaining -= bytes.len() as u64;
                Ok(())
            }
            PayloadItem::Eof if self.remaining > 0 => {
                Err(SendError::invalid_body(format!("body ended with {} of the declared bytes missing", self.remaining)))
            }
            PayloadItem::Eof => Ok(()),
        }
    }
}
