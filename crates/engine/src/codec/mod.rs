//! Request decoding.
//!
//! Decoding happens in two phases behind one [`RequestDecoder`]: the head is
//! parsed with `httparse`, then the body is framed by a length or chunked
//! decoder selected from the head. Exactly one body decoder is in flight at a
//! time; once it yields [`PayloadItem::Eof`] the decoder is back in the head
//! phase for the next request on the connection.

mod body;
mod head_decoder;

pub use body::{BodyDecoder, ChunkedDecoder, LengthDecoder};
pub use head_decoder::HeadDecoder;

use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Streaming decoder for inbound HTTP/1.x requests.
pub struct RequestDecoder {
    head_decoder: HeadDecoder,
    body_decoder: Option<BodyDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { head_decoder: HeadDecoder, body_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(body_decoder) = &mut self.body_decoder {
            let message = match body_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.body_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.head_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.body_decoder = Some(BodyDecoder::from(payload_size));
                Some(Message::Head((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}
