//! Body framing decoders.
//!
//! [`LengthDecoder`] handles `Content-Length` bodies, [`ChunkedDecoder`]
//! handles chunked transfer encoding ([RFC 9112 §7.1]). Both produce
//! [`PayloadItem`] chunks followed by exactly one [`PayloadItem::Eof`].
//!
//! [RFC 9112 §7.1]: https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding

use std::cmp;

use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Body decoder selected from a request's [`PayloadSize`].
#[derive(Debug)]
pub enum BodyDecoder {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    /// No body: yields `Eof` immediately
    Empty,
}

impl From<PayloadSize> for BodyDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(n) => BodyDecoder::Length(LengthDecoder::new(n)),
            PayloadSize::Chunked => BodyDecoder::Chunked(ChunkedDecoder::new()),
            PayloadSize::Empty => BodyDecoder::Empty,
        }
    }
}

impl Decoder for BodyDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            BodyDecoder::Length(decoder) => decoder.decode(src),
            BodyDecoder::Chunked(decoder) => decoder.decode(src),
            BodyDecoder::Empty => Ok(Some(PayloadItem::Eof)),
        }
    }
}

/// Decoder for bodies with a known `Content-Length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// Bytes of the body still to be read
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.remaining, src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

/// Decoder for chunked transfer encoding.
///
/// Each chunk is a hex size line (extensions ignored), CRLF, the chunk data
/// and a trailing CRLF; a zero-size chunk ends the body. Trailer fields are
/// read and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    /// Bytes left in the chunk currently being read
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Accumulating the hex size line (including extensions) up to its CRLF
    SizeLine,
    /// Reading `remaining` bytes of chunk data
    Data,
    /// Expecting the CRLF that terminates a chunk's data
    DataCrlf,
    /// Discarding trailer lines until the empty line
    Trailers,
    /// Body complete
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::SizeLine, remaining: 0 }
    }

    fn parse_size_line(line: &[u8]) -> Result<u64, ParseError> {
        // extensions follow the size after ';' and are ignored
        let size_part = line.split(|b| *b == b';').next().unwrap_or_default();
        let size_str = std::str::from_utf8(size_part)
            .map_err(|_| ParseError::invalid_body("chunk size line is not ascii"))?
            .trim();
        u64::from_str_radix(size_str, 16).map_err(|_| ParseError::invalid_body("invalid chunk size line"))
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds one CRLF-terminated line in `src`, splitting it off (CRLF removed).
fn split_line(src: &mut BytesMut) -> Option<BytesMut> {
    let lf = src.iter().position(|b| *b == b'\n')?;
    let mut line = src.split_to(lf + 1);
    line.truncate(lf);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Some(line)
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::SizeLine => {
                    let Some(line) = split_line(src) else { return Ok(None) };
                    let size = Self::parse_size_line(&line)?;
                    if size == 0 {
                        self.state = ChunkedState::Trailers;
                    } else {
                        self.remaining = size;
                        self.state = ChunkedState::Data;
                    }
                }

                ChunkedState::Data => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = cmp::min(self.remaining, src.len() as u64);
                    let bytes = src.split_to(len as usize).freeze();
                    self.remaining -= bytes.len() as u64;
                    if self.remaining == 0 {
                        self.state = ChunkedState::DataCrlf;
                    }
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                ChunkedState::DataCrlf => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(ParseError::invalid_body("chunk data not terminated by CRLF"));
                    }
                    src.advance(2);
                    self.state = ChunkedState::SizeLine;
                }

                ChunkedState::Trailers => {
                    let Some(line) = split_line(src) else { return Ok(None) };
                    if line.is_empty() {
                        self.state = ChunkedState::Done;
                    }
                }

                ChunkedState::Done => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}
