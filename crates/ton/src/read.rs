//! Size-bounded readers over the inbound request body.
//!
//! Three buffered flavors — bytes, text, JSON — plus a live streaming one.
//! The byte limit is checked incrementally before any chunk is buffered, so
//! a client can't grow memory past the cap however it splits its upload.

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use ton_engine::transport::Transport;

use crate::error::{reason_phrase, HttpError};
use crate::request::Request;
use crate::response::Response;

/// Default inbound body cap: 1 MiB.
pub const DEFAULT_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub limit: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT }
    }
}

/// Text encodings accepted by [`read_text`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

#[derive(Debug, Clone, Copy)]
pub struct TextOptions {
    pub limit: usize,
    pub encoding: Encoding,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT, encoding: Encoding::default() }
    }
}

fn over_limit() -> HttpError {
    HttpError::client_error(413, reason_phrase(413))
}

fn body_aborted() -> HttpError {
    HttpError::server_error(500, "can't read body after request was aborted")
}

/// Accumulates the full body, resolving on the last chunk.
///
/// The instant `accumulated + incoming` would exceed the limit the read
/// fails with a 413 — the offending chunk is never concatenated, and chunks
/// after that are the connection's to discard.
pub async fn read_buffer<T: Transport>(res: &mut Response<T>, options: ReadOptions) -> Result<Bytes, HttpError> {
    let mut data = BytesMut::new();

    loop {
        let Some((chunk, is_last)) = res.transport_mut().recv_chunk().await else {
            return Err(body_aborted());
        };

        if data.len() + chunk.len() > options.limit {
            return Err(over_limit());
        }

        data.extend_from_slice(&chunk);

        if is_last {
            return Ok(data.freeze());
        }
    }
}

fn decode(body: &[u8], encoding: Encoding) -> Result<String, HttpError> {
    match encoding {
        Encoding::Utf8 => std::str::from_utf8(body)
            .map(str::to_owned)
            .map_err(|e| HttpError::client_error(400, "Invalid UTF-8").with_cause(e)),
        // the original's lossy legacy decoders: high bit masked off / mapped
        Encoding::Ascii => Ok(body.iter().map(|b| (b & 0x7f) as char).collect()),
        Encoding::Latin1 => Ok(body.iter().map(|b| *b as char).collect()),
    }
}

/// Reads the body as text in the given encoding (UTF-8 by default).
pub async fn read_text<T: Transport>(res: &mut Response<T>, options: TextOptions) -> Result<String, HttpError> {
    let body = read_buffer(res, ReadOptions { limit: options.limit }).await?;
    decode(&body, options.encoding)
}

/// Reads the body as JSON into any deserializable type.
pub async fn read_json<T: Transport, V: DeserializeOwned>(
    res: &mut Response<T>,
    options: TextOptions,
) -> Result<V, HttpError> {
    let text = read_text(res, options).await?;
    serde_json::from_str(&text).map_err(|e| HttpError::client_error(400, "Invalid JSON").with_cause(e))
}

/// A live view of the inbound body while it arrives.
///
/// `size()` starts from the declared `Content-Length` and is corrected
/// upward the moment more bytes than declared have been received — it never
/// under-reports. Crossing the limit yields one 413 error and fuses the
/// stream; the connection drains whatever else the client sends.
#[derive(Debug)]
pub struct BodyStream<'r, T> {
    res: &'r mut Response<T>,
    limit: usize,
    received: u64,
    size: u64,
    done: bool,
}

/// Exposes the request body as a stream of chunks.
pub fn read_stream<'r, T: Transport>(
    req: &Request,
    res: &'r mut Response<T>,
    options: ReadOptions,
) -> BodyStream<'r, T> {
    let declared = req.content_length().unwrap_or(0);
    BodyStream { res, limit: options.limit, received: 0, size: declared, done: false }
}

impl<T: Transport> BodyStream<'_, T> {
    /// The body size as currently known: the declared length, corrected
    /// upward once the wire disagrees.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The next chunk, `None` after the last one.
    pub async fn next(&mut self) -> Option<Result<Bytes, HttpError>> {
        loop {
            if self.done {
                return None;
            }

            let Some((chunk, is_last)) = self.res.transport_mut().recv_chunk().await else {
                self.done = true;
                return Some(Err(body_aborted()));
            };

            self.received += chunk.len() as u64;
            if self.received > self.size {
                self.size = self.received;
            }

            if self.received > self.limit as u64 {
                self.done = true;
                return Some(Err(over_limit()));
            }

            if is_last {
                self.done = true;
                if chunk.is_empty() {
                    return None;
                }
            }

            if chunk.is_empty() {
                continue;
            }

            return Some(Ok(chunk));
        }
    }
}
