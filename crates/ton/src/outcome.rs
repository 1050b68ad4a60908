//! What a handler hands back to the send pipeline.
//!
//! The original let handlers return whatever shape they liked and sniffed it
//! at runtime; here that contract is a closed sum type. `From` impls keep the
//! ergonomics for the common cases.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::HttpError;

/// A handler's produced payload, dispatched by [`send`](crate::send::send).
#[derive(Debug)]
pub enum Outcome {
    /// No body: a 204
    Empty,
    /// Plain text
    Text(String),
    /// A JSON document
    Json(Value),
    /// A byte stream, written under backpressure
    Stream(ByteStream),
    /// An error to route through the error writer
    Failure(HttpError),
}

impl Outcome {
    /// Serializes any `Serialize` value into a JSON outcome.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        let value = serde_json::to_value(value)
            .map_err(|e| HttpError::server_error(500, "can't serialize response body").with_cause(e))?;
        Ok(Outcome::Json(value))
    }
}

impl From<&str> for Outcome {
    fn from(value: &str) -> Self {
        Outcome::Text(value.to_owned())
    }
}

impl From<String> for Outcome {
    fn from(value: String) -> Self {
        Outcome::Text(value)
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Json(value)
    }
}

impl From<HttpError> for Outcome {
    fn from(value: HttpError) -> Self {
        Outcome::Failure(value)
    }
}

impl From<ByteStream> for Outcome {
    fn from(value: ByteStream) -> Self {
        Outcome::Stream(value)
    }
}

/// A lazy, single-pass, forward-only sequence of byte chunks.
///
/// The declared `size`, when known, lets the response writer use the
/// combined write-and-close path; without it the body is close-delimited.
/// The writer takes ownership for the duration of the send and drops the
/// stream on every exit path.
pub struct ByteStream {
    inner: BoxStream<'static, Result<Bytes, HttpError>>,
    size: Option<u64>,
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream").field("size", &self.size).finish_non_exhaustive()
    }
}

impl ByteStream {
    /// A stream with no declared size; the response will be close-delimited.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, HttpError>> + Send + 'static,
    {
        Self { inner: stream.boxed(), size: None }
    }

    /// A stream with a known total byte size.
    pub fn sized<S>(stream: S, size: u64) -> Self
    where
        S: Stream<Item = Result<Bytes, HttpError>> + Send + 'static,
    {
        Self { inner: stream.boxed(), size: Some(size) }
    }

    /// A one-chunk stream over bytes already in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::sized(futures::stream::iter([Ok(bytes)]), size)
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }
}

impl Stream for ByteStream {
    type Item = Result<Bytes, HttpError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
