//! Request head handling.
//!
//! Wraps the standard `http::Request` type so the rest of the engine and the
//! framework above it get one view of the method, path and headers.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// The decoded head of one inbound request.
#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
}

impl RequestHead {
    /// Consumes the head and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.uri().query()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Case-insensitive header lookup; values that are not valid UTF-8 read
    /// as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// The declared `Content-Length`, when present and well-formed.
    pub fn content_length(&self) -> Option<u64> {
        self.header(http::header::CONTENT_LENGTH.as_str()).and_then(|v| v.trim().parse().ok())
    }

    /// Whether the connection may be reused after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close`; HTTP/1.0
    /// only keeps the connection on an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header(http::header::CONNECTION.as_str());
        if self.version() == Version::HTTP_11 {
            !matches!(connection, Some(v) if v.eq_ignore_ascii_case("close"))
        } else if self.version() == Version::HTTP_10 {
            matches!(connection, Some(v) if v.eq_ignore_ascii_case("keep-alive"))
        } else {
            false
        }
    }

    /// Whether the client asked for a `100 Continue` before sending its body.
    pub fn expects_continue(&self) -> bool {
        matches!(self.header(http::header::EXPECT.as_str()), Some(v) if v.len() >= 4 && v.starts_with("100-"))
    }
}

impl From<Parts> for RequestHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
