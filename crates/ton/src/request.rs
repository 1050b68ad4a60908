//! The read-only request view handlers receive.

use http::HeaderMap;
use ton_engine::app::PathParams;
use ton_engine::protocol::RequestHead;

/// One inbound request: method, path, headers and the parameters captured by
/// the matched route pattern.
#[derive(Debug)]
pub struct Request {
    head: RequestHead,
    params: PathParams,
}

impl Request {
    pub fn new(head: RequestHead, params: PathParams) -> Self {
        Self { head, params }
    }

    pub fn method(&self) -> &http::Method {
        self.head.method()
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.head.query()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    /// A path parameter captured by the route pattern, e.g. `:id`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.head.content_length()
    }
}
