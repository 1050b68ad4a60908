use std::fmt;

/// Route verb: the HTTP methods a route can be registered under, plus the
/// `Any` wildcard that matches every method.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Options,
    Del,
    Patch,
    Put,
    Head,
    Connect,
    Trace,
    Any,
}

impl Method {
    /// Whether a request with the given wire method is served by this verb.
    pub fn matches(&self, method: &http::Method) -> bool {
        match self {
            Method::Get => method == http::Method::GET,
            Method::Post => method == http::Method::POST,
            Method::Options => method == http::Method::OPTIONS,
            Method::Del => method == http::Method::DELETE,
            Method::Patch => method == http::Method::PATCH,
            Method::Put => method == http::Method::PUT,
            Method::Head => method == http::Method::HEAD,
            Method::Connect => method == http::Method::CONNECT,
            Method::Trace => method == http::Method::TRACE,
            Method::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Options => "options",
            Method::Del => "del",
            Method::Patch => "patch",
            Method::Put => "put",
            Method::Head => "head",
            Method::Connect => "connect",
            Method::Trace => "trace",
            Method::Any => "any",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
