//! Route registration, binding and the listen token.
//!
//! An [`App`] collects `(verb, pattern, handler)` registrations; [`listen`]
//! builds the pattern matcher, binds a TCP listener and spawns the accept
//! loop. The returned [`ListenToken`] is the only way to stop it — closing is
//! exactly-once by ownership.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::conn::{Connection, RouteFn};
use crate::protocol::{ListenError, Method};

/// Socket options of an app, mirroring the original option surface.
///
/// TLS is not implemented by this engine: asking for `ssl` fails app
/// creation so startup surfaces the misconfiguration instead of silently
/// serving plaintext.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub ssl: bool,
    pub key: Option<String>,
    pub cert: Option<String>,
    pub passphrase: Option<String>,
    pub dh_params: Option<String>,
    pub prefer_low_memory_usage: bool,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("ssl is not supported by this engine")]
    SslUnsupported,
}

/// An app under construction: registered routes plus socket options.
pub struct App {
    routes: Vec<(Method, String, RouteFn)>,
    #[allow(dead_code, reason = "held for the option surface; only ssl is inspected today")]
    options: AppOptions,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").field("routes", &self.routes.len()).finish_non_exhaustive()
    }
}

impl App {
    pub fn create(options: AppOptions) -> Result<Self, AppError> {
        if options.ssl {
            return Err(AppError::SslUnsupported);
        }
        Ok(Self { routes: Vec::new(), options })
    }

    /// Registers one route. Patterns use the original syntax: literal
    /// segments, `:name` captures and a trailing `/*` catch-all.
    pub fn register(&mut self, method: Method, pattern: &str, handler: RouteFn) {
        self.routes.push((method, pattern.to_string(), handler));
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// Path parameters captured by the matched route pattern.
#[derive(Debug, Default)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

struct RouteEntry {
    method: Method,
    handler: RouteFn,
}

/// The built, immutable route table a connection resolves against.
pub struct Router {
    inner: matchit::Router<Vec<RouteEntry>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

/// Translates an original-style pattern into the matchit patterns it covers.
///
/// `:name` segments become `{name}` captures; a trailing `/*` becomes a
/// catch-all plus the bare prefix, so `/files/*` also matches `/files`.
fn compile_pattern(pattern: &str) -> Vec<String> {
    let translated = pattern
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/");

    match translated.strip_suffix("/*") {
        Some(prefix) => {
            let catch_all = format!("{prefix}/{{*rest}}");
            if prefix.is_empty() {
                vec![catch_all, "/".to_string()]
            } else {
                vec![catch_all, prefix.to_string()]
            }
        }
        None => vec![translated],
    }
}

impl Router {
    fn build(app: App) -> Self {
        let mut grouped: Vec<(String, Vec<RouteEntry>)> = Vec::new();

        for (method, pattern, handler) in app.routes {
            for compiled in compile_pattern(&pattern) {
                let entry = RouteEntry { method, handler: Arc::clone(&handler) };
                match grouped.iter_mut().find(|(path, _)| *path == compiled) {
                    Some((_, entries)) => entries.push(entry),
                    None => grouped.push((compiled, vec![entry])),
                }
            }
        }

        let mut inner = matchit::Router::new();
        for (path, entries) in grouped {
            debug!(path = %path, routes = entries.len(), "insert route");
            if let Err(e) = inner.insert(path.clone(), entries) {
                error!("can't insert route '{}': {}", path, e);
            }
        }

        Self { inner }
    }

    /// Finds the handler for a path and method, first registered wins.
    pub fn resolve(&self, path: &str, method: &http::Method) -> Option<(RouteFn, PathParams)> {
        let matched = self.inner.at(path).ok()?;

        let handler = matched
            .value
            .iter()
            .find(|entry| entry.method.matches(method))
            .map(|entry| Arc::clone(&entry.handler))?;

        let params = PathParams {
            params: matched.params.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect(),
        };

        Some((handler, params))
    }
}

/// A live bound socket. Created by [`listen`], consumed exactly once by
/// [`close`](ListenToken::close).
#[derive(Debug)]
pub struct ListenToken {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    #[allow(dead_code, reason = "keeps the accept loop owned by the token")]
    handle: JoinHandle<()>,
}

impl ListenToken {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops the accept loop. Connections already accepted finish on their own.
    pub fn close(self) {
        let _ = self.shutdown.send(true);
    }
}

/// Binds `host:port` and starts accepting connections.
///
/// Any bind failure — port in use, invalid host — surfaces as the missing
/// token; the io-level cause is only logged.
pub async fn listen(app: App, host: &str, port: u16) -> Result<ListenToken, ListenError> {
    let router = Arc::new(Router::build(app));

    let listener = TcpListener::bind((host, port)).await.map_err(|e| {
        warn!(host = host, port = port, cause = %e, "bind failed");
        ListenError::MissingToken
    })?;

    let addr = listener.local_addr().map_err(|e| {
        warn!(cause = %e, "no local addr for listener");
        ListenError::MissingToken
    })?;

    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("listener closed");
                    return;
                }

                accepted = listener.accept() => {
                    let (tcp_stream, _remote_addr) = match accepted {
                        Ok(stream_and_addr) => stream_and_addr,
                        Err(e) => {
                            warn!(cause = %e, "failed to accept");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    tokio::spawn(async move {
                        match Connection::new(tcp_stream, router).process().await {
                            Ok(()) => info!("finished process, connection shutdown"),
                            Err(e) => error!("connection error, cause {}, connection shutdown", e),
                        }
                    });
                }
            }
        }
    });

    Ok(ListenToken { addr, shutdown, handle })
}
