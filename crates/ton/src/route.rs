//! Route shapes and registration.
//!
//! An endpoint definition comes in three shapes — a bare handler, a single
//! route, or a list of routes — and all three normalize at registration time
//! into `(verb, pattern, handler)` entries on the engine's app. Matching
//! precedence is the engine's business; nothing here matches paths.

use std::sync::Arc;

use tracing::debug;
use ton_engine::app::App;
use ton_engine::conn::{Conn, RouteFn};
use ton_engine::protocol::Method;
use ton_engine::transport::Transport;

use crate::error::Mode;
use crate::handler::{handler_fn, invoke, BoxHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// Per-route options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptions {
    /// Error-redaction mode override; the environment decides when absent.
    pub mode: Option<Mode>,
}

/// One route entry.
pub struct Route<T: Transport = Conn> {
    pub method: Method,
    pub pattern: String,
    pub handler: BoxHandler<T>,
    pub options: RouteOptions,
}

impl<T: Transport> std::fmt::Debug for Route<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("handler", &self.handler.name())
            .finish_non_exhaustive()
    }
}

impl<T: Transport + Send + 'static> Route<T> {
    pub fn new<H>(method: Method, pattern: impl Into<String>, handler: H) -> Self
    where
        H: for<'a> Handler<'a, T> + 'static,
    {
        Self { method, pattern: pattern.into(), handler: handler_fn(handler), options: RouteOptions::default() }
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }
}

/// The three shapes an endpoint definition can take.
pub enum Endpoints {
    /// A bare handler: serves any method on `/*`
    Handler(BoxHandler<Conn>),
    Route(Route<Conn>),
    Routes(Vec<Route<Conn>>),
}

impl std::fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoints::Handler(handler) => f.debug_tuple("Handler").field(&handler.name()).finish(),
            Endpoints::Route(route) => f.debug_tuple("Route").field(route).finish(),
            Endpoints::Routes(routes) => f.debug_tuple("Routes").field(routes).finish(),
        }
    }
}

impl From<Route<Conn>> for Endpoints {
    fn from(route: Route<Conn>) -> Self {
        Endpoints::Route(route)
    }
}

impl From<Vec<Route<Conn>>> for Endpoints {
    fn from(routes: Vec<Route<Conn>>) -> Self {
        Endpoints::Routes(routes)
    }
}

/// Wraps a boxed handler as the engine-level route function.
fn adapt(handler: BoxHandler<Conn>, options: RouteOptions) -> RouteFn {
    let handler: Arc<dyn crate::handler::ErasedHandler<Conn>> = Arc::from(handler);
    Arc::new(move |head, params, conn| {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let req = Request::new(head, params);
            let mut res = Response::new(conn);
            invoke(handler.as_ref(), req, &mut res, options.mode).await;
        })
    })
}

fn register(app: &mut App, route: Route<Conn>) {
    debug!("  {} {} => {}()", route.method, route.pattern, route.handler.name());
    app.register(route.method, &route.pattern, adapt(route.handler, route.options));
}

/// Registers one handler under a verb and pattern.
pub fn route<H>(app: &mut App, method: Method, pattern: &str, handler: H)
where
    H: for<'a> Handler<'a, Conn> + 'static,
{
    register(app, Route::new(method, pattern, handler));
}

/// Registers an endpoint definition of any of the three shapes.
pub fn routes(app: &mut App, endpoints: impl Into<Endpoints>) {
    debug!("routes:");

    match endpoints.into() {
        Endpoints::Routes(list) => {
            for entry in list {
                register(app, entry);
            }
        }

        Endpoints::Route(entry) => register(app, entry),

        Endpoints::Handler(handler) => {
            register(app, Route { method: Method::Any, pattern: "/*".to_string(), handler, options: RouteOptions::default() });
        }
    }
}

macro_rules! method_route {
    ($name:ident, $method:ident) => {
        #[doc = concat!("Registers a `", stringify!($name), "` route.")]
        pub fn $name<H>(app: &mut App, pattern: &str, handler: H)
        where
            H: for<'a> Handler<'a, Conn> + 'static,
        {
            route(app, Method::$method, pattern, handler);
        }
    };
}

method_route!(any, Any);
method_route!(connect, Connect);
method_route!(del, Del);
method_route!(get, Get);
method_route!(head, Head);
method_route!(options, Options);
method_route!(patch, Patch);
method_route!(post, Post);
method_route!(put, Put);
method_route!(trace, Trace);
