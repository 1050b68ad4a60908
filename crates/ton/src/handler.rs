//! Handler traits and the adapter that funnels results into the send pipeline.
//!
//! A handler is any async fn of `(Request, &mut Response<T>)` returning
//! `Result<Option<Outcome>, HttpError>`. The borrow in the argument keeps a
//! plain `Fn` bound from working, so [`Handler`] carries the lifetime
//! explicitly and [`ErasedHandler`] boxes it for the route table.
//!
//! The adapter contract: every invocation starts with a fresh (unfinalized)
//! response; `Ok(Some(outcome))` is sent automatically with the response's
//! lazily set status (default 200); `Ok(None)` means the handler already
//! finalized the response itself and nothing more is sent; `Err` goes
//! through the error writer.

use std::pin::Pin;

use tracing::error;
use ton_engine::transport::Transport;

use crate::error::{HttpError, Mode};
use crate::outcome::Outcome;
use crate::request::Request;
use crate::response::Response;
use crate::send::{send, send_error_with};

/// One request handler, generic over the response borrow.
pub trait Handler<'a, T: Transport + 'a>: Send + Sync {
    type Fut: Future<Output = Result<Option<Outcome>, HttpError>> + Send + 'a;

    fn call(&self, req: Request, res: &'a mut Response<T>) -> Self::Fut;
}

impl<'a, T, F, Fut> Handler<'a, T> for F
where
    T: Transport + 'a,
    F: Fn(Request, &'a mut Response<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Outcome>, HttpError>> + Send + 'a,
{
    type Fut = Fut;

    fn call(&self, req: Request, res: &'a mut Response<T>) -> Fut {
        self(req, res)
    }
}

pub(crate) type BoxHandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Outcome>, HttpError>> + Send + 'a>>;

/// Object-safe handler as stored in routes.
pub trait ErasedHandler<T: Transport>: Send + Sync {
    fn call<'a>(&'a self, req: Request, res: &'a mut Response<T>) -> BoxHandlerFuture<'a>;

    /// The handler's diagnostic name for route listings.
    fn name(&self) -> &'static str;
}

pub type BoxHandler<T> = Box<dyn ErasedHandler<T>>;

struct HandlerFn<H> {
    inner: H,
    name: &'static str,
}

impl<T, H> ErasedHandler<T> for HandlerFn<H>
where
    T: Transport,
    H: for<'a> Handler<'a, T>,
{
    fn call<'a>(&'a self, req: Request, res: &'a mut Response<T>) -> BoxHandlerFuture<'a> {
        Box::pin(self.inner.call(req, res))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Boxes a handler for the route table, capturing its diagnostic name.
pub fn handler_fn<T, H>(handler: H) -> BoxHandler<T>
where
    T: Transport,
    H: for<'a> Handler<'a, T> + 'static,
{
    Box::new(HandlerFn { inner: handler, name: handler_name::<H>() })
}

/// Derives a diagnostic name from the handler's type; closures (and
/// anything else without a path-worthy name) report as `anonymous`.
pub(crate) fn handler_name<H>() -> &'static str {
    let full = std::any::type_name::<H>();
    let name = full.rsplit("::").next().unwrap_or(full);
    if name.contains("closure") { "anonymous" } else { name }
}

/// Invokes a handler under the adapter contract.
pub(crate) async fn invoke<T: Transport>(
    handler: &dyn ErasedHandler<T>,
    req: Request,
    res: &mut Response<T>,
    mode: Option<Mode>,
) {
    res.reset();

    match handler.call(req, res).await {
        // the handler finalized the response itself
        Ok(None) => {}

        Ok(Some(outcome)) => {
            let status = res.status_code().unwrap_or(200);
            if let Err(e) = send(res, status, outcome, &[]).await {
                error!(cause = %e, "can't send handler result");
            }
        }

        Err(err) => {
            send_error_with(res, &err, &[], mode.unwrap_or_else(Mode::from_env));
        }
    }
}
