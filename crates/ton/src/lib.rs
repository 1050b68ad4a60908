//! A minimal HTTP server framework over a native socket engine
//!
//! `ton` is the send/read pipeline on top of the `ton-engine` socket engine:
//! handlers return a typed [`Outcome`] (text, JSON, a byte stream, an error
//! or nothing) and the framework writes it to the wire correctly under the
//! transport's write-ordering and flow-control contract.
//!
//! # Example
//!
//! ```no_run
//! use ton::{
//!     create_app, get, listen, register_graceful_shutdown, AppOptions, Conn, HttpError, Outcome,
//!     Request, Response,
//! };
//!
//! async fn hello(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
//!     Ok(Some(Outcome::from("TonJS")))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut app = create_app(AppOptions::default())?;
//!     get(&mut app, "/", hello);
//!
//!     let token = listen(app, "0.0.0.0", 3000).await?;
//!     register_graceful_shutdown(token);
//!     Ok(())
//! }
//! ```
//!
//! # Core Components
//!
//! ## Send pipeline
//!
//! [`send`] dispatches on the outcome's shape: empty, text, JSON, stream or
//! error. The streaming writer ([`send_stream`]) rides the engine's
//! backpressure: a partially accepted chunk pauses the stream and the unsent
//! remainder is retried from the acknowledged write offset once the
//! transport drains.
//!
//! ## Body readers
//!
//! [`read_buffer`], [`read_text`] and [`read_json`] accumulate the inbound
//! body under a size cap (413 past it, checked before buffering);
//! [`read_stream`] exposes the body as a live chunk stream with a declared
//! size that is corrected upward when the wire sends more than announced.
//!
//! ## Errors
//!
//! [`HttpError`] carries the HTTP status: 4xx are the caller's fault and
//! never logged as faults, 5xx are logged exactly once and redacted from
//! the wire in production mode (`TON_ENV=production`).
//!
//! ## Responses
//!
//! A [`Response`] is a small state machine: once finalized — by a send, by
//! the client going away — every further write is refused with a caught,
//! logged 500. Exactly one response per request, finalized exactly once.

mod error;
mod handler;
mod lifecycle;
mod outcome;
mod read;
mod request;
mod response;
mod route;
mod send;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{reason_phrase, HttpError, Mode};
pub use handler::{handler_fn, BoxHandler, ErasedHandler, Handler};
pub use lifecycle::{
    close, create_app, listen, register_graceful_shutdown, App, AppError, AppOptions, ListenError, ListenToken,
    Shutdown,
};
pub use outcome::{ByteStream, Outcome};
pub use read::{
    read_buffer, read_json, read_stream, read_text, BodyStream, Encoding, ReadOptions, TextOptions, DEFAULT_LIMIT,
};
pub use request::Request;
pub use response::Response;
pub use route::{
    any, connect, del, get, head, options, patch, post, put, route, routes, trace, Endpoints, Route, RouteOptions,
};
pub use send::{
    redirect, send, send_empty, send_error, send_error_with, send_json, send_stream, send_text, write_headers,
    write_status, Headers,
};

pub use ton_engine::conn::Conn;
pub use ton_engine::protocol::Method;
pub use ton_engine::transport::{AbortSignal, Transport};
