//! An asynchronous native socket engine for the ton web framework
//!
//! This crate owns everything below the framework's send/read pipeline: the
//! TCP accept loop, HTTP/1.1 request decoding, route-pattern matching and the
//! per-response transport surface that the framework writes through.
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`protocol`]: Protocol types (request head, payload items, route verbs, errors)
//! - [`codec`]: Request decoding (head parsing plus length/chunked body framing)
//! - [`transport`]: The [`transport::Transport`] trait — the write/read surface of one response
//! - [`conn`]: The socket-backed transport implementation and the connection loop
//! - [`app`]: Route registration, binding and the listen token
//!
//! # Core Components
//!
//! ## Transport
//!
//! A response is written through [`transport::Transport`]: stage a status line
//! and headers, then either a combined write-and-close for known-size bodies
//! (`try_end`), an incremental close-delimited `write`, or a terminal `end`.
//! Backpressure surfaces as a partial `try_end` acceptance; callers pause
//! their source and resume from [`transport::Transport::write_offset`] once
//! [`transport::Transport::writable`] resolves.
//!
//! ## Connection handling
//!
//! [`conn::Connection`] drives one TCP connection: it decodes request heads,
//! pumps body chunks to the handler concurrently with the handler's own
//! execution, flushes staged response bytes to the socket, and drains unread
//! request bodies so keep-alive connections stay in a clean state.
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - No TLS support (the option surface exists, the handshake does not)
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod app;
pub mod codec;
pub mod conn;
pub mod date;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
