//! The per-request response state machine.
//!
//! A [`Response`] owns its transport plus two pieces of state: the lazily set
//! status code and the `finalized` flag. Once finalized no further write is
//! permitted — every send path checks the flag first and raises a 500 the
//! caller is expected to catch and log, never to crash on.

use ton_engine::transport::{AbortSignal, Transport};

use crate::error::HttpError;

pub(crate) const FINALIZED_MESSAGE: &str = "can't send anything after response was finalized";

/// One response, exactly one per request.
#[derive(Debug)]
pub struct Response<T> {
    transport: T,
    status_code: Option<u16>,
    finalized: bool,
}

impl<T: Transport> Response<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, status_code: None, finalized: false }
    }

    /// The status code a send explicitly wrote, if any.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub(crate) fn set_status_code(&mut self, status: u16) {
        self.status_code = Some(status);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Marks the response terminal. Idempotent.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Handler-adapter entry: a fresh invocation starts unfinalized.
    pub(crate) fn reset(&mut self) {
        self.finalized = false;
    }

    /// Whether the client connection is known to be gone. An aborted
    /// response is as terminal as a finalized one.
    pub fn is_aborted(&self) -> bool {
        self.transport.is_aborted()
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.transport.abort_signal()
    }

    /// The write-permission check every send path goes through.
    pub fn check_writable(&self) -> Result<(), HttpError> {
        if self.finalized || self.transport.is_aborted() {
            return Err(HttpError::server_error(500, FINALIZED_MESSAGE));
        }
        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
