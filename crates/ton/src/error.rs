//! The error taxonomy: client errors (4xx) and server errors (5xx).
//!
//! Client errors are caused by bad input and are always safe to reveal to the
//! caller; they are never logged as faults. Server errors carry an optional
//! wrapped cause for diagnostics; the error writer logs them exactly once and
//! in production redacts their message from the wire.

use std::error::Error;

use serde_json::Value;
use thiserror::Error;

/// A status-carrying error, the one error type handlers deal in.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HttpError {
    status: u16,
    message: String,
    /// structured field-validation payload, only meaningful on 4xx
    fields: Option<Value>,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl HttpError {
    /// A 4xx error: the caller's fault, message safe to disclose.
    pub fn client_error(status: u16, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), fields: None, source: None }
    }

    /// A 5xx error: the system's fault, logged on send.
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), fields: None, source: None }
    }

    /// Attaches a field-validation payload (for 4xx validation failures).
    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Wraps the originating error for diagnostic logging.
    pub fn with_cause(mut self, cause: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        self.source = Some(cause.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> Option<&Value> {
        self.fields.as_ref()
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500 || self.status == 0
    }

    /// The wrapped cause when present, the error itself otherwise. This is
    /// what the error writer logs for 5xx.
    pub fn root_cause(&self) -> &(dyn Error + 'static) {
        match &self.source {
            Some(source) => source.as_ref(),
            None => self,
        }
    }
}

/// Foreign errors funnel in as 500s wrapping the original as cause; its
/// message stays visible so development mode can reveal it.
impl From<Box<dyn Error + Send + Sync>> for HttpError {
    fn from(cause: Box<dyn Error + Send + Sync>) -> Self {
        Self::server_error(500, cause.to_string()).with_cause(cause)
    }
}

impl From<std::io::Error> for HttpError {
    fn from(cause: std::io::Error) -> Self {
        Self::server_error(500, cause.to_string()).with_cause(cause)
    }
}

/// The reason phrase of a status code; unknown codes read as 500's.
pub fn reason_phrase(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Internal Server Error")
}

/// Collapses zero or unknown status codes to 500 for the wire.
pub(crate) fn normalize_status(status: u16) -> u16 {
    match http::StatusCode::from_u16(status) {
        Ok(code) if code.canonical_reason().is_some() => status,
        _ => 500,
    }
}

/// Error-redaction mode, the original's production switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Reads `TON_ENV`; anything but `production` is development.
    pub fn from_env() -> Self {
        match std::env::var("TON_ENV") {
            Ok(value) if value == "production" => Mode::Production,
            _ => Mode::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }
}
