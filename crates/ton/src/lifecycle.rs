//! App creation, binding and graceful shutdown.
//!
//! The listen token is the opaque handle for a live bound socket: created on
//! a successful bind, consumed exactly once by `close` — ownership enforces
//! the exactly-once, the [`Shutdown`] guard makes the signal-driven path
//! single-fire even when several termination signals arrive.

use tokio::task::JoinHandle;
use tracing::{error, info};

pub use ton_engine::app::{App, AppError, AppOptions, ListenToken};
pub use ton_engine::protocol::ListenError;

/// Creates an app from socket options.
pub fn create_app(options: AppOptions) -> Result<App, AppError> {
    App::create(options)
}

/// Binds and starts serving. Resolves with the listen token, or rejects
/// with the missing token whatever the bind-level reason was.
pub async fn listen(app: App, host: &str, port: u16) -> Result<ListenToken, ListenError> {
    ton_engine::app::listen(app, host, port).await
}

/// Stops the listener. Consuming the token here is what makes a second
/// close impossible to express.
pub fn close(token: ListenToken) {
    token.close();
}

/// Single-fire shutdown guard around a listen token.
#[derive(Debug)]
pub struct Shutdown {
    token: Option<ListenToken>,
    has_been_shutdown: bool,
}

impl Shutdown {
    pub fn new(token: ListenToken) -> Self {
        Self { token: Some(token), has_been_shutdown: false }
    }

    /// Runs the close-and-log sequence; every call after the first is a
    /// no-op. Returns whether this call did the work.
    pub fn fire(&mut self) -> bool {
        if self.has_been_shutdown {
            return false;
        }
        self.has_been_shutdown = true;

        info!("gracefully shutting down. please wait...");
        if let Some(token) = self.token.take() {
            close(token);
        }
        true
    }
}

/// Installs interrupt/terminate handlers that close the listener exactly
/// once, however many signals arrive.
pub fn register_graceful_shutdown(token: ListenToken) -> JoinHandle<()> {
    let mut shutdown = Shutdown::new(token);

    tokio::spawn(async move {
        #[cfg(unix)]
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                error!(cause = %e, "can't install terminate handler");
                return;
            }
        };

        loop {
            #[cfg(unix)]
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(cause = %e, "can't listen for interrupt");
                        return;
                    }
                }
                _ = terminate.recv() => {}
            }

            #[cfg(not(unix))]
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(cause = %e, "can't listen for interrupt");
                return;
            }

            shutdown.fire();
        }
    })
}
