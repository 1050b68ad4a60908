//! The per-response transport surface.
//!
//! One [`Transport`] is the write/read capability set of a single in-flight
//! response: stage a status line and headers, push body bytes under the
//! engine's flow control, and pull the request's body chunks. The framework's
//! send pipeline is written against this trait; the socket-backed
//! implementation lives in [`crate::conn`].

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

/// Write/read surface of one response.
///
/// # Flow control
///
/// Known-size bodies go through [`try_end`](Transport::try_end), the combined
/// write-and-close: it reports `(ok, done)` where `ok` means the given chunk
/// was fully accepted and `done` means the body is complete. A partial accept
/// returns `(false, false)`; the caller must stop feeding, wait for
/// [`writable`](Transport::writable) and retry the unsent remainder, sliced
/// from the offset delta against [`write_offset`](Transport::write_offset).
///
/// Size-less bodies go through [`write`](Transport::write), which always
/// buffers but returns `false` once the outbound buffer is over its
/// watermark — the caller should pause its source until `writable` resolves.
#[async_trait]
pub trait Transport: Send {
    /// Stages the status line. The last call before the head is committed
    /// wins; an uncommitted head defaults to `200 OK`.
    fn write_status(&mut self, status: u16, reason: &str);

    /// Stages one response header.
    fn write_header(&mut self, name: &str, value: &str);

    /// Incremental close-delimited write. Returns `false` on backpressure
    /// (bytes are still accepted).
    fn write(&mut self, chunk: &[u8]) -> bool;

    /// Combined write-and-close against a declared total body size.
    fn try_end(&mut self, chunk: &[u8], total_size: u64) -> (bool, bool);

    /// Terminal write: commits the head, appends `data` and completes the
    /// response. Dataless completion is `end(&[])`.
    fn end(&mut self, data: &[u8]);

    /// Body bytes accepted so far.
    fn write_offset(&self) -> u64;

    /// Resolves with the current write offset once the outbound buffer has
    /// drained (or the response ended or aborted, so callers never hang).
    async fn writable(&mut self) -> u64;

    /// Next inbound body chunk and its is-last flag. `None` after the last
    /// chunk was delivered or when the client went away.
    async fn recv_chunk(&mut self) -> Option<(Bytes, bool)>;

    /// Whether the client connection is known to be gone.
    fn is_aborted(&self) -> bool;

    /// A cloneable signal that resolves when the client connection goes away.
    fn abort_signal(&self) -> AbortSignal;
}

/// Observation side of a connection abort.
///
/// Backed by a watch channel owned by the connection; cloning is cheap and
/// every clone sees the same single transition.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
    // keeps the channel open for signals detached from a connection
    _keep: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl AbortSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx, _keep: None }
    }

    /// A signal that never fires, for responses detached from a live socket.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { rx, _keep: Some(std::sync::Arc::new(tx)) }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the connection aborts. Never resolves on a clean
    /// response lifecycle.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            // sender dropped without aborting: the response completed
            // normally, so this future must simply never resolve
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AbortSignal;
    use tokio::sync::watch;

    #[tokio::test]
    async fn abort_signal_observes_the_transition() {
        let (tx, rx) = watch::channel(false);
        let mut signal = AbortSignal::new(rx);
        assert!(!signal.is_aborted());

        tx.send(true).unwrap();
        signal.aborted().await;
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn never_signal_stays_quiet() {
        let signal = AbortSignal::never();
        assert!(!signal.is_aborted());
    }
}
