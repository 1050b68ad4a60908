//! Outbound response state shared between a [`Conn`](super::Conn) and the
//! connection's flusher.
//!
//! All transport writes land here first: the head is staged until the first
//! body write decides the framing, body bytes are accepted into a buffer
//! capped by a high-watermark, and a flusher drains the buffer to the socket,
//! waking `writable()` waiters when it empties.

use bytes::{Bytes, BytesMut};
use std::sync::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::date::DateService;

/// Buffered outbound bytes past this mark put the response into backpressure.
pub(crate) const HIGH_WATERMARK: usize = 64 * 1024;

/// What the flusher should do next.
#[derive(Debug)]
pub(crate) enum Step {
    /// Write these bytes to the socket
    Write(Bytes),
    /// Response complete; flush and optionally shut the write side down
    Finish { close: bool },
    /// Nothing queued yet
    Wait,
}

#[derive(Debug)]
pub(crate) struct Outbound {
    state: Mutex<State>,
    /// Wakes the flusher when bytes are queued or the response ends
    readable: Notify,
    /// Wakes `writable()` waiters when the buffer empties
    drained: Notify,
}

#[derive(Debug)]
struct State {
    /// Staged status line and headers; `None` once committed to `buf`
    head: Option<Head>,
    buf: BytesMut,
    /// Body bytes accepted so far (the write offset)
    accepted: u64,
    framing: Option<Framing>,
    ended: bool,
    keep_alive: bool,
}

#[derive(Debug)]
struct Head {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// `Content-Length` framing against a known total
    Length(u64),
    /// Close-delimited: no length, the connection ends the body
    Close,
}

/// Statuses that must not carry a body (nor a `Content-Length`).
fn bodyless(status: u16) -> bool {
    status == 204 || status == 304
}

impl Outbound {
    pub(crate) fn new(keep_alive: bool) -> Self {
        Self {
            state: Mutex::new(State {
                head: Some(Head { status: 200, reason: "OK".to_string(), headers: Vec::new() }),
                buf: BytesMut::new(),
                accepted: 0,
                framing: None,
                ended: false,
                keep_alive,
            }),
            readable: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // a poisoned lock means a panicked handler task; the connection is
        // torn down anyway, so keep the state usable for the flusher
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_status(&self, status: u16, reason: &str) {
        let mut state = self.lock();
        if let Some(head) = &mut state.head {
            head.status = status;
            head.reason = reason.to_string();
        }
    }

    pub(crate) fn push_header(&self, name: &str, value: &str) {
        let mut state = self.lock();
        if let Some(head) = &mut state.head {
            head.headers.push((name.to_string(), value.to_string()));
        }
    }

    /// Incremental close-delimited write. Always accepts; `false` signals the
    /// watermark is exceeded and the caller should pause its source.
    pub(crate) fn write(&self, chunk: &[u8]) -> bool {
        let mut state = self.lock();
        if state.ended {
            return false;
        }
        state.commit_head(Framing::Close);
        state.buf.extend_from_slice(chunk);
        state.accepted += chunk.len() as u64;
        let under_watermark = state.buf.len() < HIGH_WATERMARK;
        drop(state);

        self.readable.notify_one();
        under_watermark
    }

    /// Combined write-and-close against a declared total body size.
    ///
    /// Accepts at most up to the watermark; a partial accept reports
    /// `(false, false)` and the remainder must be retried from the write
    /// offset after the buffer drains.
    pub(crate) fn try_end(&self, chunk: &[u8], total: u64) -> (bool, bool) {
        let mut state = self.lock();
        if state.ended {
            return (true, true);
        }
        state.commit_head(Framing::Length(total));

        let room = HIGH_WATERMARK.saturating_sub(state.buf.len());
        if room == 0 {
            return (false, false);
        }

        let take = room.min(chunk.len());
        state.buf.extend_from_slice(&chunk[..take]);
        state.accepted += take as u64;

        let done = state.accepted >= total;
        if done {
            state.ended = true;
        }
        drop(state);
        self.readable.notify_one();

        (take == chunk.len(), done)
    }

    /// Terminal write: commits the head, appends `data` and ends the response.
    pub(crate) fn end(&self, data: &[u8]) {
        let mut state = self.lock();
        if state.ended {
            return;
        }
        if state.framing.is_none() {
            state.commit_head(Framing::Length(data.len() as u64));
        }
        if !data.is_empty() {
            state.buf.extend_from_slice(data);
            state.accepted += data.len() as u64;
        }
        state.ended = true;
        drop(state);
        self.readable.notify_one();
    }

    /// Ends a response the handler left open. Nothing is written; the
    /// connection will not be reused.
    pub(crate) fn force_close(&self) {
        let mut state = self.lock();
        if !state.ended {
            if state.framing.is_none() {
                state.framing = Some(Framing::Close);
            }
            state.keep_alive = false;
            state.ended = true;
        }
        drop(state);
        self.readable.notify_one();
    }

    pub(crate) fn write_offset(&self) -> u64 {
        self.lock().accepted
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// Whether the connection may serve another request after this response.
    pub(crate) fn reusable(&self) -> bool {
        let state = self.lock();
        state.keep_alive && state.framing != Some(Framing::Close)
    }

    /// The write offset, when the response no longer has queued bytes (or is
    /// finished and waiting would be pointless).
    pub(crate) fn drained_offset(&self) -> Option<u64> {
        let state = self.lock();
        (state.buf.is_empty() || state.ended).then_some(state.accepted)
    }

    pub(crate) fn readable_notified(&self) -> Notified<'_> {
        self.readable.notified()
    }

    pub(crate) fn drained_notified(&self) -> Notified<'_> {
        self.drained.notified()
    }

    /// Flusher side: what to do next.
    pub(crate) fn take_step(&self) -> Step {
        let mut state = self.lock();
        if !state.buf.is_empty() {
            Step::Write(state.buf.split().freeze())
        } else if state.ended {
            Step::Finish { close: !state.keep_alive || state.framing == Some(Framing::Close) }
        } else {
            Step::Wait
        }
    }

    /// Flusher side: a write to the socket completed.
    pub(crate) fn mark_flushed(&self) {
        let state = self.lock();
        if state.buf.is_empty() {
            drop(state);
            self.drained.notify_waiters();
        }
    }
}

impl State {
    /// Commits the staged head into the buffer. The first body write decides
    /// the framing; later calls are no-ops.
    fn commit_head(&mut self, framing: Framing) {
        let Some(head) = self.head.take() else { return };
        self.framing = Some(framing);

        let mut buf = BytesMut::with_capacity(256);
        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(head.status.to_string().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(head.reason.as_bytes());
        buf.extend_from_slice(b"\r\n");

        for (name, value) in &head.headers {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        buf.extend_from_slice(b"Date: ");
        buf.extend_from_slice(&DateService::global().http_date());
        buf.extend_from_slice(b"\r\n");

        match framing {
            Framing::Length(n) => {
                if !bodyless(head.status) {
                    buf.extend_from_slice(b"Content-Length: ");
                    buf.extend_from_slice(n.to_string().as_bytes());
                    buf.extend_from_slice(b"\r\n");
                }
            }
            Framing::Close => {
                self.keep_alive = false;
            }
        }

        if !self.keep_alive {
            buf.extend_from_slice(b"Connection: close\r\n");
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.buf);
        self.buf = buf;
    }
}
