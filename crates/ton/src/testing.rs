//! A scriptable transport for exercising the send and read pipelines.
//!
//! Every call is recorded as an [`Op`]; `try_end`/`write`/`writable` outcomes
//! can be scripted ahead of time to simulate backpressure episodes, and
//! inbound body chunks are queued up front.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use ton_engine::transport::{AbortSignal, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Status(u16, String),
    Header(String, String),
    Write(Vec<u8>),
    TryEnd { data: Vec<u8>, total: u64 },
    End(Vec<u8>),
}

#[derive(Debug)]
pub(crate) struct MockTransport {
    pub(crate) ops: Vec<Op>,
    try_end_script: VecDeque<(bool, bool)>,
    write_script: VecDeque<bool>,
    writable_script: VecDeque<u64>,
    chunks: VecDeque<(Bytes, bool)>,
    offset: u64,
    abort_tx: std::sync::Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        let (abort_tx, abort_rx) = watch::channel(false);
        let abort_tx = std::sync::Arc::new(abort_tx);
        Self {
            ops: Vec::new(),
            try_end_script: VecDeque::new(),
            write_script: VecDeque::new(),
            writable_script: VecDeque::new(),
            chunks: VecDeque::new(),
            offset: 0,
            abort_tx,
            abort_rx,
        }
    }

    /// Queues inbound body chunks; the last flag marks the final one.
    pub(crate) fn with_chunks(chunks: &[(&[u8], bool)]) -> Self {
        let mut mock = Self::new();
        mock.chunks = chunks.iter().map(|(bytes, is_last)| (Bytes::copy_from_slice(bytes), *is_last)).collect();
        mock
    }

    /// Scripts the next `try_end` results; unscripted calls accept fully.
    pub(crate) fn script_try_end(&mut self, results: &[(bool, bool)]) {
        self.try_end_script.extend(results.iter().copied());
    }

    /// Scripts the next `write` results; unscripted calls report no pressure.
    pub(crate) fn script_write(&mut self, results: &[bool]) {
        self.write_script.extend(results.iter().copied());
    }

    /// Scripts the offsets `writable` resolves with.
    pub(crate) fn script_writable(&mut self, offsets: &[u64]) {
        self.writable_script.extend(offsets.iter().copied());
    }

    /// Simulates a client disconnect.
    pub(crate) fn abort(&self) {
        let _ = self.abort_tx.send(true);
    }

    /// A handle that can trigger the disconnect from elsewhere (e.g. from
    /// inside a stream under test).
    pub(crate) fn abort_handle(&self) -> std::sync::Arc<watch::Sender<bool>> {
        std::sync::Arc::clone(&self.abort_tx)
    }

    pub(crate) fn statuses(&self) -> Vec<(u16, String)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Status(code, reason) => Some((*code, reason.clone())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn headers(&self) -> Vec<(String, String)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Header(name, value) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn header(&self, name: &str) -> Option<String> {
        self.headers().iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.clone())
    }

    pub(crate) fn end_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, Op::End(_))).count()
    }

    pub(crate) fn ended_body(&self) -> Option<Vec<u8>> {
        self.ops.iter().find_map(|op| match op {
            Op::End(data) => Some(data.clone()),
            _ => None,
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn write_status(&mut self, status: u16, reason: &str) {
        self.ops.push(Op::Status(status, reason.to_string()));
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.ops.push(Op::Header(name.to_string(), value.to_string()));
    }

    fn write(&mut self, chunk: &[u8]) -> bool {
        self.ops.push(Op::Write(chunk.to_vec()));
        self.offset += chunk.len() as u64;
        self.write_script.pop_front().unwrap_or(true)
    }

    fn try_end(&mut self, chunk: &[u8], total_size: u64) -> (bool, bool) {
        self.ops.push(Op::TryEnd { data: chunk.to_vec(), total: total_size });
        match self.try_end_script.pop_front() {
            Some((ok, done)) => {
                if ok {
                    self.offset += chunk.len() as u64;
                }
                (ok, done)
            }
            None => {
                self.offset += chunk.len() as u64;
                (true, self.offset >= total_size)
            }
        }
    }

    fn end(&mut self, data: &[u8]) {
        self.ops.push(Op::End(data.to_vec()));
    }

    fn write_offset(&self) -> u64 {
        self.offset
    }

    async fn writable(&mut self) -> u64 {
        match self.writable_script.pop_front() {
            Some(offset) => {
                self.offset = self.offset.max(offset);
                offset
            }
            None => self.offset,
        }
    }

    async fn recv_chunk(&mut self) -> Option<(Bytes, bool)> {
        self.chunks.pop_front()
    }

    fn is_aborted(&self) -> bool {
        *self.abort_rx.borrow()
    }

    fn abort_signal(&self) -> AbortSignal {
        AbortSignal::new(self.abort_rx.clone())
    }
}
