//! Socket-backed transport and the connection loop.
//!
//! [`Connection`] drives one TCP connection: it decodes request heads,
//! resolves the route, and then runs three things concurrently for each
//! request — the route handler, a body pump feeding the handler inbound
//! chunks, and a flusher draining staged response bytes to the socket.
//! After the handler completes, any unread body is drained so a keep-alive
//! connection starts the next request in a clean state.

mod outbound;

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedRead;
use tracing::{error, info, warn};

use crate::app::{PathParams, Router};
use crate::codec::RequestDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, RequestHead};
use crate::transport::{AbortSignal, Transport};

use async_trait::async_trait;
use outbound::{Outbound, Step};

/// How many inbound body chunks may sit between the pump and the handler
/// before the pump stops reading from the socket.
const CHUNK_CHANNEL_CAPACITY: usize = 16;

/// The socket-backed [`Transport`] of one in-flight response.
#[derive(Debug)]
pub struct Conn {
    outbound: Arc<Outbound>,
    chunks: mpsc::Receiver<(Bytes, bool)>,
    abort: AbortSignal,
    /// set once the is-last chunk has been delivered
    body_done: bool,
}

impl Conn {
    fn new(outbound: Arc<Outbound>, chunks: mpsc::Receiver<(Bytes, bool)>, abort: AbortSignal) -> Self {
        Self { outbound, chunks, abort, body_done: false }
    }
}

#[async_trait]
impl Transport for Conn {
    fn write_status(&mut self, status: u16, reason: &str) {
        self.outbound.set_status(status, reason);
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.outbound.push_header(name, value);
    }

    fn write(&mut self, chunk: &[u8]) -> bool {
        self.outbound.write(chunk)
    }

    fn try_end(&mut self, chunk: &[u8], total_size: u64) -> (bool, bool) {
        self.outbound.try_end(chunk, total_size)
    }

    fn end(&mut self, data: &[u8]) {
        self.outbound.end(data);
    }

    fn write_offset(&self) -> u64 {
        self.outbound.write_offset()
    }

    async fn writable(&mut self) -> u64 {
        loop {
            let notified = self.outbound.drained_notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(offset) = self.outbound.drained_offset() {
                return offset;
            }
            if self.abort.is_aborted() {
                return self.outbound.write_offset();
            }

            tokio::select! {
                _ = notified => {}
                _ = self.abort.aborted() => {}
            }
        }
    }

    async fn recv_chunk(&mut self) -> Option<(Bytes, bool)> {
        if self.body_done {
            return None;
        }
        let chunk = self.chunks.recv().await;
        if matches!(chunk, Some((_, true))) {
            self.body_done = true;
        }
        chunk
    }

    fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }
}

/// Route handler as stored in the route table.
pub type RouteFuture = std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type RouteFn = Arc<dyn Fn(RequestHead, PathParams, Conn) -> RouteFuture + Send + Sync>;

/// Forwards inbound body chunks from the decoder to the handler.
///
/// One chunk is held back so the final one can be flagged is-last. When the
/// handler stops reading (receiver dropped) the pump switches to discarding,
/// which keeps the connection protocol-correct without buffering.
struct BodyPump<'conn> {
    framed: &'conn mut FramedRead<OwnedReadHalf, RequestDecoder>,
    sender: Option<mpsc::Sender<(Bytes, bool)>>,
    pending: Option<Bytes>,
    ready: Option<(Bytes, bool)>,
    eof: bool,
}

impl<'conn> BodyPump<'conn> {
    fn new(framed: &'conn mut FramedRead<OwnedReadHalf, RequestDecoder>, sender: mpsc::Sender<(Bytes, bool)>) -> Self {
        Self { framed, sender: Some(sender), pending: None, ready: None, eof: false }
    }

    /// A pump with no handler attached; only good for [`skip_body`](Self::skip_body).
    fn detached(framed: &'conn mut FramedRead<OwnedReadHalf, RequestDecoder>) -> Self {
        Self { framed, sender: None, pending: None, ready: None, eof: false }
    }

    /// Streams body chunks to the handler until the body is complete.
    async fn send_body(&mut self) -> Result<(), ParseError> {
        loop {
            if self.ready.is_some() {
                self.forward().await;
                continue;
            }

            if self.eof {
                return Ok(());
            }

            match self.framed.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    self.ready = self.pending.replace(bytes).map(|held| (held, false));
                }

                Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                    self.eof = true;
                    self.ready = Some((self.pending.take().unwrap_or_default(), true));
                }

                Some(Ok(Message::Head(_))) => {
                    self.sender = None;
                    error!("received head while reading body");
                    return Err(ParseError::invalid_body("received head while reading body"));
                }

                Some(Err(e)) => {
                    self.sender = None;
                    return Err(e);
                }

                None => {
                    self.sender = None;
                    return Err(ParseError::invalid_body("connection closed while reading body"));
                }
            }
        }
    }

    async fn forward(&mut self) {
        let Some(sender) = self.sender.clone() else {
            self.ready = None;
            return;
        };
        match sender.reserve().await {
            Ok(permit) => {
                if let Some(item) = self.ready.take() {
                    permit.send(item);
                }
            }
            Err(_) => {
                // handler dropped its receiver; discard from now on
                self.sender = None;
                self.ready = None;
            }
        }
    }

    /// Drains whatever the handler did not read.
    async fn skip_body(&mut self) -> Result<(), ParseError> {
        self.sender = None;
        self.ready = None;
        let mut skipped = self.pending.take().map_or(0, |b| b.len());
        while !self.eof {
            match self.framed.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => skipped += bytes.len(),
                Some(Ok(Message::Payload(PayloadItem::Eof))) => self.eof = true,
                Some(Ok(Message::Head(_))) => {
                    return Err(ParseError::invalid_body("received head while skipping body"));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::invalid_body("connection closed while skipping body")),
            }
        }
        if skipped > 0 {
            info!(size = skipped, "skip request body");
        }
        Ok(())
    }
}

/// Drains staged response bytes to the socket write half.
struct Flusher<'conn> {
    outbound: Arc<Outbound>,
    writer: &'conn mut OwnedWriteHalf,
}

impl Flusher<'_> {
    async fn run(mut self) -> io::Result<()> {
        loop {
            let notified = self.outbound.readable_notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.outbound.take_step() {
                Step::Write(bytes) => {
                    self.writer.write_all(&bytes).await?;
                    self.writer.flush().await?;
                    self.outbound.mark_flushed();
                }
                Step::Finish { close } => {
                    self.writer.flush().await?;
                    if close {
                        let _ = self.writer.shutdown().await;
                    }
                    return Ok(());
                }
                Step::Wait => notified.await,
            }
        }
    }
}

/// One accepted TCP connection.
pub struct Connection {
    framed_read: FramedRead<OwnedReadHalf, RequestDecoder>,
    writer: OwnedWriteHalf,
    router: Arc<Router>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(stream: TcpStream, router: Arc<Router>) -> Self {
        let (reader, writer) = stream.into_split();
        Self { framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024), writer, router }
    }

    /// Serves requests until the connection can't be reused.
    pub async fn process(mut self) -> Result<(), ParseError> {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Head((head, _payload_size)))) => {
                    let reuse = self.handle_request(head).await?;
                    if !reuse {
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("received body while expecting a request head");
                    return Err(ParseError::invalid_body("need head while receive body"));
                }

                Some(Err(e)) => {
                    warn!("can't receive next request, cause {}", e);
                    let _ = write_raw(&mut self.writer, b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
                    return Err(e);
                }

                None => {
                    info!("can't read more requests, connection shutdown");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_request(&mut self, head: RequestHead) -> Result<bool, ParseError> {
        let keep_alive = head.keep_alive();

        if head.expects_continue() {
            write_raw(&mut self.writer, b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(ParseError::io)?;
            info!("receive expect request header, sent continue response");
        }

        let Some((route, params)) = self.router.resolve(head.path(), head.method()) else {
            info!(path = head.path(), "no route matched");
            let not_found: &[u8] = if keep_alive {
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"
            } else {
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            };
            write_raw(&mut self.writer, not_found).await.map_err(ParseError::io)?;
            BodyPump::detached(&mut self.framed_read).skip_body().await?;
            return Ok(keep_alive);
        };

        let (abort_tx, abort_rx) = watch::channel(false);
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let outbound = Arc::new(Outbound::new(keep_alive));

        let conn = Conn::new(Arc::clone(&outbound), chunk_rx, AbortSignal::new(abort_rx));
        let mut pump = BodyPump::new(&mut self.framed_read, chunk_tx);
        let flusher = Flusher { outbound: Arc::clone(&outbound), writer: &mut self.writer };

        tokio::pin! {
            let handler_fut = (route)(head, params, conn);
            let flush_fut = flusher.run();
        }
        let mut flush_res: Option<io::Result<()>> = None;

        // Run the handler, the body pump and the flusher concurrently; biased
        // so the handler's progress is preferred. The handler finishing ends
        // this phase, whatever the other two are doing.
        {
            let pump_fut = pump.send_body();
            tokio::pin!(pump_fut);
            let mut pump_done = false;

            loop {
                tokio::select! {
                    biased;

                    _ = &mut handler_fut => break,

                    result = &mut flush_fut, if flush_res.is_none() => {
                        if result.is_err() {
                            let _ = abort_tx.send(true);
                        }
                        flush_res = Some(result);
                    }

                    result = &mut pump_fut, if !pump_done => {
                        pump_done = true;
                        if result.is_err() {
                            let _ = abort_tx.send(true);
                        }
                    }
                }
            }
        }

        if !outbound.is_ended() {
            warn!("handler completed without ending the response, closing connection");
            outbound.force_close();
        }

        // Finish flushing and drain whatever body the handler left unread.
        {
            let skip_fut = pump.skip_body();
            tokio::pin!(skip_fut);
            let mut skip_res: Option<Result<(), ParseError>> = None;

            while flush_res.is_none() || skip_res.is_none() {
                tokio::select! {
                    biased;

                    result = &mut flush_fut, if flush_res.is_none() => {
                        flush_res = Some(result);
                    }

                    result = &mut skip_fut, if skip_res.is_none() => {
                        if result.is_err() {
                            let _ = abort_tx.send(true);
                        }
                        skip_res = Some(result);
                    }
                }
            }

            if let Some(Err(e)) = skip_res {
                return Err(e);
            }
        }

        Ok(keep_alive && outbound.reusable() && matches!(flush_res, Some(Ok(()))))
    }
}

async fn write_raw<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}
