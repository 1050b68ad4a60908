//! The send pipeline: normalizes a handler's payload into wire bytes.
//!
//! Four strategies — empty, text, JSON, streaming — plus the error writer,
//! fronted by the [`send`] dispatcher. Every path checks the response's
//! finalized flag first and finalizes exactly once on success.
//!
//! The streaming writer is the delicate part: it feeds a [`ByteStream`]
//! through the transport's combined write-and-close, pausing the stream on
//! backpressure and retrying the unsent remainder from the acknowledged
//! write offset once the transport drains.

use futures::StreamExt;
use serde::Serialize;
use tracing::error;
use ton_engine::transport::{AbortSignal, Transport};

use crate::error::{normalize_status, reason_phrase, HttpError, Mode};
use crate::outcome::{ByteStream, Outcome};
use crate::response::Response;

const CONTENT_TYPE: &str = "Content-Type";
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";
const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Extra response headers, written after the defaults they may override.
pub type Headers<'a> = &'a [(&'a str, &'a str)];

/// Writes the status line; zero or unknown codes collapse to 500.
pub fn write_status<T: Transport>(res: &mut Response<T>, status_code: u16) {
    let status = normalize_status(status_code);
    res.set_status_code(status);
    res.transport_mut().write_status(status, reason_phrase(status));
}

/// Writes the given headers in order.
pub fn write_headers<T: Transport>(res: &mut Response<T>, headers: Headers<'_>) {
    for (name, value) in headers {
        res.transport_mut().write_header(name, value);
    }
}

/// Writes a default `Content-Type` unless the caller supplied their own.
fn write_headers_with_default<T: Transport>(res: &mut Response<T>, content_type: &str, headers: Headers<'_>) {
    let caller_has_content_type = headers.iter().any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE));
    if !caller_has_content_type {
        res.transport_mut().write_header(CONTENT_TYPE, content_type);
    }
    write_headers(res, headers);
}

/// 204 with no body.
pub fn send_empty<T: Transport>(res: &mut Response<T>, headers: Headers<'_>) -> Result<(), HttpError> {
    res.check_writable()?;
    write_status(res, 204);
    write_headers(res, headers);
    res.finalize();
    res.transport_mut().end(&[]);
    Ok(())
}

/// Plain text. A status of exactly 200 skips the status line — the
/// transport's implicit default.
pub fn send_text<T: Transport>(
    res: &mut Response<T>,
    status_code: u16,
    data: &str,
    headers: Headers<'_>,
) -> Result<(), HttpError> {
    res.check_writable()?;
    if status_code != 200 {
        write_status(res, status_code);
    }
    write_headers_with_default(res, TEXT_PLAIN_UTF8, headers);
    res.finalize();
    res.transport_mut().end(data.as_bytes());
    Ok(())
}

/// JSON-serializes `data` and sends it.
pub fn send_json<T: Transport, V: Serialize>(
    res: &mut Response<T>,
    status_code: u16,
    data: &V,
    headers: Headers<'_>,
) -> Result<(), HttpError> {
    res.check_writable()?;
    let body = serde_json::to_vec(data)
        .map_err(|e| HttpError::server_error(500, "can't serialize response body").with_cause(e))?;
    if status_code != 200 {
        write_status(res, status_code);
    }
    write_headers_with_default(res, APPLICATION_JSON_UTF8, headers);
    res.finalize();
    res.transport_mut().end(&body);
    Ok(())
}

/// The error writer, redaction mode read from the environment.
pub fn send_error<T: Transport>(res: &mut Response<T>, err: &HttpError, headers: Headers<'_>) {
    send_error_with(res, err, headers, Mode::from_env());
}

/// The error writer.
///
/// Body is always `{"message": ...}`. In production, 5xx messages are
/// replaced by the reason phrase so internals never reach the wire; the
/// wrapped cause is what gets logged, and 4xx are never logged as faults.
/// Writing to a finalized response is itself caught and logged here — the
/// client already got a terminal response or went away.
pub fn send_error_with<T: Transport>(res: &mut Response<T>, err: &HttpError, headers: Headers<'_>, mode: Mode) {
    if let Err(finalized) = res.check_writable() {
        error!(cause = %err.root_cause(), "{}", finalized.message());
        return;
    }

    let status = if err.status() == 0 { 500 } else { err.status() };
    let wire_status = normalize_status(status);

    let message = if err.message().is_empty() {
        reason_phrase(wire_status).to_string()
    } else {
        err.message().to_string()
    };

    // the literal production check: everything >= 500 is redacted
    let message = if mode.is_production() && status >= 500 {
        reason_phrase(wire_status).to_string()
    } else {
        message
    };

    if let Err(e) = send_json(res, status, &serde_json::json!({ "message": message }), headers) {
        error!(cause = %e, "can't send error response");
        return;
    }

    if status < 500 {
        return;
    }

    error!(cause = %err.root_cause(), "request failed");
}

/// 301/302 with a `Location` header and an empty body.
pub fn redirect<T: Transport>(res: &mut Response<T>, status_code: u16, location: &str) -> Result<(), HttpError> {
    res.check_writable()?;
    write_status(res, status_code);
    write_headers(res, &[("Location", location)]);
    res.finalize();
    res.transport_mut().end(&[]);
    Ok(())
}

enum ChunkWrite {
    /// The transport reported the body complete
    Done,
    /// Chunk absorbed, more expected: resume the stream
    More,
    /// The client went away mid-write
    Aborted,
}

/// Writes one chunk of a known-size body, riding out backpressure.
///
/// The remainder of a partially accepted chunk is retried from the delta
/// between the offset `writable` resolved with and the offset captured
/// before the first attempt — no byte is skipped or written twice.
async fn write_sized_chunk<T: Transport>(
    res: &mut Response<T>,
    abort: &mut AbortSignal,
    chunk: &[u8],
    total: u64,
) -> ChunkWrite {
    let last_offset = res.transport().write_offset();

    let (ok, done) = res.transport_mut().try_end(chunk, total);
    if done {
        return ChunkWrite::Done;
    }
    if ok {
        return ChunkWrite::More;
    }

    // backpressure: the stream stays paused until the remainder is written
    loop {
        if abort.is_aborted() {
            return ChunkWrite::Aborted;
        }

        let offset = tokio::select! {
            biased;
            _ = abort.aborted() => return ChunkWrite::Aborted,
            offset = res.transport_mut().writable() => offset,
        };

        let sent = offset.saturating_sub(last_offset) as usize;
        let remainder = chunk.get(sent..).unwrap_or(&[]);

        let (ok, done) = res.transport_mut().try_end(remainder, total);
        if done {
            return ChunkWrite::Done;
        }
        if ok {
            return ChunkWrite::More;
        }
    }
}

/// Pauses until the transport drains (or the client goes away).
async fn wait_writable<T: Transport>(res: &mut Response<T>, abort: &mut AbortSignal) {
    tokio::select! {
        biased;
        _ = abort.aborted() => {}
        _ = res.transport_mut().writable() => {}
    }
}

/// The streaming writer.
///
/// Head first, then one of two per-chunk regimes: with a declared size the
/// combined write-and-close detects completion on its own; without one each
/// chunk is written incrementally and the connection close delimits the
/// body. The stream is consumed (and so dropped) on every exit path; the
/// response is finalized exactly once, abort and end racing included.
pub async fn send_stream<T: Transport>(
    res: &mut Response<T>,
    status_code: u16,
    mut stream: ByteStream,
    headers: Headers<'_>,
) -> Result<(), HttpError> {
    res.check_writable()?;

    if status_code != 200 {
        write_status(res, status_code);
    }
    write_headers_with_default(res, APPLICATION_OCTET_STREAM, headers);

    let size = stream.size();
    let mut abort = res.abort_signal();

    loop {
        tokio::select! {
            biased;

            _ = abort.aborted() => {
                res.finalize();
                return Ok(());
            }

            item = stream.next() => match item {
                None => {
                    // completion happens exactly once: a concurrent abort wins
                    if !res.is_finalized() && !res.is_aborted() {
                        res.transport_mut().end(&[]);
                    }
                    res.finalize();
                    return Ok(());
                }

                Some(Err(e)) => {
                    drop(stream);
                    send_error(res, &e, &[]);
                    return Ok(());
                }

                Some(Ok(chunk)) => {
                    // an abort during a synchronous stretch is still observed
                    // before the next write
                    if res.is_finalized() || res.is_aborted() {
                        res.finalize();
                        return Ok(());
                    }

                    match size {
                        Some(total) => match write_sized_chunk(res, &mut abort, &chunk, total).await {
                            ChunkWrite::Done | ChunkWrite::Aborted => {
                                res.finalize();
                                return Ok(());
                            }
                            ChunkWrite::More => {}
                        },
                        None => {
                            if !res.transport_mut().write(&chunk) {
                                wait_writable(res, &mut abort).await;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// The unified dispatcher: picks the send strategy from the outcome's shape.
pub async fn send<T: Transport>(
    res: &mut Response<T>,
    status_code: u16,
    data: Outcome,
    headers: Headers<'_>,
) -> Result<(), HttpError> {
    if status_code == 204 {
        return send_empty(res, headers);
    }

    match data {
        Outcome::Empty => send_empty(res, headers),
        Outcome::Text(text) => send_text(res, status_code, &text, headers),
        Outcome::Stream(stream) => send_stream(res, status_code, stream, headers).await,
        Outcome::Failure(err) => {
            send_error(res, &err, headers);
            Ok(())
        }
        Outcome::Json(value) => send_json(res, status_code, &value, headers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::FINALIZED_MESSAGE;
    use crate::testing::{MockTransport, Op};
    use bytes::Bytes;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::Poll;

    fn response() -> Response<MockTransport> {
        Response::new(MockTransport::new())
    }

    /// A sized stream over the given chunks whose drop is observable.
    fn guarded_stream(chunks: &[&[u8]], size: u64) -> (ByteStream, Arc<AtomicBool>) {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(Arc::clone(&dropped));
        let chunks: Vec<Bytes> = chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect();
        let stream = stream::iter(chunks).map(move |chunk| {
            let _guard = &guard;
            Ok(chunk)
        });
        (ByteStream::sized(stream, size), dropped)
    }

    #[test]
    fn write_status_normalizes_unknown_codes() {
        let mut res = response();
        write_status(&mut res, 0);
        write_status(&mut res, 600);
        write_status(&mut res, 204);

        assert_eq!(
            res.transport().statuses(),
            vec![
                (500, "Internal Server Error".to_string()),
                (500, "Internal Server Error".to_string()),
                (204, "No Content".to_string()),
            ]
        );
    }

    #[test]
    fn write_headers_in_order() {
        let mut res = response();
        write_headers(&mut res, &[("by", "ton"), ("hello", "hi")]);

        assert_eq!(
            res.transport().headers(),
            vec![("by".to_string(), "ton".to_string()), ("hello".to_string(), "hi".to_string())]
        );
    }

    #[test]
    fn send_empty_is_a_bare_204() {
        let mut res = response();
        send_empty(&mut res, &[("by", "ton")]).unwrap();

        let mock = res.transport();
        assert_eq!(mock.statuses(), vec![(204, "No Content".to_string())]);
        assert_eq!(mock.headers(), vec![("by".to_string(), "ton".to_string())]);
        assert_eq!(mock.ended_body().unwrap(), b"");
        assert!(res.is_finalized());
    }

    #[test]
    fn send_empty_refuses_a_finalized_response() {
        let mut res = response();
        res.finalize();

        let err = send_empty(&mut res, &[]).unwrap_err();
        assert_eq!(err.status(), 500);
        assert_eq!(err.message(), FINALIZED_MESSAGE);
        assert!(res.transport().ops.is_empty());
    }

    #[test]
    fn send_text_sets_content_type_and_body() {
        let mut res = response();
        send_text(&mut res, 200, "TonJS", &[]).unwrap();

        let mock = res.transport();
        // 200 is implicit: no status line is written
        assert_eq!(mock.statuses(), vec![]);
        assert_eq!(mock.header("content-type").unwrap(), TEXT_PLAIN_UTF8);
        assert_eq!(mock.ended_body().unwrap(), b"TonJS");
    }

    #[test]
    fn send_text_writes_non_200_status() {
        let mut res = response();
        send_text(&mut res, 201, "created", &[]).unwrap();

        assert_eq!(res.transport().statuses(), vec![(201, "Created".to_string())]);
    }

    #[test]
    fn caller_content_type_wins() {
        let mut res = response();
        send_text(&mut res, 200, "<b>hi</b>", &[("Content-Type", "text/html")]).unwrap();

        assert_eq!(res.transport().headers(), vec![("Content-Type".to_string(), "text/html".to_string())]);
    }

    #[test]
    fn send_json_serializes_the_value() {
        let mut res = response();
        send_json(&mut res, 200, &serde_json::json!({ "key": "value" }), &[]).unwrap();

        let mock = res.transport();
        assert_eq!(mock.header("content-type").unwrap(), APPLICATION_JSON_UTF8);
        assert_eq!(mock.ended_body().unwrap(), br#"{"key":"value"}"#);
    }

    #[test]
    fn redirect_sends_location_and_empty_body() {
        let mut res = response();
        redirect(&mut res, 301, "https://tonjs.com").unwrap();

        let mock = res.transport();
        assert_eq!(mock.statuses(), vec![(301, "Moved Permanently".to_string())]);
        assert_eq!(mock.headers(), vec![("Location".to_string(), "https://tonjs.com".to_string())]);
        assert_eq!(mock.ended_body().unwrap(), b"");
    }

    #[test]
    fn send_error_writes_the_message_body() {
        let mut res = response();
        let err = HttpError::server_error(500, "boom");
        send_error_with(&mut res, &err, &[], Mode::Development);

        let mock = res.transport();
        assert_eq!(mock.statuses(), vec![(500, "Internal Server Error".to_string())]);
        assert_eq!(mock.header("content-type").unwrap(), APPLICATION_JSON_UTF8);
        assert_eq!(mock.ended_body().unwrap(), br#"{"message":"boom"}"#);
    }

    #[test]
    fn send_error_redacts_5xx_in_production() {
        let mut res = response();
        let err = HttpError::server_error(500, "boom");
        send_error_with(&mut res, &err, &[], Mode::Production);

        assert_eq!(res.transport().ended_body().unwrap(), br#"{"message":"Internal Server Error"}"#);
    }

    #[test]
    fn send_error_does_not_redact_4xx_in_production() {
        let mut res = response();
        let err = HttpError::client_error(400, "bad field");
        send_error_with(&mut res, &err, &[], Mode::Production);

        assert_eq!(res.transport().statuses(), vec![(400, "Bad Request".to_string())]);
        assert_eq!(res.transport().ended_body().unwrap(), br#"{"message":"bad field"}"#);
    }

    #[test]
    fn send_error_falls_back_to_the_reason_phrase() {
        let mut res = response();
        let err = HttpError::server_error(502, "");
        send_error_with(&mut res, &err, &[], Mode::Development);

        assert_eq!(res.transport().statuses(), vec![(502, "Bad Gateway".to_string())]);
        assert_eq!(res.transport().ended_body().unwrap(), br#"{"message":"Bad Gateway"}"#);
    }

    #[test]
    fn send_error_collapses_unknown_statuses() {
        let mut res = response();
        let err = HttpError::server_error(600, "");
        send_error_with(&mut res, &err, &[], Mode::Development);

        assert_eq!(res.transport().statuses(), vec![(500, "Internal Server Error".to_string())]);
        assert_eq!(res.transport().ended_body().unwrap(), br#"{"message":"Internal Server Error"}"#);
    }

    #[test]
    fn send_error_on_finalized_response_is_swallowed() {
        let mut res = response();
        res.finalize();

        let err = HttpError::server_error(500, "boom");
        send_error_with(&mut res, &err, &[], Mode::Development);
        assert!(res.transport().ops.is_empty());
    }

    #[tokio::test]
    async fn send_dispatches_by_shape() {
        // 204 beats everything
        let mut res = response();
        send(&mut res, 204, Outcome::Text("ignored".into()), &[]).await.unwrap();
        assert_eq!(res.transport().statuses(), vec![(204, "No Content".to_string())]);

        // empty
        let mut res = response();
        send(&mut res, 200, Outcome::Empty, &[]).await.unwrap();
        assert_eq!(res.transport().statuses(), vec![(204, "No Content".to_string())]);

        // text
        let mut res = response();
        send(&mut res, 200, Outcome::from("TonJS"), &[]).await.unwrap();
        assert_eq!(res.transport().header("content-type").unwrap(), TEXT_PLAIN_UTF8);
        assert_eq!(res.transport().ended_body().unwrap(), b"TonJS");

        // json
        let mut res = response();
        send(&mut res, 200, Outcome::from(serde_json::json!({ "key": "value" })), &[]).await.unwrap();
        assert_eq!(res.transport().header("content-type").unwrap(), APPLICATION_JSON_UTF8);
        assert_eq!(res.transport().ended_body().unwrap(), br#"{"key":"value"}"#);

        // failure
        let mut res = response();
        send(&mut res, 200, Outcome::from(HttpError::client_error(404, "Not Found")), &[]).await.unwrap();
        assert_eq!(res.transport().statuses(), vec![(404, "Not Found".to_string())]);

        // stream
        let mut res = response();
        let (stream, _) = guarded_stream(&[b"bytes"], 5);
        send(&mut res, 200, Outcome::from(stream), &[]).await.unwrap();
        assert_eq!(res.transport().header("content-type").unwrap(), APPLICATION_OCTET_STREAM);
    }

    #[tokio::test]
    async fn send_stream_bypasses_status_200() {
        let mut res = response();
        let (stream, _) = guarded_stream(&[b"asdf"], 4);
        send_stream(&mut res, 200, stream, &[]).await.unwrap();

        assert_eq!(res.transport().statuses(), vec![]);
        assert_eq!(res.transport().header("content-type").unwrap(), APPLICATION_OCTET_STREAM);
    }

    #[tokio::test]
    async fn send_stream_destroys_stream_when_done_in_first_try() {
        let mut res = response();
        let (stream, dropped) = guarded_stream(&[b"asdf"], 4);
        send_stream(&mut res, 201, stream, &[]).await.unwrap();

        let mock = res.transport();
        assert_eq!(mock.statuses(), vec![(201, "Created".to_string())]);
        assert_eq!(mock.ops.iter().filter(|op| matches!(op, Op::TryEnd { .. })).count(), 1);
        assert!(res.is_finalized());
        assert!(dropped.load(Ordering::SeqCst));
        // done through try-close: no separate end write
        assert_eq!(mock.end_count(), 0);
    }

    #[tokio::test]
    async fn send_stream_finalizes_once_on_stream_end() {
        // chunks absorbed but never reported done: the end arm must close
        let mut mock = MockTransport::new();
        mock.script_try_end(&[(true, false)]);
        let mut res = Response::new(mock);

        let (stream, dropped) = guarded_stream(&[b"asdf"], 10);
        send_stream(&mut res, 201, stream, &[]).await.unwrap();

        assert!(res.is_finalized());
        assert_eq!(res.transport().end_count(), 1);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_stream_pauses_and_retries_the_remainder_after_backpressure() {
        let mut mock = MockTransport::new();
        // first try: nothing absorbed; after drain two bytes are acknowledged,
        // the retry absorbs the rest and completes
        mock.script_try_end(&[(false, false), (false, true)]);
        mock.script_writable(&[2]);
        let mut res = Response::new(mock);

        let (stream, dropped) = guarded_stream(&[b"asdf"], 4);
        send_stream(&mut res, 201, stream, &[]).await.unwrap();

        let tries: Vec<_> = res
            .transport()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::TryEnd { data, total } => Some((data.clone(), *total)),
                _ => None,
            })
            .collect();

        assert_eq!(tries, vec![(b"asdf".to_vec(), 4), (b"df".to_vec(), 4)]);
        assert!(res.is_finalized());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_stream_resumes_after_backpressure_clears() {
        let mut mock = MockTransport::new();
        // chunk one: blocked then absorbed; chunk two: completes the body
        mock.script_try_end(&[(false, false), (true, false), (true, true)]);
        mock.script_writable(&[0]);
        let mut res = Response::new(mock);

        let (stream, dropped) = guarded_stream(&[b"as", b"df"], 4);
        send_stream(&mut res, 201, stream, &[]).await.unwrap();

        let tries = res.transport().ops.iter().filter(|op| matches!(op, Op::TryEnd { .. })).count();
        assert_eq!(tries, 3);
        assert!(res.is_finalized());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_stream_stays_paused_until_the_transport_accepts() {
        let mut mock = MockTransport::new();
        // two failed rounds before the remainder goes through
        mock.script_try_end(&[(false, false), (false, false), (false, true)]);
        mock.script_writable(&[0, 2]);
        let mut res = Response::new(mock);

        let (stream, _) = guarded_stream(&[b"asdf"], 4);
        send_stream(&mut res, 201, stream, &[]).await.unwrap();

        let tries = res.transport().ops.iter().filter(|op| matches!(op, Op::TryEnd { .. })).count();
        assert_eq!(tries, 3);
        assert!(res.is_finalized());
    }

    #[tokio::test]
    async fn send_stream_without_size_uses_plain_writes() {
        let mut res = response();
        let chunks: Vec<Result<Bytes, HttpError>> = vec![Ok(Bytes::from_static(b"as")), Ok(Bytes::from_static(b"df"))];
        let stream = ByteStream::new(stream::iter(chunks));
        send_stream(&mut res, 201, stream, &[]).await.unwrap();

        let mock = res.transport();
        assert!(mock.ops.iter().all(|op| !matches!(op, Op::TryEnd { .. })));
        let writes: Vec<_> = mock
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(data) => Some(data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![b"as".to_vec(), b"df".to_vec()]);
        // close-delimited: the end arm completes the response
        assert_eq!(mock.end_count(), 1);
        assert!(res.is_finalized());
    }

    #[tokio::test]
    async fn sizeless_writes_pause_on_pressure_and_carry_on() {
        let mut mock = MockTransport::new();
        // first chunk trips the watermark; the drain clears it
        mock.script_write(&[false, true]);
        let mut res = Response::new(mock);

        let chunks: Vec<Result<Bytes, HttpError>> = vec![Ok(Bytes::from_static(b"as")), Ok(Bytes::from_static(b"df"))];
        send_stream(&mut res, 201, ByteStream::new(stream::iter(chunks)), &[]).await.unwrap();

        let writes = res.transport().ops.iter().filter(|op| matches!(op, Op::Write(_))).count();
        assert_eq!(writes, 2);
        assert_eq!(res.transport().end_count(), 1);
        assert!(res.is_finalized());
    }

    #[tokio::test]
    async fn send_stream_refuses_a_finalized_response() {
        let mut res = response();
        res.finalize();

        let (stream, dropped) = guarded_stream(&[b"asdf"], 4);
        let err = send_stream(&mut res, 201, stream, &[]).await.unwrap_err();
        assert_eq!(err.status(), 500);
        assert!(res.transport().ops.is_empty());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_stream_stops_writing_once_aborted() {
        let mut mock = MockTransport::new();
        let abort = mock.abort_handle();
        let mut res = Response::new(mock);

        let dropped = Arc::new(AtomicBool::new(false));
        let guard = {
            struct DropFlag(Arc<AtomicBool>);
            impl Drop for DropFlag {
                fn drop(&mut self) {
                    self.0.store(true, Ordering::SeqCst);
                }
            }
            DropFlag(Arc::clone(&dropped))
        };

        // first poll aborts the connection, then yields a chunk; the writer
        // must observe the abort before attempting the write
        let mut polled = false;
        let stream = stream::poll_fn(move |_cx| {
            let _guard = &guard;
            if polled {
                return Poll::Ready(None);
            }
            polled = true;
            let _ = abort.send(true);
            Poll::Ready(Some(Ok(Bytes::from_static(b"asdf"))))
        });

        send_stream(&mut res, 201, ByteStream::sized(stream, 4), &[]).await.unwrap();

        let mock = res.transport();
        assert!(mock.ops.iter().all(|op| !matches!(op, Op::TryEnd { .. })));
        assert_eq!(mock.end_count(), 0);
        assert!(res.is_finalized());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_stream_routes_stream_errors_through_the_error_writer() {
        let mut res = response();
        let stream =
            ByteStream::sized(stream::iter([Err(HttpError::client_error(400, "mock error"))]), 4);
        send_stream(&mut res, 201, stream, &[]).await.unwrap();

        let mock = res.transport();
        // 201 staged first, then the error writer's 400
        assert_eq!(mock.statuses(), vec![(201, "Created".to_string()), (400, "Bad Request".to_string())]);
        assert_eq!(mock.ended_body().unwrap(), br#"{"message":"mock error"}"#);
        assert!(res.is_finalized());
    }

    #[tokio::test]
    async fn sized_stream_bytes_cross_the_transport_exactly_once() {
        // chunk split invariance under scripted backpressure: the transport
        // sees every byte exactly once, in order
        let payload = b"0123456789abcdef";
        for split in [1usize, 4, 7, 16] {
            let chunks: Vec<&[u8]> = payload.chunks(split).collect();
            let mut mock = MockTransport::new();
            // every first try of each chunk is refused once, nothing absorbed
            let episodes = chunks.len();
            let scripted: Vec<(bool, bool)> = (0..episodes).flat_map(|_| [(false, false)]).collect();
            mock.script_try_end(&scripted);
            let mut res = Response::new(mock);

            let (stream, dropped) = guarded_stream(&chunks, payload.len() as u64);
            send_stream(&mut res, 200, stream, &[]).await.unwrap();

            // the mock only advances its offset on accepted tries, so the
            // final offset equals the payload exactly when no byte was
            // skipped or written twice
            assert_eq!(res.transport().write_offset(), payload.len() as u64, "split {split}");

            let tries = res.transport().ops.iter().filter(|op| matches!(op, Op::TryEnd { .. })).count();
            assert_eq!(tries, chunks.len() * 2, "split {split}");

            assert!(dropped.load(Ordering::SeqCst), "stream not destroyed for split {split}");
            assert!(res.is_finalized());
        }
    }
}
