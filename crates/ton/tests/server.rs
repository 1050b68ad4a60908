//! End-to-end tests against a live listener: raw bytes in, raw bytes out.

use futures::stream;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use ton::{
    close, create_app, listen, read_json, routes, AppOptions, ByteStream, Conn, HttpError, ListenToken, Method,
    Outcome, Request, Response, Route, TextOptions,
};

async fn home(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    Ok(Some(Outcome::from("TonJS")))
}

async fn empty(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    Ok(Some(Outcome::Empty))
}

async fn user(req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    let id = req.param("id").unwrap_or_default().to_string();
    Ok(Some(Outcome::from(serde_json::json!({ "id": id }))))
}

async fn echo(_req: Request, res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    let body: serde_json::Value = read_json(res, TextOptions::default()).await?;
    Ok(Some(Outcome::from(body)))
}

async fn boom(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    let cause: Box<dyn std::error::Error + Send + Sync> = "boom".into();
    Err(HttpError::from(cause))
}

async fn stream_route(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    let chunks: Vec<Result<Bytes, HttpError>> =
        vec![Ok(Bytes::from_static(b"str")), Ok(Bytes::from_static(b"eam"))];
    Ok(Some(Outcome::Stream(ByteStream::sized(stream::iter(chunks), 6))))
}

async fn start() -> ListenToken {
    let mut app = create_app(AppOptions::default()).unwrap();
    routes(
        &mut app,
        vec![
            Route::new(Method::Get, "/", home),
            Route::new(Method::Get, "/empty", empty),
            Route::new(Method::Get, "/user/:id", user),
            Route::new(Method::Post, "/echo", echo),
            Route::new(Method::Get, "/boom", boom),
            Route::new(Method::Get, "/stream", stream_route),
        ],
    );
    listen(app, "127.0.0.1", 0).await.unwrap()
}

/// Sends one close-delimited request and reads the whole response.
async fn roundtrip(token: &ListenToken, request: &str) -> String {
    let mut stream = TcpStream::connect(token.addr()).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

fn body_of(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

#[tokio::test]
async fn serves_text() {
    let token = start().await;

    let response = roundtrip(&token, "GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("Content-Type: text/plain; charset=utf-8\r\n"));
    assert!(response.contains("Content-Length: 5\r\n"));
    assert_eq!(body_of(&response), "TonJS");

    close(token);
}

#[tokio::test]
async fn serves_204_without_body() {
    let token = start().await;

    let response = roundtrip(&token, "GET /empty HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 204 No Content\r\n"), "{response}");
    assert!(!response.contains("Content-Length"));
    assert_eq!(body_of(&response), "");

    close(token);
}

#[tokio::test]
async fn captures_path_params() {
    let token = start().await;

    let response = roundtrip(&token, "GET /user/42 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(response.contains("Content-Type: application/json; charset=utf-8\r\n"));
    assert_eq!(body_of(&response), r#"{"id":"42"}"#);

    close(token);
}

#[tokio::test]
async fn echoes_json_bodies() {
    let token = start().await;

    let body = r#"{"key":"value"}"#;
    let request = format!(
        "POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let response = roundtrip(&token, &request).await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert_eq!(body_of(&response), body);

    close(token);
}

#[tokio::test]
async fn rejects_invalid_json_with_400() {
    let token = start().await;

    let request =
        "POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\nConnection: close\r\n\r\nton".to_string();
    let response = roundtrip(&token, &request).await;

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
    assert_eq!(body_of(&response), r#"{"message":"Invalid JSON"}"#);

    close(token);
}

#[tokio::test]
async fn handler_errors_become_500_json() {
    let token = start().await;

    let response = roundtrip(&token, "GET /boom HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{response}");
    assert_eq!(body_of(&response), r#"{"message":"boom"}"#);

    close(token);
}

#[tokio::test]
async fn streams_with_a_declared_size() {
    let token = start().await;

    let response = roundtrip(&token, "GET /stream HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("Content-Type: application/octet-stream\r\n"));
    assert!(response.contains("Content-Length: 6\r\n"));
    assert_eq!(body_of(&response), "stream");

    close(token);
}

#[tokio::test]
async fn unmatched_routes_get_404() {
    let token = start().await;

    let response = roundtrip(&token, "GET /nope HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");

    close(token);
}

#[tokio::test]
async fn keeps_the_connection_alive_between_requests() {
    let token = start().await;

    let mut stream = TcpStream::connect(token.addr()).await.unwrap();

    // first request, connection stays open
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
    let first = read_one_response(&mut stream).await;
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"), "{first}");
    assert!(first.ends_with("TonJS"), "{first}");

    // second request on the same socket
    stream.write_all(b"GET /user/7 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    let second = String::from_utf8(rest).unwrap();
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"), "{second}");
    assert_eq!(body_of(&second), r#"{"id":"7"}"#);

    close(token);
}

/// Reads exactly one length-framed response from the stream.
async fn read_one_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert_ne!(n, 0, "connection closed early: {}", String::from_utf8_lossy(&buf));
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some((head, body)) = text.split_once("\r\n\r\n") {
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("Content-Length: "))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if body.len() >= content_length {
                return text.into_owned();
            }
        }
    }
}

#[tokio::test]
async fn closed_listener_refuses_new_connections() {
    let token = start().await;
    let addr = token.addr();
    close(token);

    // closing is async on the accept loop; retry until the port refuses
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if TcpStream::connect(addr).await.is_err() {
            return;
        }
    }
    panic!("listener still accepting after close");
}
