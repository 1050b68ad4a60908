//! Route-list shape: several endpoints registered at once.

use ton::{
    create_app, listen, read_json, register_graceful_shutdown, routes, AppOptions, Conn, HttpError, Method,
    Outcome, Request, Response, Route, TextOptions,
};
use tracing::info;

async fn home(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    Ok(Some(Outcome::from("TonJS")))
}

async fn user(req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    let id = req.param("id").unwrap_or("unknown");
    Ok(Some(Outcome::from(serde_json::json!({ "id": id }))))
}

async fn echo(_req: Request, res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    let body: serde_json::Value = read_json(res, TextOptions::default()).await?;
    Ok(Some(Outcome::from(body)))
}

async fn pong(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    Ok(Some(Outcome::from(serde_json::json!({ "result": "pong" }))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let mut app = create_app(AppOptions::default())?;
    routes(
        &mut app,
        vec![
            Route::new(Method::Get, "/", home),
            Route::new(Method::Get, "/user/:id", user),
            Route::new(Method::Post, "/echo", echo),
            Route::new(Method::Any, "/ping", pong),
        ],
    );

    let token = listen(app, "0.0.0.0", 3000).await?;
    register_graceful_shutdown(token);

    info!("you raise me up, to listen on http://0.0.0.0:3000");
    std::future::pending::<()>().await;
    Ok(())
}
