//! Hand-driven sends: the handler finalizes the response itself and returns
//! `None`, so the adapter sends nothing on top.

use ton::{
    create_app, get, listen, redirect, register_graceful_shutdown, send_text, AppOptions, Conn, HttpError,
    Outcome, Request, Response,
};
use tracing::info;

async fn home(_req: Request, res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    send_text(res, 200, "TonJS", &[])?;
    Ok(None)
}

async fn to_docs(_req: Request, res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    redirect(res, 302, "https://tonjs.com")?;
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let mut app = create_app(AppOptions::default())?;
    get(&mut app, "/", home);
    get(&mut app, "/redirect", to_docs);

    let token = listen(app, "0.0.0.0", 3000).await?;
    register_graceful_shutdown(token);

    info!("you raise me up, to listen on http://0.0.0.0:3000");
    std::future::pending::<()>().await;
    Ok(())
}
