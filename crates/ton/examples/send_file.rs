//! Streams a file with a declared size through the backpressure-aware writer.

use futures::TryStreamExt;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use ton::{
    create_app, get, listen, register_graceful_shutdown, AppOptions, ByteStream, Conn, HttpError, Outcome,
    Request, Response,
};
use tracing::info;

const TARGET: &str = "README.md";

async fn send_file(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    let file = File::open(TARGET).await?;
    let size = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map_err(HttpError::from);
    Ok(Some(Outcome::Stream(ByteStream::sized(stream, size))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let mut app = create_app(AppOptions::default())?;
    get(&mut app, "/", send_file);

    let token = listen(app, "0.0.0.0", 3000).await?;
    register_graceful_shutdown(token);

    info!("you raise me up, to listen on http://0.0.0.0:3000");
    std::future::pending::<()>().await;
    Ok(())
}
