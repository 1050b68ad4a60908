//! The `ton` CLI: serves the built-in demo routes.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ton::{
    create_app, routes, listen, redirect, register_graceful_shutdown, AppOptions, Conn, HttpError, Method, Outcome,
    Request, Response, Route,
};

#[derive(Parser, Debug)]
#[command(name = "ton", version, about = "a minimal http server", long_about = None)]
struct Args {
    /// Host name to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to listen on
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Serve over SSL (requires --key and --cert)
    #[arg(long, requires = "key", requires = "cert")]
    ssl: bool,

    /// Path of the SSL key
    #[arg(long)]
    key: Option<String>,

    /// Path of the SSL cert
    #[arg(long)]
    cert: Option<String>,

    /// Passphrase of the SSL cert
    #[arg(long)]
    passphrase: Option<String>,

    /// Path of the SSL params.dh
    #[arg(long)]
    dh_params: Option<String>,

    /// Trade SSL performance for lower memory usage
    #[arg(long)]
    prefer_low_memory_usage: bool,
}

impl From<&Args> for AppOptions {
    fn from(args: &Args) -> Self {
        AppOptions {
            ssl: args.ssl,
            key: args.key.clone(),
            cert: args.cert.clone(),
            passphrase: args.passphrase.clone(),
            dh_params: args.dh_params.clone(),
            prefer_low_memory_usage: args.prefer_low_memory_usage,
        }
    }
}

async fn home(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    Ok(Some(Outcome::from("TonJS")))
}

async fn empty(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    Ok(Some(Outcome::Empty))
}

async fn pong(_req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    Ok(Some(Outcome::from(serde_json::json!({ "result": "pong" }))))
}

async fn user(req: Request, _res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    let id = req.param("id").unwrap_or("unknown");
    Ok(Some(Outcome::from(serde_json::json!({ "id": id }))))
}

async fn to_docs(_req: Request, res: &mut Response<Conn>) -> Result<Option<Outcome>, HttpError> {
    redirect(res, 302, "https://tonjs.com")?;
    Ok(None)
}

fn demo_routes() -> Vec<Route> {
    vec![
        Route::new(Method::Get, "/", home),
        Route::new(Method::Get, "/empty", empty),
        Route::new(Method::Any, "/ping", pong),
        Route::new(Method::Get, "/user/:id", user),
        Route::new(Method::Get, "/redirect", to_docs),
    ]
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = create_app(AppOptions::from(args))?;
    routes(&mut app, demo_routes());

    let token = listen(app, &args.host, args.port).await?;
    register_graceful_shutdown(token);

    info!("you raise me up, to listen on http://{}:{}", args.host, args.port);
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    info!("[Try Love TonJS]");

    if let Err(e) = run(&args).await {
        info!("failed to listen on {}:{}", args.host, args.port);
        error!(cause = %e, "startup failed");
        std::process::exit(1);
    }

    // serve until the process is told to stop
    std::future::pending::<()>().await;
}
