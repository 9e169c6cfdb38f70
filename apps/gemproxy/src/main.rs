use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use gemproxy_core::{Core, UpstreamClientConfig, WreqUpstreamClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

mod cli;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("gemproxy failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = cli.config.resolve()?;
    info!(
        host = %config.host,
        port = config.port,
        upstream = %config.upstream_base_url,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        default_api_key = config.default_api_key.is_some(),
        request_timeout_secs = config.request_timeout_secs,
        "config loaded"
    );

    let client = WreqUpstreamClient::new(UpstreamClientConfig::from_global(&config))?;
    let bind = config.bind_addr();
    let core = Core::new(config, Arc::new(client));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(core, &bind).await,
        Command::Invoke => invoke(core).await,
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gemproxy=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(core: Core, bind: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, core.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");
    Ok(())
}

async fn invoke(core: Core) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut raw = Vec::new();
    tokio::io::stdin().read_to_end(&mut raw).await?;
    let response = core.handle_event(&raw).await;
    let mut out = serde_json::to_vec(&response)?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
