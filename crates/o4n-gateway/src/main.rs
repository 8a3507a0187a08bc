mod logging;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use o4n_auth::{AuthHandler, HttpKeyResolver, LoginHandler, Options};

use crate::server::AppState;

#[derive(Debug, Parser)]
#[command(name = "o4n-gateway", about = "OIDC login bridge for static sites")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "O4N_BIND", default_value = "127.0.0.1:8888")]
    bind: SocketAddr,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "O4N_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON log lines.
    #[arg(long, env = "O4N_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_json)?;

    let options = Arc::new(Options::from_env());
    if options.jwt_secret.is_none() {
        tracing::warn!("O4N_JWT_SECRET is not set; token exchange will fail");
    }
    if options.prod_base_url.is_none() {
        tracing::warn!("O4N_PROD_BASE_URL is not set; login will fail");
    }
    if options.okta_url.is_none() {
        tracing::warn!("O4N_OKTA_URL is not set; production login will fail");
    }
    if options.unsafe_flags.debug
        || options.unsafe_flags.ignore_token_expiration
        || options.unsafe_flags.insecure_cookies
    {
        tracing::warn!(flags = ?options.unsafe_flags, "unsafe development flags enabled");
    }

    let resolver =
        HttpKeyResolver::new(options.jwks_timeout).context("building key fetch client")?;
    let state = Arc::new(AppState::new(
        LoginHandler::new(Arc::clone(&options)),
        AuthHandler::new(options, resolver),
    ));

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    tracing::info!(addr = %cli.bind, "listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
