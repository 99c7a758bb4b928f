mod config;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::config::Config;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    if config.signing_key.is_none() {
        tracing::warn!("no signing pair configured; token minting is disabled");
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        http: reqwest::Client::new(),
    };
    let app = routes::router(state);

    tracing::info!("Starting API server, listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .context("Failed to bind API listener")?;
    axum::serve(listener, app)
        .await
        .context("API server exited")?;

    Ok(())
}
