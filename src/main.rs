//! Gold price board binary entrypoint.
//! Loads start-up config, spawns the refresh scheduler and serves the card
//! API plus Prometheus metrics over Axum.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gold_price_board::api::{self, AppState};
use gold_price_board::clock::SystemClock;
use gold_price_board::config::BoardConfig;
use gold_price_board::fetch::ReqwestTransport;
use gold_price_board::metrics::Metrics;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - BOARD_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("BOARD_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("refresh=info,fetch=info,config=info,warn"));

    // Shuttle may already have installed a subscriber; keep theirs then.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let metrics = Metrics::init().context("installing prometheus recorder")?;
    let cfg = BoardConfig::load_default().context("loading board config")?;

    let transport = Arc::new(ReqwestTransport::new()?);
    let state = AppState::from_config(&cfg, transport, Arc::new(SystemClock))?;

    // First tick fires immediately, so cards populate at start-up.
    state.scheduler.clone().spawn();

    let router = api::router(state).merge(metrics.router());
    Ok(router.into())
}
