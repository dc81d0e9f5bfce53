use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;

use crate::board::{Board, BoardSnapshot};
use crate::clock::Clock;
use crate::config::BoardConfig;
use crate::fetch::{FetchOrchestrator, HttpTransport};
use crate::scheduler::{RefreshScheduler, SchedulerState, Trigger};
use crate::sources::SourceRegistry;

#[derive(Clone)]
pub struct AppState {
    pub board: Arc<Board>,
    pub scheduler: Arc<RefreshScheduler>,
}

impl AppState {
    /// Wire registry, orchestrator, board and scheduler from start-up config.
    pub fn from_config(
        cfg: &BoardConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let registry = Arc::new(
            SourceRegistry::builtin(&cfg.relay(), &cfg.sources)
                .context("building source registry")?,
        );
        let board = Arc::new(Board::new(&registry));
        let orchestrator = FetchOrchestrator::new(registry, transport, clock.clone())
            .with_timeout(cfg.fetch_timeout());
        let scheduler = RefreshScheduler::new(orchestrator, board.clone(), clock)
            .with_interval(cfg.refresh_interval());
        Ok(Self {
            board,
            scheduler: Arc::new(scheduler),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/board", get(get_board))
        .route("/api/status", get(status))
        .route("/api/refresh", post(refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn get_board(State(state): State<AppState>) -> Json<BoardSnapshot> {
    Json(state.board.snapshot())
}

#[derive(serde::Serialize)]
struct StatusOut {
    state: SchedulerState,
    cycles_started: u64,
    triggers_skipped: u64,
    last_updated: Option<DateTime<Utc>>,
    refresh_interval_secs: u64,
    fetch_timeout_secs: u64,
}

async fn status(State(state): State<AppState>) -> Json<StatusOut> {
    let s = &state.scheduler;
    Json(StatusOut {
        state: s.state(),
        cycles_started: s.cycles_started(),
        triggers_skipped: s.triggers_skipped(),
        last_updated: s.last_updated(),
        refresh_interval_secs: s.interval().as_secs(),
        fetch_timeout_secs: s.orchestrator().timeout().as_secs(),
    })
}

#[derive(serde::Serialize)]
struct RefreshOut {
    started: bool,
}

/// Manual refresh. The cycle runs in the background; 409 when one is
/// already in progress.
async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshOut>) {
    if state.scheduler.trigger_detached(Trigger::Manual) {
        (StatusCode::ACCEPTED, Json(RefreshOut { started: true }))
    } else {
        (StatusCode::CONFLICT, Json(RefreshOut { started: false }))
    }
}
