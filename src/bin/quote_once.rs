//! Runs a single refresh cycle against the live upstreams and prints each
//! source's result as it arrives.

use std::sync::Arc;

use gold_price_board::clock::SystemClock;
use gold_price_board::config::BoardConfig;
use gold_price_board::fetch::{FetchOrchestrator, ReqwestTransport};
use gold_price_board::presenter::Presenter;
use gold_price_board::scheduler::CycleReport;
use gold_price_board::sources::{SourceDescriptor, SourceRegistry};
use gold_price_board::{RefreshScheduler, SourceResult, Trigger};

struct StdoutPresenter;

impl Presenter for StdoutPresenter {
    fn source_pending(&self, source: &SourceDescriptor) {
        println!("{:<16} fetching {}", source.id, source.endpoint);
    }

    fn source_completed(&self, source: &SourceDescriptor, result: &SourceResult) {
        match &result.outcome {
            Ok(q) => {
                let ts = if q.observed_at.is_substituted() {
                    format!("{} (local)", q.observed_at.at)
                } else {
                    q.observed_at.at.to_string()
                };
                println!(
                    "{:<16} {}  at {}",
                    source.id,
                    source.currency_unit.format_price(q.price),
                    ts
                );
            }
            Err(e) => println!("{:<16} ERROR {}", source.id, e.reason_text()),
        }
    }

    fn cycle_completed(&self, report: &CycleReport) {
        println!(
            "done: {} ok, {} failed, last updated {}",
            report.succeeded(),
            report.failed(),
            report.finished_at
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = BoardConfig::load_default()?;
    let registry = Arc::new(SourceRegistry::builtin(&cfg.relay(), &cfg.sources)?);
    let orch = FetchOrchestrator::new(
        registry,
        Arc::new(ReqwestTransport::new()?),
        Arc::new(SystemClock),
    )
    .with_timeout(cfg.fetch_timeout());

    let scheduler = RefreshScheduler::new(orch, Arc::new(StdoutPresenter), Arc::new(SystemClock));
    scheduler.trigger(Trigger::Manual).await;
    Ok(())
}
