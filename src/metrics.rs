use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("refresh_cycles_total", "Refresh cycles started, by trigger.");
        describe_counter!(
            "refresh_skipped_total",
            "Triggers ignored because a cycle was already running."
        );
        describe_counter!(
            "source_fetch_total",
            "Per-source fetch outcomes (ok or failure label)."
        );
        describe_histogram!("source_fetch_ms", "Per-source fetch + normalize time in milliseconds.");
        describe_gauge!("refresh_in_progress", "1 while a refresh cycle is running.");
        describe_gauge!(
            "refresh_last_completed_ts",
            "Unix ts when the last refresh cycle completed."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Can succeed once per process.
    pub fn init() -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
