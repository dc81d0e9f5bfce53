// src/fetch.rs
//! Fan-out fetch: one bounded GET per source, polled concurrently on the
//! calling task, each response normalized by its own source.
//!
//! A source's failure never leaves its own future: transport errors,
//! timeouts, bad bodies and normalization failures all become that source's
//! `SourceResult`, and the cycle returns once every source has one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;

use crate::clock::Clock;
use crate::error::{FetchError, FetchErrorKind, SourceError};
use crate::presenter::Presenter;
use crate::quote::SourceResult;
use crate::sources::{SourceDescriptor, SourceRegistry};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(25);

/// Status line and body bytes of an upstream response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Plain GET. Dropping the returned future must abort the request.
    async fn get(&self, url: &str) -> Result<RawResponse, FetchErrorKind>;
}

/// reqwest-backed transport: JSON `Accept`, no cookie store, no referrer.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .referer(false)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchErrorKind> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchErrorKind::NetworkFailure(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchErrorKind::NetworkFailure(e.to_string()))?;
        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

pub struct FetchOrchestrator {
    registry: Arc<SourceRegistry>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl FetchOrchestrator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            transport,
            clock,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_payload(&self, source: &SourceDescriptor) -> Result<Value, FetchErrorKind> {
        // Elapsed drops the transport future, which aborts the request.
        let resp = tokio::time::timeout(self.timeout, self.transport.get(&source.endpoint))
            .await
            .map_err(|_| FetchErrorKind::Timeout)??;

        if !(200..300).contains(&resp.status) {
            return Err(FetchErrorKind::HttpStatus(resp.status));
        }
        serde_json::from_slice(&resp.body).map_err(|e| FetchErrorKind::MalformedBody(e.to_string()))
    }

    /// Fetch and normalize a single source.
    pub async fn fetch_source(&self, source: &SourceDescriptor) -> SourceResult {
        let t0 = Instant::now();
        let outcome = match self.fetch_payload(source).await {
            Ok(payload) => source
                .normalize(&payload, self.clock.now())
                .map_err(SourceError::from),
            Err(kind) => Err(SourceError::from(FetchError {
                source_id: source.id.to_string(),
                kind,
            })),
        };
        let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;

        let label = match &outcome {
            Ok(quote) => {
                tracing::debug!(
                    target: "fetch",
                    source = source.id,
                    price = quote.price,
                    substituted_ts = quote.observed_at.is_substituted(),
                    elapsed_ms,
                    "quote ok"
                );
                "ok"
            }
            Err(e) => {
                tracing::warn!(
                    target: "fetch",
                    source = source.id,
                    error = %e,
                    elapsed_ms,
                    "source failed"
                );
                e.label()
            }
        };
        counter!("source_fetch_total", "source" => source.id, "outcome" => label).increment(1);
        histogram!("source_fetch_ms", "source" => source.id).record(elapsed_ms);

        SourceResult {
            source_id: source.id.to_string(),
            outcome,
        }
    }

    /// Fetch every source concurrently. Each result reaches `presenter` as
    /// soon as it completes; the returned vector is in registry order.
    pub async fn run_cycle(&self, presenter: &dyn Presenter) -> Vec<SourceResult> {
        crate::metrics::ensure_described();

        let sources = self.registry.as_slice();
        for source in sources {
            presenter.source_pending(source);
        }

        let mut in_flight: FuturesUnordered<_> = sources
            .iter()
            .enumerate()
            .map(|(idx, source)| async move { (idx, self.fetch_source(source).await) })
            .collect();

        let mut slots: Vec<Option<SourceResult>> = vec![None; sources.len()];
        while let Some((idx, result)) = in_flight.next().await {
            presenter.source_completed(&sources[idx], &result);
            slots[idx] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }
}

/// One canned reply for [`CannedTransport`].
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Canned {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory transport keyed by URL, for demos and tests. Counts requests
/// that completed and requests that were dropped before completing.
#[derive(Debug, Default)]
pub struct CannedTransport {
    routes: HashMap<String, Canned>,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl CannedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: impl Into<String>, reply: Canned) -> Self {
        self.routes.insert(url.into(), reply);
        self
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct InFlight<'a> {
    done: bool,
    cancelled: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl HttpTransport for CannedTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchErrorKind> {
        let reply = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| FetchErrorKind::NetworkFailure(format!("no route for {url}")))?;

        let mut guard = InFlight {
            done: false,
            cancelled: &self.cancelled,
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        guard.done = true;
        self.completed.fetch_add(1, Ordering::SeqCst);

        Ok(RawResponse {
            status: reply.status,
            body: reply.body.into_bytes(),
        })
    }
}
