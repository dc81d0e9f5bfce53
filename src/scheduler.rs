// src/scheduler.rs
//! Refresh scheduler: Idle/Refreshing state machine driven by a periodic
//! timer and manual triggers. At most one cycle runs at a time; triggers that
//! arrive while refreshing are dropped, not queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::fetch::FetchOrchestrator;
use crate::presenter::Presenter;
use crate::quote::SourceResult;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Refreshing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Timer,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Timer => "timer",
        }
    }
}

/// Everything one completed cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    /// Recorded as "last updated" whether or not every source succeeded.
    pub finished_at: DateTime<Utc>,
    pub results: Vec<SourceResult>,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Completed(CycleReport),
    /// A cycle was already running.
    Skipped,
}

/// Returns the scheduler to Idle however the cycle ends. A cycle dropped
/// before `finish` tells the presenter it was aborted.
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
    presenter: &'a dyn Presenter,
    finished: bool,
}

impl CycleGuard<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(target: "refresh", "refresh cycle dropped before completion");
            self.presenter.refresh_aborted();
        }
        // presenter is notified before the claim is released
        self.flag.store(false, Ordering::Release);
        gauge!("refresh_in_progress").set(0.0);
    }
}

pub struct RefreshScheduler {
    orchestrator: FetchOrchestrator,
    presenter: Arc<dyn Presenter>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    refreshing: AtomicBool,
    cycles_started: AtomicU64,
    triggers_skipped: AtomicU64,
    last_updated: Mutex<Option<DateTime<Utc>>>,
}

impl RefreshScheduler {
    pub fn new(
        orchestrator: FetchOrchestrator,
        presenter: Arc<dyn Presenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orchestrator,
            presenter,
            clock,
            interval: DEFAULT_REFRESH_INTERVAL,
            refreshing: AtomicBool::new(false),
            cycles_started: AtomicU64::new(0),
            triggers_skipped: AtomicU64::new(0),
            last_updated: Mutex::new(None),
        }
    }

    /// A zero interval falls back to [`DEFAULT_REFRESH_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            tracing::warn!(target: "refresh", "zero refresh interval; using default");
            DEFAULT_REFRESH_INTERVAL
        } else {
            interval
        };
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> SchedulerState {
        if self.is_refreshing() {
            SchedulerState::Refreshing
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::Relaxed)
    }

    pub fn triggers_skipped(&self) -> u64 {
        self.triggers_skipped.load(Ordering::Relaxed)
    }

    /// Completion time of the most recent cycle.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.lock().expect("last_updated mutex poisoned")
    }

    /// Idle -> Refreshing, or record a skipped trigger.
    fn try_claim(&self, trigger: Trigger) -> bool {
        let claimed = self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if claimed {
            self.cycles_started.fetch_add(1, Ordering::Relaxed);
            counter!("refresh_cycles_total", "trigger" => trigger.label()).increment(1);
            gauge!("refresh_in_progress").set(1.0);
            self.presenter.refresh_started();
        } else {
            self.triggers_skipped.fetch_add(1, Ordering::Relaxed);
            counter!("refresh_skipped_total", "trigger" => trigger.label()).increment(1);
            tracing::debug!(
                target: "refresh",
                trigger = trigger.label(),
                "refresh already running; trigger ignored"
            );
        }
        claimed
    }

    async fn run_claimed(&self, trigger: Trigger) -> CycleReport {
        let guard = CycleGuard {
            flag: &self.refreshing,
            presenter: self.presenter.as_ref(),
            finished: false,
        };
        let started_at = self.clock.now();
        tracing::info!(target: "refresh", trigger = trigger.label(), "refresh cycle started");

        let results = self.orchestrator.run_cycle(self.presenter.as_ref()).await;

        let finished_at = self.clock.now();
        *self.last_updated.lock().expect("last_updated mutex poisoned") = Some(finished_at);
        gauge!("refresh_last_completed_ts").set(finished_at.timestamp() as f64);

        let report = CycleReport {
            trigger,
            started_at,
            finished_at,
            results,
        };
        tracing::info!(
            target: "refresh",
            trigger = trigger.label(),
            ok = report.succeeded(),
            failed = report.failed(),
            "refresh cycle completed"
        );
        self.presenter.cycle_completed(&report);
        guard.finish();
        report
    }

    /// Run a cycle on the current task unless one is already running.
    pub async fn trigger(&self, trigger: Trigger) -> RefreshOutcome {
        if !self.try_claim(trigger) {
            return RefreshOutcome::Skipped;
        }
        RefreshOutcome::Completed(self.run_claimed(trigger).await)
    }

    /// Start a cycle on a background task. Returns whether one was started.
    pub fn trigger_detached(self: &Arc<Self>, trigger: Trigger) -> bool {
        if !self.try_claim(trigger) {
            return false;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_claimed(trigger).await;
        });
        true
    }

    /// Periodic driver. The first tick fires immediately, so the board is
    /// populated at start-up.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.trigger_detached(Trigger::Timer);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::clock::ManualClock;
    use crate::fetch::{Canned, CannedTransport};
    use crate::presenter::NullPresenter;
    use crate::sources::{providers::wallgold, Relay, SourceDescriptor, SourceRegistry};
    use chrono::TimeZone;
    use once_cell::sync::OnceCell;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn scheduler(transport: CannedTransport, timeout: Duration) -> Arc<RefreshScheduler> {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = Arc::new(SourceRegistry::builtin(&Relay::default(), &[]).unwrap());
        let orch = FetchOrchestrator::new(registry, Arc::new(transport), clock.clone())
            .with_timeout(timeout);
        Arc::new(RefreshScheduler::new(orch, Arc::new(NullPresenter), clock))
    }

    fn slow_wallgold(delay: Duration) -> CannedTransport {
        CannedTransport::new().route(
            wallgold::ENDPOINT,
            Canned::json(r#"{"result":{"price":"1,000"}}"#).delayed(delay),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_during_refresh_is_a_noop() {
        let sched = scheduler(slow_wallgold(Duration::from_secs(10)), Duration::from_secs(25));

        assert!(sched.trigger_detached(Trigger::Manual));
        assert_eq!(sched.state(), SchedulerState::Refreshing);

        assert!(matches!(sched.trigger(Trigger::Manual).await, RefreshOutcome::Skipped));
        assert!(!sched.trigger_detached(Trigger::Timer));
        assert_eq!(sched.cycles_started(), 1);
        assert_eq!(sched.triggers_skipped(), 2);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sched.state(), SchedulerState::Idle);
        assert_eq!(sched.last_updated(), Some(t0()));
        assert_eq!(sched.cycles_started(), 1);
    }

    #[tokio::test]
    async fn cycle_completes_and_stamps_last_updated_even_if_all_fail() {
        let sched = scheduler(CannedTransport::new(), Duration::from_secs(25));
        assert_eq!(sched.last_updated(), None);

        let RefreshOutcome::Completed(report) = sched.trigger(Trigger::Manual).await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(report.results.len(), 4);
        assert_eq!(report.failed(), 4);
        assert_eq!(sched.last_updated(), Some(report.finished_at));
        assert_eq!(sched.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_at_start_and_every_interval() {
        let sched = scheduler(slow_wallgold(Duration::ZERO), Duration::from_secs(25));
        let handle = Arc::clone(&sched).spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sched.cycles_started(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sched.cycles_started(), 2);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn timer_tick_during_long_cycle_is_dropped_not_queued() {
        let sched = scheduler(slow_wallgold(Duration::from_secs(90)), Duration::from_secs(120));
        let handle = Arc::clone(&sched).spawn();

        // t=100: first cycle ran 0..90, the t=60 tick was suppressed
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(sched.cycles_started(), 1);
        assert_eq!(sched.triggers_skipped(), 1);
        assert_eq!(sched.state(), SchedulerState::Idle);

        // t=125: the t=120 tick started a fresh cycle
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(sched.cycles_started(), 2);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_falls_back_to_default() {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = Arc::new(SourceRegistry::builtin(&Relay::default(), &[]).unwrap());
        let orch = FetchOrchestrator::new(registry, Arc::new(CannedTransport::new()), clock.clone());
        let sched = Arc::new(
            RefreshScheduler::new(orch, Arc::new(NullPresenter), clock).with_interval(Duration::ZERO),
        );
        assert_eq!(sched.interval(), DEFAULT_REFRESH_INTERVAL);

        let handle = Arc::clone(&sched).spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sched.cycles_started(), 1);
        handle.abort();
    }

    /// Board presenter that tries to start another cycle from `cycle_completed`.
    struct RetriggeringBoard {
        board: Arc<Board>,
        scheduler: OnceCell<Arc<RefreshScheduler>>,
        retriggered: Mutex<Option<bool>>,
    }

    impl Presenter for RetriggeringBoard {
        fn refresh_started(&self) {
            self.board.refresh_started();
        }

        fn source_pending(&self, source: &SourceDescriptor) {
            self.board.source_pending(source);
        }

        fn source_completed(&self, source: &SourceDescriptor, result: &SourceResult) {
            self.board.source_completed(source, result);
        }

        fn cycle_completed(&self, report: &CycleReport) {
            self.board.cycle_completed(report);
            let mut retriggered = self.retriggered.lock().unwrap();
            if retriggered.is_none() {
                if let Some(sched) = self.scheduler.get() {
                    *retriggered = Some(sched.trigger_detached(Trigger::Manual));
                }
            }
        }

        fn refresh_aborted(&self) {
            self.board.refresh_aborted();
        }
    }

    #[tokio::test]
    async fn cycle_completed_runs_before_the_claim_is_released() {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = SourceRegistry::builtin(&Relay::default(), &[]).unwrap();
        let board = Arc::new(Board::new(&registry));
        let presenter = Arc::new(RetriggeringBoard {
            board: board.clone(),
            scheduler: OnceCell::new(),
            retriggered: Mutex::new(None),
        });
        let orch = FetchOrchestrator::new(
            Arc::new(registry),
            Arc::new(CannedTransport::new()),
            clock.clone(),
        );
        let sched = Arc::new(RefreshScheduler::new(orch, presenter.clone(), clock));
        let _ = presenter.scheduler.set(sched.clone());

        assert!(matches!(
            sched.trigger(Trigger::Manual).await,
            RefreshOutcome::Completed(_)
        ));
        tokio::task::yield_now().await;

        // still Refreshing inside cycle_completed, so the retrigger is a no-op
        assert_eq!(*presenter.retriggered.lock().unwrap(), Some(false));
        assert_eq!(sched.cycles_started(), 1);
        assert_eq!(sched.state(), SchedulerState::Idle);
        assert_eq!(board.snapshot().refreshing, sched.is_refreshing());
        assert_eq!(board.snapshot().last_updated, Some(t0()));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_cycle_returns_board_and_scheduler_to_idle() {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = SourceRegistry::builtin(&Relay::default(), &[]).unwrap();
        let board = Arc::new(Board::new(&registry));
        let orch = FetchOrchestrator::new(
            Arc::new(registry),
            Arc::new(slow_wallgold(Duration::from_secs(10))),
            clock.clone(),
        );
        let sched = RefreshScheduler::new(orch, board.clone(), clock);

        let cut_short =
            tokio::time::timeout(Duration::from_secs(1), sched.trigger(Trigger::Manual)).await;
        assert!(cut_short.is_err());

        assert_eq!(sched.state(), SchedulerState::Idle);
        let snap = board.snapshot();
        assert!(!snap.refreshing);
        assert_eq!(snap.last_updated, None);
        assert_eq!(sched.last_updated(), None);
    }
}
