// src/presenter.rs
use crate::quote::SourceResult;
use crate::scheduler::CycleReport;
use crate::sources::SourceDescriptor;

/// Consumer of refresh progress. The core only hands out data; whatever
/// renders cards implements this.
///
/// Callbacks are synchronous and must not block: they run on the task that
/// drives the fan-out.
pub trait Presenter: Send + Sync {
    /// A cycle was accepted by the scheduler (refresh controls go busy).
    fn refresh_started(&self) {}

    /// `source` has no result in the current cycle yet.
    fn source_pending(&self, source: &SourceDescriptor);

    /// `source` finished; called once per source per cycle, in completion order.
    fn source_completed(&self, source: &SourceDescriptor, result: &SourceResult);

    /// Every source has a result; `report.finished_at` is the new "last updated".
    /// Runs while the scheduler still reports Refreshing.
    fn cycle_completed(&self, report: &CycleReport);

    /// The cycle was dropped before completing (refresh controls go idle).
    fn refresh_aborted(&self) {}
}

/// Presenter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn source_pending(&self, _source: &SourceDescriptor) {}
    fn source_completed(&self, _source: &SourceDescriptor, _result: &SourceResult) {}
    fn cycle_completed(&self, _report: &CycleReport) {}
}
