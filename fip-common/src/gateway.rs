//! Service seams for the external platform.
//!
//! The harness consumes four third-party service contracts as opaque black
//! boxes: the function gateway (invoke + control plane), the log store, the
//! metric store, and the event bus. Each is a trait so tests and the
//! simulation CLI can run against [`crate::mock::MockGateway`] while a real
//! provider binding can slot in behind the same seams.
//!
//! Methods return `impl Future + Send` (rather than bare `async fn`) so
//! scenario code can spawn invocations onto tasks; implementations may
//! still be written with `async fn`.

use crate::errors::ProbeResult;
use crate::types::{
    FunctionName, InvocationType, InvokeOutcome, LogEvent, MetricName, MetricSample,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Invoke and control plane for the remote function service.
pub trait FunctionGateway {
    /// Invoke a function. Synchronous invocations resolve with the
    /// function's response (or its structured error); asynchronous ones
    /// resolve with an acknowledgment as soon as the event is enqueued.
    fn invoke(
        &self,
        function: &FunctionName,
        invocation_type: InvocationType,
    ) -> impl Future<Output = ProbeResult<InvokeOutcome>> + Send;

    /// Set or clear the function's reserved concurrency. `None` removes
    /// the cap. Mutates remote state shared by every scenario targeting
    /// this function; callers must restore it.
    fn set_reserved_concurrency(
        &self,
        function: &FunctionName,
        limit: Option<u32>,
    ) -> impl Future<Output = ProbeResult<()>> + Send;
}

/// Read side of the platform's log store.
pub trait LogStore {
    /// All log events for `function` with `timestamp >= start_time`.
    ///
    /// The store only honors whole-resolution lower bounds; callers are
    /// responsible for flooring `start_time` (see the timeline reader).
    /// Pure read, no internal retry.
    fn filter_events(
        &self,
        function: &FunctionName,
        start_time: DateTime<Utc>,
    ) -> impl Future<Output = ProbeResult<Vec<LogEvent>>> + Send;
}

/// Read side of the platform's metric store.
pub trait MetricStore {
    /// One aggregate per `period` within `[start, end)` that has data,
    /// sorted by period start. Periods without datapoints are absent, not
    /// zero.
    fn metric_statistics(
        &self,
        function: &FunctionName,
        metric: MetricName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: Duration,
    ) -> impl Future<Output = ProbeResult<Vec<MetricSample>>> + Send;
}

/// Event-routing layer (the publish-permissions investigation surface).
pub trait EventBus {
    /// Put one event on the bus. Matching rules route it onward; a rule
    /// without publish permission fails silently on the bus side, visible
    /// only through the rule's `FailedInvocations` metric and the absence
    /// of downstream effects.
    fn put_event(
        &self,
        source: &str,
        detail_type: &str,
        detail: serde_json::Value,
    ) -> impl Future<Output = ProbeResult<()>> + Send;
}
