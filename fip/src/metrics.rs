//! Metric Sampler.
//!
//! Pulls fixed-period aggregates from the platform's metric store. The
//! store returns one datapoint per period that has data; an absent period
//! means zero observations in it, which is NOT the same as a zero-valued
//! datapoint. A metric entirely absent over the window (e.g. `Throttles`
//! for a zero-reserved-concurrency drop) is diagnostic information, not an
//! error.

use chrono::{DateTime, Utc};
use fip_common::errors::{ProbeError, ProbeResult, StoreKind};
use fip_common::gateway::MetricStore;
use fip_common::types::{FunctionName, MetricName, MetricSample};
use std::time::Duration;
use tracing::debug;

/// Smallest aggregation period the metric store supports.
pub const PERIOD_FLOOR: Duration = Duration::from_secs(60);

/// Sample `metric` for `function` over `[start, end)` at `period`
/// granularity (clamped to the 60 s floor), sorted by period start.
pub async fn sample<S: MetricStore + Sync>(
    store: &S,
    function: &FunctionName,
    metric: MetricName,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    period: Duration,
    call_timeout: Duration,
) -> ProbeResult<Vec<MetricSample>> {
    let period = period.max(PERIOD_FLOOR);
    let samples = tokio::time::timeout(
        call_timeout,
        store.metric_statistics(function, metric, start, end, period),
    )
    .await
    .map_err(|_| ProbeError::StoreUnavailable {
        store: StoreKind::Metric,
        reason: format!("metric query timed out after {}s", call_timeout.as_secs()),
    })??;

    debug!(
        function = %function,
        metric = %metric,
        periods = samples.len(),
        "sampled metric window"
    );
    Ok(samples)
}

/// Number of invocation attempts a set of samples represents.
///
/// `AsyncEventAge` is emitted once per attempt, so its total sample count
/// is the attempt count. The counter metrics (`Throttles`,
/// `AsyncEventsReceived`, `AsyncEventsDropped`, `FailedInvocations`) carry
/// the count in their sums.
pub fn attempt_count(metric: MetricName, samples: &[MetricSample]) -> u64 {
    match metric {
        MetricName::AsyncEventAge => samples.iter().map(|s| s.sample_count).sum(),
        _ => samples.iter().map(|s| s.sum).sum::<f64>().round() as u64,
    }
}
