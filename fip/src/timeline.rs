//! Log Timeline Reader.
//!
//! Reconstructs the sequence of invocation-start times for a function from
//! the platform's log store. The store is eventually consistent, so the
//! timeline is rebuilt fresh on every call and never cached.

use chrono::{DateTime, TimeZone, Utc};
use fip_common::errors::{ProbeError, ProbeResult, StoreKind};
use fip_common::gateway::LogStore;
use fip_common::types::{AttemptTimeline, FunctionName};
use std::time::Duration;
use tracing::debug;

/// Log line prefix marking the start of one invocation attempt.
pub const START_MARKER: &str = "START";

/// Read the attempt timeline for `function` from `since` onward.
///
/// `since` is floored to whole seconds before querying: the log store does
/// not honor sub-second lower bounds and a finer value can silently exclude
/// the very first entry.
///
/// An empty timeline is a valid, meaningful result (e.g. the call was
/// rejected before execution). Store failures and the per-call timeout
/// surface as [`ProbeError::StoreUnavailable`]; the reader never retries
/// internally, since masked log-store flakiness would contaminate the
/// measurement.
pub async fn read_timeline<S: LogStore + Sync>(
    store: &S,
    function: &FunctionName,
    since: DateTime<Utc>,
    call_timeout: Duration,
) -> ProbeResult<AttemptTimeline> {
    let floored = floor_to_second(since);
    let events = tokio::time::timeout(call_timeout, store.filter_events(function, floored))
        .await
        .map_err(|_| ProbeError::StoreUnavailable {
            store: StoreKind::Log,
            reason: format!("log query timed out after {}s", call_timeout.as_secs()),
        })??;

    let starts: Vec<DateTime<Utc>> = events
        .iter()
        .filter(|e| e.message.starts_with(START_MARKER))
        .map(|e| e.timestamp)
        .collect();
    debug!(
        function = %function,
        since = %floored,
        raw_events = events.len(),
        attempts = starts.len(),
        "reconstructed attempt timeline"
    );
    Ok(AttemptTimeline::new(starts))
}

/// Floor a timestamp to the log store's native one-second resolution.
pub fn floor_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .unwrap_or(t)
}
