//! Core entities shared across the probe.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a target function on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionName(pub String);

impl FunctionName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FunctionName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// How a function is invoked.
///
/// Synchronous invocations block until the remote side responds; the
/// platform never retries them. Asynchronous invocations only return an
/// acknowledgment; the platform enqueues the event and retries per its own
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationType {
    Synchronous,
    Asynchronous,
}

impl std::fmt::Display for InvocationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synchronous => write!(f, "synchronous"),
            Self::Asynchronous => write!(f, "asynchronous"),
        }
    }
}

/// Record of one invocation made by the scenario driver.
///
/// Created at call time, immutable, and scoped to a single scenario run.
/// All timeline offsets are measured from `call_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub function: FunctionName,
    pub call_time: DateTime<Utc>,
    pub invocation_type: InvocationType,
}

impl InvocationRecord {
    /// Record an invocation happening now.
    pub fn now(function: FunctionName, invocation_type: InvocationType) -> Self {
        Self {
            function,
            call_time: Utc::now(),
            invocation_type,
        }
    }
}

/// Response captured from the gateway for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeOutcome {
    pub request_id: Uuid,
    /// Platform status code: 200 for synchronous, 202 for accepted async.
    pub status_code: u16,
    /// Decoded response payload. For failed handlers this is the structured
    /// error document, not a harness error.
    pub payload: serde_json::Value,
    /// Set when the handler failed (exception or timeout); the invocation
    /// itself still succeeded at the platform level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_error: Option<String>,
    /// Whether a fresh execution environment was initialized for this call.
    pub cold_start: bool,
}

/// One raw entry from the remote log store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Metric names the probe knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    /// Rejected invocations due to no available execution capacity.
    Throttles,
    /// Events accepted into the platform's internal async queue. Counted
    /// once per event regardless of retries.
    AsyncEventsReceived,
    /// Events dropped from the async queue without ever executing.
    AsyncEventsDropped,
    /// Age of an event at each invocation attempt. Emitted once per
    /// attempt, so its sample count exposes the retry count.
    AsyncEventAge,
    /// Event-routing rule invocations that failed (e.g. missing publish
    /// permission on the target).
    FailedInvocations,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Throttles => "Throttles",
            Self::AsyncEventsReceived => "AsyncEventsReceived",
            Self::AsyncEventsDropped => "AsyncEventsDropped",
            Self::AsyncEventAge => "AsyncEventAge",
            Self::FailedInvocations => "FailedInvocations",
        }
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One aggregated metric datapoint for a fixed-width period.
///
/// Only periods with at least one contributing datapoint exist. Absence of
/// a period means zero observations in it, which is distinct from a
/// datapoint of value zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric: MetricName,
    pub period_start: DateTime<Utc>,
    pub sample_count: u64,
    pub sum: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub average: f64,
}

/// Chronologically ordered invocation-start timestamps for one function.
///
/// Derived from the log store, read-only, and rebuilt fresh on every query:
/// the store is eventually consistent and a later query may return more
/// entries, so caching a timeline would freeze a partial view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptTimeline {
    entries: Vec<DateTime<Utc>>,
}

impl AttemptTimeline {
    /// Build a timeline from raw timestamps. Sorts ascending.
    pub fn new(mut entries: Vec<DateTime<Utc>>) -> Self {
        entries.sort_unstable();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DateTime<Utc>] {
        &self.entries
    }

    /// Offsets of each attempt from `call_time`, in seconds.
    ///
    /// Negative offsets are possible if the store returns an entry from
    /// before the call; the classifier treats those as violations rather
    /// than silently dropping them.
    pub fn offsets_from(&self, call_time: DateTime<Utc>) -> Vec<f64> {
        self.entries
            .iter()
            .map(|t| signed_seconds(*t - call_time))
            .collect()
    }
}

fn signed_seconds(d: ChronoDuration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}
