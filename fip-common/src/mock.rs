//! In-memory mock of the remote platform.
//!
//! Implements all four service seams without opening sockets, for tests and
//! the CLI's simulation mode. The simulated retry policy reproduces the
//! empirically observed platform behavior:
//!
//! - Async invocation of a failing handler: three attempts, at roughly
//!   +0 s, +60 s and +180 s from enqueue.
//! - Async invocation with reserved concurrency 0: event received and
//!   immediately dropped; no execution, no log entries, and nothing on the
//!   `Throttles` metric.
//! - Async invocation while the single reserved slot is busy: jittered
//!   exponential backoff (base 1 s, cap 300 s) until the slot frees, with
//!   one `AsyncEventAge` sample per attempt and one `Throttles` count per
//!   failed attempt.
//! - Sync invocation: never retried by the platform, whatever the failure.
//!
//! The store is "settled": attempt log entries are written eagerly with
//! their (possibly future) timestamps, so tests drive the classifier with
//! an explicit elapsed time instead of sleeping.

use crate::errors::{ProbeError, ProbeResult, StoreKind};
use crate::gateway::{EventBus, FunctionGateway, LogStore, MetricStore};
use crate::types::{
    FunctionName, InvocationType, InvokeOutcome, LogEvent, MetricName, MetricSample,
};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// What a registered function does when it runs.
#[derive(Debug, Clone)]
pub enum FunctionBehavior {
    /// Returns the payload after a short run.
    Succeeds { payload: serde_json::Value },
    /// Raises an unhandled exception.
    RaisesException,
    /// Runs past the configured function timeout.
    TimesOut,
    /// Occupies its execution slot for `duration` (virtual time; nothing
    /// actually sleeps), then returns.
    Sleeps { duration: Duration },
}

/// Routing rule on the mock event bus.
#[derive(Debug, Clone)]
struct RoutingRule {
    source: String,
    detail_type: String,
    target: FunctionName,
    /// Rules without publish permission fail silently, surfacing only on
    /// the `FailedInvocations` metric.
    permitted: bool,
}

#[derive(Debug)]
struct FunctionState {
    behavior: FunctionBehavior,
    reserved_concurrency: Option<u32>,
    /// Virtual end of the in-flight execution occupying the reserved slot.
    /// Only meaningful with reserved concurrency 1; the mock does not model
    /// contention at higher caps.
    busy_until: Option<DateTime<Utc>>,
    warm: bool,
}

#[derive(Debug, Clone, Copy)]
struct MetricPoint {
    timestamp: DateTime<Utc>,
    value: f64,
}

#[derive(Debug)]
struct Inner {
    functions: HashMap<FunctionName, FunctionState>,
    logs: HashMap<FunctionName, Vec<LogEvent>>,
    metrics: HashMap<(FunctionName, MetricName), Vec<MetricPoint>>,
    rules: Vec<RoutingRule>,
    rng: fastrand::Rng,
    log_store_down: bool,
    metric_store_down: bool,
    account_concurrency: u32,
    min_unreserved: u32,
    function_timeout: Duration,
}

/// In-memory gateway + log store + metric store + event bus.
///
/// Cheap to clone; clones share state, so one instance can be handed to
/// concurrently spawned invocation tasks.
#[derive(Debug, Clone)]
pub struct MockGateway {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockGateway {
    pub fn builder() -> MockGatewayBuilder {
        MockGatewayBuilder::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a function with the given behavior.
    pub fn register(&self, function: impl Into<FunctionName>, behavior: FunctionBehavior) {
        let function = function.into();
        self.lock().functions.insert(
            function,
            FunctionState {
                behavior,
                reserved_concurrency: None,
                busy_until: None,
                warm: false,
            },
        );
    }

    /// Add an event-routing rule.
    pub fn add_rule(
        &self,
        source: impl Into<String>,
        detail_type: impl Into<String>,
        target: impl Into<FunctionName>,
        permitted: bool,
    ) {
        self.lock().rules.push(RoutingRule {
            source: source.into(),
            detail_type: detail_type.into(),
            target: target.into(),
            permitted,
        });
    }

    /// Simulate a log-store outage (queries fail with `StoreUnavailable`).
    pub fn set_log_store_down(&self, down: bool) {
        self.lock().log_store_down = down;
    }

    /// Simulate a metric-store outage.
    pub fn set_metric_store_down(&self, down: bool) {
        self.lock().metric_store_down = down;
    }

    /// Whether a function is registered, for test assertions.
    pub fn is_registered(&self, function: &FunctionName) -> bool {
        self.lock().functions.contains_key(function)
    }

    /// Current reserved concurrency for a function, for test assertions.
    pub fn reserved_concurrency(&self, function: &FunctionName) -> Option<u32> {
        self.lock()
            .functions
            .get(function)
            .and_then(|f| f.reserved_concurrency)
    }
}

#[derive(Debug, Clone)]
pub struct MockGatewayBuilder {
    seed: u64,
    account_concurrency: u32,
    min_unreserved: u32,
    function_timeout: Duration,
}

impl Default for MockGatewayBuilder {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            account_concurrency: 1000,
            min_unreserved: 100,
            function_timeout: Duration::from_secs(3),
        }
    }
}

impl MockGatewayBuilder {
    /// Seed for the jitter RNG, for reproducible backoff curves.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total account concurrency quota.
    pub fn account_concurrency(mut self, limit: u32) -> Self {
        self.account_concurrency = limit;
        self
    }

    /// Minimum unreserved concurrency the control plane enforces when
    /// reserving capacity for a single function.
    pub fn min_unreserved(mut self, min: u32) -> Self {
        self.min_unreserved = min;
        self
    }

    /// Function timeout applied to `TimesOut` handlers.
    pub fn function_timeout(mut self, timeout: Duration) -> Self {
        self.function_timeout = timeout;
        self
    }

    pub fn build(self) -> MockGateway {
        MockGateway {
            inner: Arc::new(Mutex::new(Inner {
                functions: HashMap::new(),
                logs: HashMap::new(),
                metrics: HashMap::new(),
                rules: Vec::new(),
                rng: fastrand::Rng::with_seed(self.seed),
                log_store_down: false,
                metric_store_down: false,
                account_concurrency: self.account_concurrency,
                min_unreserved: self.min_unreserved,
                function_timeout: self.function_timeout,
            })),
        }
    }
}

/// Outcome of one simulated handler run.
struct RunResult {
    duration: Duration,
    payload: serde_json::Value,
    function_error: Option<String>,
    failed: bool,
}

impl Inner {
    fn invoke(
        &mut self,
        function: &FunctionName,
        invocation_type: InvocationType,
    ) -> ProbeResult<InvokeOutcome> {
        let state = self
            .functions
            .get(function)
            .ok_or_else(|| ProbeError::UnknownFunction(function.clone()))?;
        let reserved = state.reserved_concurrency;
        let busy_until = state.busy_until;
        let now = Utc::now();
        match invocation_type {
            InvocationType::Synchronous => self.invoke_sync(function, now, reserved, busy_until),
            InvocationType::Asynchronous => self.invoke_async(function, now, reserved, busy_until),
        }
    }

    fn invoke_sync(
        &mut self,
        function: &FunctionName,
        now: DateTime<Utc>,
        reserved: Option<u32>,
        busy_until: Option<DateTime<Utc>>,
    ) -> ProbeResult<InvokeOutcome> {
        if reserved == Some(0) {
            // Zero-reserved rejections publish nothing to Throttles.
            return Err(ProbeError::InvokeRejected {
                function: function.clone(),
                reason: "429 TooManyRequests: reserved concurrency is 0".into(),
            });
        }
        if let Some(busy_until) = busy_until
            && reserved.is_some()
            && now < busy_until
        {
            self.record_metric(function, MetricName::Throttles, now, 1.0);
            return Err(ProbeError::InvokeRejected {
                function: function.clone(),
                reason: "429 TooManyRequests: no execution capacity available".into(),
            });
        }

        let run = self.run_handler(function);
        let outcome = self.execute(function, now, &run);
        Ok(outcome)
    }

    fn invoke_async(
        &mut self,
        function: &FunctionName,
        now: DateTime<Utc>,
        reserved: Option<u32>,
        busy_until: Option<DateTime<Utc>>,
    ) -> ProbeResult<InvokeOutcome> {
        self.record_metric(function, MetricName::AsyncEventsReceived, now, 1.0);

        if reserved == Some(0) {
            // Received and immediately dropped; no execution, no retries.
            self.record_metric(function, MetricName::AsyncEventsDropped, now, 1.0);
            return Ok(accepted());
        }

        let busy_until = busy_until.filter(|b| reserved.is_some() && now < *b);
        if let Some(busy_until) = busy_until {
            self.backoff_until_free(function, now, busy_until);
            return Ok(accepted());
        }

        // First attempt immediately; failing handlers get two platform
        // retries at roughly one and a further two minutes.
        let run = self.run_handler(function);
        let first_age = Duration::from_millis(self.rng.u64(30..400));
        self.record_metric(
            function,
            MetricName::AsyncEventAge,
            now,
            first_age.as_millis() as f64,
        );
        self.execute(function, now + to_chrono(first_age), &run);

        if run.failed {
            for base_secs in [60u64, 180] {
                let skew = Duration::from_millis(self.rng.u64(200..3000));
                let at = now + to_chrono(Duration::from_secs(base_secs) + skew);
                let run = self.run_handler(function);
                self.record_metric(
                    function,
                    MetricName::AsyncEventAge,
                    at,
                    (at - now).num_milliseconds() as f64,
                );
                self.execute(function, at, &run);
            }
        }
        Ok(accepted())
    }

    /// Jittered exponential backoff while the reserved slot is occupied:
    /// Throttles and AsyncEventAge per failed attempt, then one successful
    /// start once the slot frees.
    fn backoff_until_free(
        &mut self,
        function: &FunctionName,
        enqueued: DateTime<Utc>,
        busy_until: DateTime<Utc>,
    ) {
        let mut at = enqueued + to_chrono(Duration::from_millis(self.rng.u64(20..80)));
        let mut delay = Duration::from_secs(1);
        let cap = Duration::from_secs(300);

        while at < busy_until {
            self.record_metric(function, MetricName::Throttles, at, 1.0);
            self.record_metric(
                function,
                MetricName::AsyncEventAge,
                at,
                (at - enqueued).num_milliseconds() as f64,
            );
            let jitter = 0.5 + self.rng.f64();
            at += to_chrono(delay.mul_f64(jitter));
            delay = (delay * 2).min(cap);
        }

        self.record_metric(
            function,
            MetricName::AsyncEventAge,
            at,
            (at - enqueued).num_milliseconds() as f64,
        );
        let run = self.run_handler(function);
        self.execute(function, at, &run);
        debug!(
            function = %function,
            succeeded_at = %at,
            "mock backoff drained after slot freed"
        );
    }

    fn run_handler(&mut self, function: &FunctionName) -> RunResult {
        let behavior = self
            .functions
            .get(function)
            .map(|s| s.behavior.clone())
            .unwrap_or(FunctionBehavior::RaisesException);
        match &behavior {
            FunctionBehavior::Succeeds { payload } => RunResult {
                duration: Duration::from_millis(self.rng.u64(20..200)),
                payload: payload.clone(),
                function_error: None,
                failed: false,
            },
            FunctionBehavior::RaisesException => RunResult {
                duration: Duration::from_millis(self.rng.u64(20..200)),
                payload: json!({
                    "errorMessage": "something went wrong",
                    "errorType": "Exception",
                    "stackTrace": ["handler"],
                }),
                function_error: Some("Unhandled".into()),
                failed: true,
            },
            FunctionBehavior::TimesOut => {
                let timeout = self.function_timeout;
                RunResult {
                    duration: timeout,
                    payload: json!({
                        "errorMessage": format!(
                            "Task timed out after {:.2} seconds",
                            timeout.as_secs_f64()
                        ),
                        "errorType": "TimeoutError",
                    }),
                    function_error: Some("Unhandled".into()),
                    failed: true,
                }
            }
            FunctionBehavior::Sleeps { duration } => RunResult {
                duration: *duration,
                payload: serde_json::Value::Null,
                function_error: None,
                failed: false,
            },
        }
    }

    /// Write the log lines for one execution starting at `start` and mark
    /// the slot busy for its duration.
    fn execute(
        &mut self,
        function: &FunctionName,
        start: DateTime<Utc>,
        run: &RunResult,
    ) -> InvokeOutcome {
        let request_id = Uuid::new_v4();
        // Existence was validated by invoke(); fall back to warm if racing
        // with a deregistration.
        let cold = match self.functions.get_mut(function) {
            Some(state) => {
                let cold = !state.warm;
                state.warm = true;
                state.busy_until = Some(start + to_chrono(run.duration));
                cold
            }
            None => false,
        };

        let init_ms = if cold { self.rng.u64(300..900) } else { 0 };
        let duration_ms = run.duration.as_millis() as u64;
        // Init time is billed since the 2025 billing change.
        let billed_ms = duration_ms + init_ms;

        let log = self.logs.entry(function.clone()).or_default();
        if cold {
            log.push(LogEvent {
                timestamp: start,
                message: "INIT_START Runtime Version: provider:run.v1".into(),
            });
        }
        log.push(LogEvent {
            timestamp: start,
            message: format!("START RequestId: {request_id} Version: $LATEST"),
        });
        let end = start + to_chrono(run.duration);
        log.push(LogEvent {
            timestamp: end,
            message: format!("END RequestId: {request_id}"),
        });
        let mut report =
            format!("REPORT RequestId: {request_id} Duration: {duration_ms} ms Billed Duration: {billed_ms} ms");
        if cold {
            report.push_str(&format!(" Init Duration: {init_ms} ms"));
        }
        log.push(LogEvent {
            timestamp: end,
            message: report,
        });

        InvokeOutcome {
            request_id,
            status_code: 200,
            payload: run.payload.clone(),
            function_error: run.function_error.clone(),
            cold_start: cold,
        }
    }

    fn record_metric(
        &mut self,
        function: &FunctionName,
        metric: MetricName,
        timestamp: DateTime<Utc>,
        value: f64,
    ) {
        self.metrics
            .entry((function.clone(), metric))
            .or_default()
            .push(MetricPoint { timestamp, value });
    }

    fn set_reserved_concurrency(
        &mut self,
        function: &FunctionName,
        limit: Option<u32>,
    ) -> ProbeResult<()> {
        if let Some(limit) = limit
            && limit > 0
            && self.account_concurrency.saturating_sub(limit) < self.min_unreserved
        {
            // Mirrors the control plane's InvalidParameterValue guard:
            // reserving is allowed at 0, or when the leftover account
            // concurrency stays above the minimum.
            return Err(ProbeError::PreconditionFailed {
                function: function.clone(),
                reason: format!(
                    "reserving {limit} would reduce unreserved concurrency below the minimum of {}",
                    self.min_unreserved
                ),
            });
        }
        let state = self
            .functions
            .get_mut(function)
            .ok_or_else(|| ProbeError::UnknownFunction(function.clone()))?;
        state.reserved_concurrency = limit;
        Ok(())
    }
}

fn accepted() -> InvokeOutcome {
    InvokeOutcome {
        request_id: Uuid::new_v4(),
        status_code: 202,
        payload: serde_json::Value::Null,
        function_error: None,
        cold_start: false,
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::milliseconds(d.as_millis() as i64)
}

impl FunctionGateway for MockGateway {
    async fn invoke(
        &self,
        function: &FunctionName,
        invocation_type: InvocationType,
    ) -> ProbeResult<InvokeOutcome> {
        self.lock().invoke(function, invocation_type)
    }

    async fn set_reserved_concurrency(
        &self,
        function: &FunctionName,
        limit: Option<u32>,
    ) -> ProbeResult<()> {
        self.lock().set_reserved_concurrency(function, limit)
    }
}

impl LogStore for MockGateway {
    async fn filter_events(
        &self,
        function: &FunctionName,
        start_time: DateTime<Utc>,
    ) -> ProbeResult<Vec<LogEvent>> {
        let inner = self.lock();
        if inner.log_store_down {
            return Err(ProbeError::StoreUnavailable {
                store: StoreKind::Log,
                reason: "simulated outage".into(),
            });
        }
        let mut events: Vec<LogEvent> = inner
            .logs
            .get(function)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.timestamp >= start_time)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

impl MetricStore for MockGateway {
    async fn metric_statistics(
        &self,
        function: &FunctionName,
        metric: MetricName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: Duration,
    ) -> ProbeResult<Vec<MetricSample>> {
        let inner = self.lock();
        if inner.metric_store_down {
            return Err(ProbeError::StoreUnavailable {
                store: StoreKind::Metric,
                reason: "simulated outage".into(),
            });
        }
        let period_secs = period.as_secs().max(1) as i64;
        let mut buckets: HashMap<i64, Vec<f64>> = HashMap::new();
        if let Some(points) = inner.metrics.get(&(function.clone(), metric)) {
            for point in points {
                if point.timestamp < start || point.timestamp >= end {
                    continue;
                }
                let ts = point.timestamp.timestamp();
                let bucket = ts - ts.rem_euclid(period_secs);
                buckets.entry(bucket).or_default().push(point.value);
            }
        }

        let mut samples: Vec<MetricSample> = buckets
            .into_iter()
            .map(|(bucket, values)| {
                let sum: f64 = values.iter().sum();
                let minimum = values.iter().copied().fold(f64::INFINITY, f64::min);
                let maximum = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                MetricSample {
                    metric,
                    period_start: Utc.timestamp_opt(bucket, 0).unwrap(),
                    sample_count: values.len() as u64,
                    sum,
                    minimum,
                    maximum,
                    average: sum / values.len() as f64,
                }
            })
            .collect();
        samples.sort_by_key(|s| s.period_start);
        Ok(samples)
    }
}

impl EventBus for MockGateway {
    async fn put_event(
        &self,
        source: &str,
        detail_type: &str,
        detail: serde_json::Value,
    ) -> ProbeResult<()> {
        let _ = detail;
        let mut inner = self.lock();
        let matches: Vec<(FunctionName, bool)> = inner
            .rules
            .iter()
            .filter(|r| r.source == source && r.detail_type == detail_type)
            .map(|r| (r.target.clone(), r.permitted))
            .collect();
        for (target, permitted) in matches {
            if permitted {
                inner.invoke(&target, InvocationType::Asynchronous)?;
            } else {
                // Publish denied: the event vanishes, only the rule's
                // failure metric records it.
                let now = Utc::now();
                inner.record_metric(&target, MetricName::FailedInvocations, now, 1.0);
            }
        }
        Ok(())
    }
}
