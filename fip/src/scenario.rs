//! Scenario Driver.
//!
//! Runs one named fault condition end to end: apply the precondition,
//! invoke, let retries manifest, pull observations, classify, report.
//!
//! Per scenario the steps are strictly sequential:
//!
//! ```text
//! Idle -> PreconditionApplied -> Invoked -> Waiting -> Observed
//!      -> Classified(Confirmed | Violated | Premature)
//! ```
//!
//! `Classified(Premature)` is not terminal: the scenario can be re-observed
//! later with [`ScenarioDriver::re_observe`] without re-invoking.
//!
//! Preconditions mutate remote per-function state (the concurrency cap)
//! that is shared by every scenario targeting that function. The driver
//! restores the cap unconditionally after each run; scenarios sharing a
//! function must additionally be run sequentially, since the remote side
//! offers no locking primitive. Scenarios against different functions are
//! independent and may run concurrently.

use crate::classify::{Observation, classify};
use crate::metrics::{attempt_count, sample};
use crate::report::ScenarioReport;
use crate::timeline::read_timeline;
use chrono::{Duration as ChronoDuration, Utc};
use fip_common::config::HarnessConfig;
use fip_common::errors::{ProbeError, ProbeResult};
use fip_common::gateway::{EventBus, FunctionGateway, LogStore, MetricStore};
use fip_common::shape::{ExpectedShape, Verdict};
use fip_common::types::{
    FunctionName, InvocationRecord, InvocationType, InvokeOutcome, MetricName,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the scenario triggers the target function.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokePlan {
    /// One invocation.
    Single,
    /// Two invocations issued from two concurrently running tasks, joined
    /// before proceeding. Required for synchronous contention: a blocking
    /// call does not return until the remote side finishes, so sequential
    /// issuance can never produce overlapping in-flight requests.
    ConcurrentPair,
    /// Publish an event on the bus instead of invoking directly.
    PutEvent { source: String, detail_type: String },
}

/// Which observation feeds the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationSource {
    /// Attempt timeline from the log store.
    Logs,
    /// Attempt count derived from a metric.
    Metric(MetricName),
}

/// Lifecycle of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Idle,
    PreconditionApplied,
    Invoked,
    Waiting,
    Observed,
    Classified(Verdict),
}

/// Declarative description of one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    pub function: FunctionName,
    pub invocation_type: InvocationType,
    /// Reserved-concurrency cap to apply before invoking, if any.
    pub reserved_concurrency: Option<u32>,
    pub invoke_plan: InvokePlan,
    /// How long to let asynchronous retries manifest before observing.
    pub settle: Duration,
    pub shape: ExpectedShape,
    pub observe: ObservationSource,
    /// `Some(n)`: synchronous rejections are captured as data and exactly
    /// `n` must occur. `None`: any rejection is a harness failure.
    pub expected_rejections: Option<u64>,
}

/// Drives scenarios against one gateway (and its log/metric/event seams).
#[derive(Debug, Clone)]
pub struct ScenarioDriver<G> {
    gateway: G,
    config: HarnessConfig,
}

impl<G> ScenarioDriver<G>
where
    G: FunctionGateway + LogStore + MetricStore + EventBus + Clone + Send + Sync + 'static,
{
    pub fn new(gateway: G, config: HarnessConfig) -> Self {
        Self { gateway, config }
    }

    /// Run a scenario, sleeping for its settle delay before observing.
    pub async fn run(&self, spec: &ScenarioSpec) -> ProbeResult<ScenarioReport> {
        self.run_inner(spec, None).await
    }

    /// Run a scenario but classify as if `elapsed` had passed since the
    /// call, without sleeping. Used when the wait has already happened
    /// elsewhere, and by tests driving a settled mock store.
    pub async fn run_with_elapsed(
        &self,
        spec: &ScenarioSpec,
        elapsed: Duration,
    ) -> ProbeResult<ScenarioReport> {
        self.run_inner(spec, Some(elapsed)).await
    }

    /// Re-observe a previously Premature scenario without re-invoking.
    ///
    /// The invoke phase already happened; the prior report carries its raw
    /// observations (call time, captured rejections, gateway outcomes), and
    /// those must survive into the re-observed report unchanged — only the
    /// store reads and the classification are redone.
    pub async fn re_observe(
        &self,
        spec: &ScenarioSpec,
        prior: &ScenarioReport,
        elapsed: Duration,
    ) -> ProbeResult<ScenarioReport> {
        self.observe_and_classify(
            spec,
            prior.record.clone(),
            prior.rejections,
            prior.outcomes.clone(),
            elapsed,
        )
        .await
    }

    async fn run_inner(
        &self,
        spec: &ScenarioSpec,
        elapsed_override: Option<Duration>,
    ) -> ProbeResult<ScenarioReport> {
        debug!(scenario = %spec.name, state = ?ScenarioState::Idle, "starting");
        if let Some(limit) = spec.reserved_concurrency {
            self.gateway
                .set_reserved_concurrency(&spec.function, Some(limit))
                .await?;
            info!(
                scenario = %spec.name,
                function = %spec.function,
                limit,
                state = ?ScenarioState::PreconditionApplied,
                "precondition applied: reserved concurrency"
            );
        }

        let result = self.drive(spec, elapsed_override).await;

        // Restore unconditionally so a failure here cannot leak a zero cap
        // into the next scenario against this function.
        if spec.reserved_concurrency.is_some()
            && let Err(err) = self
                .gateway
                .set_reserved_concurrency(&spec.function, None)
                .await
        {
            warn!(
                scenario = %spec.name,
                function = %spec.function,
                error = %err,
                "failed to restore reserved concurrency"
            );
        }

        result
    }

    async fn drive(
        &self,
        spec: &ScenarioSpec,
        elapsed_override: Option<Duration>,
    ) -> ProbeResult<ScenarioReport> {
        let (record, rejections, outcomes) = self.invoke_phase(spec).await?;
        debug!(scenario = %spec.name, state = ?ScenarioState::Invoked, "invoke phase done");

        let elapsed = match elapsed_override {
            Some(elapsed) => elapsed,
            None => {
                debug!(scenario = %spec.name, state = ?ScenarioState::Waiting, settle_secs = spec.settle.as_secs(), "settling");
                tokio::time::sleep(spec.settle).await;
                (Utc::now() - record.call_time)
                    .to_std()
                    .unwrap_or_default()
            }
        };

        self.observe_and_classify(spec, record, rejections, outcomes, elapsed)
            .await
    }

    async fn invoke_phase(
        &self,
        spec: &ScenarioSpec,
    ) -> ProbeResult<(InvocationRecord, u64, Vec<InvokeOutcome>)> {
        match &spec.invoke_plan {
            InvokePlan::Single => {
                let record = InvocationRecord::now(spec.function.clone(), spec.invocation_type);
                match self.gateway.invoke(&spec.function, spec.invocation_type).await {
                    Ok(outcome) => Ok((record, 0, vec![outcome])),
                    Err(err) if err.is_rejection() && spec.expected_rejections.is_some() => {
                        info!(scenario = %spec.name, error = %err, "captured expected rejection");
                        Ok((record, 1, Vec::new()))
                    }
                    Err(err) => Err(err),
                }
            }
            InvokePlan::ConcurrentPair => {
                let record = InvocationRecord::now(spec.function.clone(), spec.invocation_type);
                let mut handles = Vec::with_capacity(2);
                for _ in 0..2 {
                    let gateway = self.gateway.clone();
                    let function = spec.function.clone();
                    let invocation_type = spec.invocation_type;
                    handles.push(tokio::spawn(async move {
                        gateway.invoke(&function, invocation_type).await
                    }));
                }

                let mut rejections = 0;
                let mut outcomes = Vec::new();
                for handle in handles {
                    let result = handle
                        .await
                        .map_err(|e| ProbeError::Internal(format!("invoke task failed: {e}")))?;
                    match result {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(err) if err.is_rejection() => rejections += 1,
                        Err(err) => return Err(err),
                    }
                }
                Ok((record, rejections, outcomes))
            }
            InvokePlan::PutEvent { source, detail_type } => {
                let record =
                    InvocationRecord::now(spec.function.clone(), InvocationType::Asynchronous);
                self.gateway
                    .put_event(source, detail_type, serde_json::json!({}))
                    .await?;
                Ok((record, 0, Vec::new()))
            }
        }
    }

    async fn observe_and_classify(
        &self,
        spec: &ScenarioSpec,
        record: InvocationRecord,
        rejections: u64,
        outcomes: Vec<InvokeOutcome>,
        elapsed: Duration,
    ) -> ProbeResult<ScenarioReport> {
        // The timeline is always pulled so the report can show the raw
        // attempts even when classification runs off a metric.
        let timeline = read_timeline(
            &self.gateway,
            &spec.function,
            record.call_time,
            self.config.store_call_timeout,
        )
        .await?;

        let window_end = record.call_time
            + ChronoDuration::milliseconds(elapsed.as_millis() as i64)
            + ChronoDuration::seconds(60);
        let samples = match spec.observe {
            ObservationSource::Logs => Vec::new(),
            ObservationSource::Metric(metric) => {
                sample(
                    &self.gateway,
                    &spec.function,
                    metric,
                    record.call_time - ChronoDuration::seconds(60),
                    window_end,
                    self.config.effective_metric_period(),
                    self.config.store_call_timeout,
                )
                .await?
            }
        };

        let offsets = timeline.offsets_from(record.call_time);
        // Raw observations are logged before any verdict so the
        // classification can be audited independently.
        debug!(scenario = %spec.name, state = ?ScenarioState::Observed, "observation pulled");
        info!(
            scenario = %spec.name,
            call_time = %record.call_time,
            elapsed_secs = elapsed.as_secs_f64(),
            rejections,
            attempts = ?offsets,
            samples = samples.len(),
            "raw observations"
        );

        let verdict = if let Some(expected) = spec.expected_rejections
            && rejections != expected
        {
            Verdict::Violated {
                reason: format!("observed {rejections} rejections, expected exactly {expected}"),
            }
        } else {
            let observation = match spec.observe {
                ObservationSource::Logs => Observation::Timeline(&timeline),
                ObservationSource::Metric(metric) => {
                    Observation::Count(attempt_count(metric, &samples))
                }
            };
            classify(&record, &spec.shape, observation, elapsed)
        };

        info!(
            scenario = %spec.name,
            verdict = %verdict,
            state = ?ScenarioState::Classified(verdict.clone()),
            "classified"
        );

        Ok(ScenarioReport {
            scenario: spec.name.clone(),
            record,
            elapsed_secs: elapsed.as_secs_f64(),
            rejections,
            outcomes,
            timeline_offsets: offsets,
            samples,
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fip_common::mock::{FunctionBehavior, MockGateway};
    use serde_json::json;

    const OBSERVED_LATE: Duration = Duration::from_secs(360);

    fn driver() -> (MockGateway, ScenarioDriver<MockGateway>) {
        let gw = MockGateway::builder().seed(11).build();
        (gw.clone(), ScenarioDriver::new(gw, HarnessConfig::default()))
    }

    fn single_sync(name: &str, function: &str) -> ScenarioSpec {
        ScenarioSpec {
            name: name.into(),
            function: function.into(),
            invocation_type: InvocationType::Synchronous,
            reserved_concurrency: None,
            invoke_plan: InvokePlan::Single,
            settle: Duration::ZERO,
            shape: ExpectedShape::offsets_secs([0], 15),
            observe: ObservationSource::Logs,
            expected_rejections: None,
        }
    }

    #[tokio::test]
    async fn test_single_sync_invocation_confirmed_one_attempt() {
        let (gw, driver) = driver();
        gw.register("sync_handler_raises_exception", FunctionBehavior::RaisesException);

        let spec = single_sync("sync-exception", "sync_handler_raises_exception");
        let report = driver.run_with_elapsed(&spec, OBSERVED_LATE).await.unwrap();
        assert!(report.verdict.is_confirmed());
        assert_eq!(report.timeline_offsets.len(), 1);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(
            report.outcomes[0].function_error.as_deref(),
            Some("Unhandled")
        );
    }

    #[tokio::test]
    async fn test_unexpected_rejection_propagates() {
        let (gw, driver) = driver();
        gw.register("stuck", FunctionBehavior::Succeeds { payload: json!(null) });
        let name = FunctionName::from("stuck");
        gw.set_reserved_concurrency(&name, Some(0)).await.unwrap();

        let spec = single_sync("no-rejection-expected", "stuck");
        let err = driver.run_with_elapsed(&spec, OBSERVED_LATE).await.unwrap_err();
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn test_precondition_restored_after_run() {
        let (gw, driver) = driver();
        gw.register("sync_throttled", FunctionBehavior::Succeeds { payload: json!(null) });
        let name = FunctionName::from("sync_throttled");

        let spec = ScenarioSpec {
            reserved_concurrency: Some(0),
            shape: ExpectedShape::no_attempts(Duration::from_secs(60)),
            expected_rejections: Some(1),
            ..single_sync("sync-throttle", "sync_throttled")
        };
        let report = driver.run_with_elapsed(&spec, OBSERVED_LATE).await.unwrap();
        assert!(report.verdict.is_confirmed());
        assert_eq!(report.rejections, 1);
        assert!(gw.reserved_concurrency(&name).is_none());
    }

    #[tokio::test]
    async fn test_precondition_restored_even_when_invoke_fails() {
        let (gw, driver) = driver();
        gw.register("flaky", FunctionBehavior::Succeeds { payload: json!(null) });
        let name = FunctionName::from("flaky");
        // Force a failure in the observe phase.
        gw.set_log_store_down(true);

        let spec = ScenarioSpec {
            reserved_concurrency: Some(0),
            expected_rejections: Some(1),
            ..single_sync("store-down", "flaky")
        };
        let err = driver.run_with_elapsed(&spec, OBSERVED_LATE).await.unwrap_err();
        assert!(matches!(err, ProbeError::StoreUnavailable { .. }));
        assert!(gw.reserved_concurrency(&name).is_none());
    }

    #[tokio::test]
    async fn test_rejection_count_mismatch_is_violated() {
        let (gw, driver) = driver();
        gw.register("healthy", FunctionBehavior::Succeeds { payload: json!(null) });

        // Expecting one rejection from a healthy function: violation.
        let spec = ScenarioSpec {
            expected_rejections: Some(1),
            ..single_sync("expects-rejection", "healthy")
        };
        let report = driver.run_with_elapsed(&spec, OBSERVED_LATE).await.unwrap();
        match &report.verdict {
            Verdict::Violated { reason } => assert!(reason.contains("rejections"), "{reason}"),
            other => panic!("expected Violated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_premature_then_re_observe_confirms() {
        let (gw, driver) = driver();
        gw.register("async_handler_raises_exception", FunctionBehavior::RaisesException);

        let spec = ScenarioSpec {
            invocation_type: InvocationType::Asynchronous,
            shape: ExpectedShape::offsets_secs([0, 60, 180], 15),
            ..single_sync("async-exception", "async_handler_raises_exception")
        };

        // Observed only 30s after the call: inconclusive.
        let early = driver
            .run_with_elapsed(&spec, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(early.verdict.is_premature());

        // Re-observe later without re-invoking: all three attempts now in
        // the window and the shape confirms.
        let late = driver.re_observe(&spec, &early, OBSERVED_LATE).await.unwrap();
        assert!(late.verdict.is_confirmed(), "verdict: {:?}", late.verdict);
        assert_eq!(late.timeline_offsets.len(), 3);
    }

    #[tokio::test]
    async fn test_re_observe_keeps_captured_rejections_and_outcomes() {
        let (gw, driver) = driver();
        gw.register("sync_throttled", FunctionBehavior::Succeeds { payload: json!(null) });

        // A rejection-expecting scenario observed before its shape could
        // manifest: the rejection is already captured, the verdict is only
        // Premature.
        let spec = ScenarioSpec {
            reserved_concurrency: Some(0),
            shape: ExpectedShape::no_attempts(Duration::from_secs(60)),
            expected_rejections: Some(1),
            ..single_sync("sync-throttle", "sync_throttled")
        };
        let early = driver
            .run_with_elapsed(&spec, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(early.verdict.is_premature(), "verdict: {:?}", early.verdict);
        assert_eq!(early.rejections, 1);

        // Re-observation must carry the invoke phase's raw observations
        // forward, so the rejection count still satisfies the expectation.
        let late = driver.re_observe(&spec, &early, OBSERVED_LATE).await.unwrap();
        assert!(late.verdict.is_confirmed(), "verdict: {:?}", late.verdict);
        assert_eq!(late.rejections, 1);
        assert_eq!(late.outcomes.len(), early.outcomes.len());
    }

    #[tokio::test]
    async fn test_concurrent_pair_produces_one_rejection_under_contention() {
        let (gw, driver) = driver();
        gw.register(
            "sync_throttled",
            FunctionBehavior::Sleeps { duration: Duration::from_secs(60) },
        );

        let spec = ScenarioSpec {
            reserved_concurrency: Some(1),
            invoke_plan: InvokePlan::ConcurrentPair,
            observe: ObservationSource::Metric(MetricName::Throttles),
            shape: ExpectedShape::min_count(1, Duration::from_secs(60)),
            expected_rejections: Some(1),
            ..single_sync("sync-contention", "sync_throttled")
        };
        let report = driver.run_with_elapsed(&spec, OBSERVED_LATE).await.unwrap();
        assert!(report.verdict.is_confirmed(), "verdict: {:?}", report.verdict);
        assert_eq!(report.rejections, 1);
        assert_eq!(report.outcomes.len(), 1);
    }
}
