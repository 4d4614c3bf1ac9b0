//! Canned scenario suite.
//!
//! One entry per empirically interesting fault condition. The expected
//! shapes encode the platform's observed retry policy: three async attempts
//! at +0/+60/+180 s for failing handlers, no retries at all for synchronous
//! calls, silent drops at reserved concurrency zero, and jittered backoff
//! under contention (asserted only as a minimum count, since the backoff
//! curve is provider-internal and must not be hard-coded).

use crate::scenario::{InvokePlan, ObservationSource, ScenarioSpec};
use fip_common::config::HarnessConfig;
use fip_common::mock::{FunctionBehavior, MockGateway};
use fip_common::shape::ExpectedShape;
use fip_common::types::{InvocationType, MetricName};
use serde_json::json;
use std::time::Duration;

/// Offsets of the three async attempts against a failing handler.
pub const ASYNC_RETRY_OFFSETS: [u64; 3] = [0, 60, 180];

/// Settle wait for scenarios that assert the absence of retries.
const SHORT_SETTLE: Duration = Duration::from_secs(60);

/// Event-bus routing used by the `event-routing` scenario.
pub const EVENT_SOURCE: &str = "fip.probe";
pub const EVENT_DETAIL_TYPE: &str = "probe-ping";

/// The full suite with default tolerance and settle waits.
pub fn suite() -> Vec<ScenarioSpec> {
    suite_for(&HarnessConfig::default())
}

/// The full suite, in a stable order. The configured tolerance applies to
/// every fixed-offset shape; the configured settle wait to every scenario
/// whose shape spans the full retry window.
pub fn suite_for(config: &HarnessConfig) -> Vec<ScenarioSpec> {
    let tolerance = config.default_tolerance;
    let retry_settle = config.settle_wait;
    let async_retry_shape = ExpectedShape::offsets(
        ASYNC_RETRY_OFFSETS.map(Duration::from_secs),
        tolerance,
    );
    let single_attempt_shape = ExpectedShape::offsets([Duration::ZERO], tolerance);
    vec![
        ScenarioSpec {
            name: "async-exception".into(),
            function: "async_handler_raises_exception".into(),
            invocation_type: InvocationType::Asynchronous,
            reserved_concurrency: None,
            invoke_plan: InvokePlan::Single,
            settle: retry_settle,
            shape: async_retry_shape.clone(),
            observe: ObservationSource::Logs,
            expected_rejections: None,
        },
        ScenarioSpec {
            name: "async-timeout".into(),
            function: "async_invocation_times_out".into(),
            invocation_type: InvocationType::Asynchronous,
            reserved_concurrency: None,
            invoke_plan: InvokePlan::Single,
            settle: retry_settle,
            shape: async_retry_shape.clone(),
            observe: ObservationSource::Logs,
            expected_rejections: None,
        },
        ScenarioSpec {
            name: "async-drop".into(),
            function: "async_throttled".into(),
            invocation_type: InvocationType::Asynchronous,
            reserved_concurrency: Some(0),
            invoke_plan: InvokePlan::Single,
            settle: SHORT_SETTLE,
            // The event is received and dropped without a single execution;
            // the drop counter is the observable, not the (empty) timeline.
            shape: ExpectedShape::min_count(1, SHORT_SETTLE),
            observe: ObservationSource::Metric(MetricName::AsyncEventsDropped),
            expected_rejections: None,
        },
        ScenarioSpec {
            name: "sync-exception".into(),
            function: "sync_handler_raises_exception".into(),
            invocation_type: InvocationType::Synchronous,
            reserved_concurrency: None,
            invoke_plan: InvokePlan::Single,
            settle: SHORT_SETTLE,
            shape: single_attempt_shape.clone(),
            observe: ObservationSource::Logs,
            expected_rejections: None,
        },
        ScenarioSpec {
            name: "sync-timeout".into(),
            function: "sync_invocation_times_out".into(),
            invocation_type: InvocationType::Synchronous,
            reserved_concurrency: None,
            invoke_plan: InvokePlan::Single,
            settle: SHORT_SETTLE,
            shape: single_attempt_shape.clone(),
            observe: ObservationSource::Logs,
            expected_rejections: None,
        },
        ScenarioSpec {
            name: "sync-throttle".into(),
            function: "sync_throttled".into(),
            invocation_type: InvocationType::Synchronous,
            reserved_concurrency: Some(0),
            invoke_plan: InvokePlan::Single,
            settle: SHORT_SETTLE,
            shape: ExpectedShape::no_attempts(SHORT_SETTLE),
            observe: ObservationSource::Logs,
            expected_rejections: Some(1),
        },
        ScenarioSpec {
            name: "sync-contention".into(),
            function: "sync_throttled".into(),
            invocation_type: InvocationType::Synchronous,
            reserved_concurrency: Some(1),
            invoke_plan: InvokePlan::ConcurrentPair,
            settle: SHORT_SETTLE,
            shape: ExpectedShape::min_count(1, SHORT_SETTLE),
            observe: ObservationSource::Metric(MetricName::Throttles),
            expected_rejections: Some(1),
        },
        ScenarioSpec {
            name: "async-contention".into(),
            function: "async_throttled".into(),
            invocation_type: InvocationType::Asynchronous,
            reserved_concurrency: Some(1),
            invoke_plan: InvokePlan::ConcurrentPair,
            settle: retry_settle,
            shape: ExpectedShape::min_count(3, retry_settle),
            observe: ObservationSource::Metric(MetricName::AsyncEventAge),
            expected_rejections: None,
        },
        ScenarioSpec {
            name: "event-routing".into(),
            function: "noop".into(),
            invocation_type: InvocationType::Asynchronous,
            reserved_concurrency: None,
            invoke_plan: InvokePlan::PutEvent {
                source: EVENT_SOURCE.into(),
                detail_type: EVENT_DETAIL_TYPE.into(),
            },
            settle: SHORT_SETTLE,
            shape: single_attempt_shape.clone(),
            observe: ObservationSource::Logs,
            expected_rejections: None,
        },
    ]
}

/// Look up one suite entry by name.
pub fn by_name(name: &str) -> Option<ScenarioSpec> {
    suite().into_iter().find(|s| s.name == name)
}

/// Register every function (and the routing rule) the suite targets.
pub fn provision(gateway: &MockGateway) {
    gateway.register("async_handler_raises_exception", FunctionBehavior::RaisesException);
    gateway.register("sync_handler_raises_exception", FunctionBehavior::RaisesException);
    gateway.register("async_invocation_times_out", FunctionBehavior::TimesOut);
    gateway.register("sync_invocation_times_out", FunctionBehavior::TimesOut);
    gateway.register(
        "async_throttled",
        FunctionBehavior::Sleeps { duration: Duration::from_secs(60) },
    );
    gateway.register(
        "sync_throttled",
        FunctionBehavior::Sleeps { duration: Duration::from_secs(60) },
    );
    gateway.register("noop", FunctionBehavior::Succeeds { payload: json!({"ok": true}) });
    gateway.add_rule(EVENT_SOURCE, EVENT_DETAIL_TYPE, "noop", true);
}
