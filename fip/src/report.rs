//! Human-readable scenario reports.
//!
//! Every report carries the raw call time and the raw observed
//! timeline/metric samples alongside the verdict, so a human can audit the
//! classifier's reasoning independently of its conclusion.

use fip_common::errors::{ProbeError, ProbeResult};
use fip_common::shape::Verdict;
use fip_common::types::{InvocationRecord, InvokeOutcome, MetricSample};
use serde::Serialize;

/// Result of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub record: InvocationRecord,
    /// Elapsed time between the call and the observation, in seconds.
    pub elapsed_secs: f64,
    /// Synchronous rejections captured during the invoke phase.
    pub rejections: u64,
    /// Gateway responses for invocations that were accepted.
    pub outcomes: Vec<InvokeOutcome>,
    /// Observed attempt offsets from call time, in seconds.
    pub timeline_offsets: Vec<f64>,
    /// Raw metric samples pulled for the scenario, if any.
    pub samples: Vec<MetricSample>,
    pub verdict: Verdict,
}

impl ScenarioReport {
    /// Whether this run should fail a suite. Premature is inconclusive,
    /// not a failure.
    pub fn is_failure(&self) -> bool {
        self.verdict.is_violated()
    }

    /// Convert a Violated verdict into the suite-failing error.
    pub fn ensure_not_violated(&self) -> ProbeResult<()> {
        match &self.verdict {
            Verdict::Violated { reason } => Err(ProbeError::ShapeViolated {
                scenario: self.scenario.clone(),
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "scenario: {}", self.scenario)?;
        writeln!(
            f,
            "  call: {} {} at {}",
            self.record.invocation_type, self.record.function, self.record.call_time
        )?;
        writeln!(f, "  observed after: {:.1}s", self.elapsed_secs)?;
        if self.rejections > 0 {
            writeln!(f, "  rejections: {}", self.rejections)?;
        }
        if self.timeline_offsets.is_empty() {
            writeln!(f, "  attempts: (none)")?;
        } else {
            let offsets: Vec<String> = self
                .timeline_offsets
                .iter()
                .map(|o| format!("+{o:.1}s"))
                .collect();
            writeln!(f, "  attempts: {}", offsets.join(", "))?;
        }
        for sample in &self.samples {
            writeln!(
                f,
                "  metric {} @ {}: n={} sum={:.0} min={:.0} max={:.0} avg={:.1}",
                sample.metric,
                sample.period_start,
                sample.sample_count,
                sample.sum,
                sample.minimum,
                sample.maximum,
                sample.average
            )?;
        }
        writeln!(f, "  verdict: {}", self.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fip_common::types::{FunctionName, InvocationType};

    fn report(verdict: Verdict) -> ScenarioReport {
        ScenarioReport {
            scenario: "async-exception".into(),
            record: InvocationRecord {
                function: FunctionName::from("async_handler_raises_exception"),
                call_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                invocation_type: InvocationType::Asynchronous,
            },
            elapsed_secs: 300.0,
            rejections: 0,
            outcomes: Vec::new(),
            timeline_offsets: vec![0.8, 61.2, 182.9],
            samples: Vec::new(),
            verdict,
        }
    }

    #[test]
    fn test_display_shows_raw_observations_before_verdict() {
        let rendered = report(Verdict::Confirmed).to_string();
        let attempts_at = rendered.find("attempts:").unwrap();
        let verdict_at = rendered.find("verdict:").unwrap();
        assert!(attempts_at < verdict_at);
        assert!(rendered.contains("+61.2s"));
    }

    #[test]
    fn test_only_violated_fails_the_suite() {
        assert!(!report(Verdict::Confirmed).is_failure());
        assert!(!report(Verdict::Premature { required_secs: 195.0 }).is_failure());
        assert!(report(Verdict::Violated { reason: "nope".into() }).is_failure());

        let err = report(Verdict::Violated { reason: "nope".into() })
            .ensure_not_violated()
            .unwrap_err();
        assert!(matches!(err, ProbeError::ShapeViolated { .. }));
        assert!(
            report(Verdict::Premature { required_secs: 195.0 })
                .ensure_not_violated()
                .is_ok()
        );
    }
}
