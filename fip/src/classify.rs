//! Outcome Classifier.
//!
//! Compares an observation (an attempt timeline or a metric-derived count)
//! against an expected retry shape and produces a verdict. The classifier
//! is pure: it does not mutate its inputs and does not read clocks; the
//! caller tells it how much time has elapsed since the call.

use fip_common::shape::{ExpectedShape, Verdict};
use fip_common::types::{AttemptTimeline, InvocationRecord};
use std::time::Duration;
use tracing::debug;

/// What was observed for a scenario.
#[derive(Debug, Clone, Copy)]
pub enum Observation<'a> {
    Timeline(&'a AttemptTimeline),
    Count(u64),
}

/// Classify an observation against the expected shape.
///
/// Verdict order of precedence:
/// 1. Premature - `elapsed` is below the shape's minimum manifest time.
///    Retries are asynchronous; their absence this early is not evidence
///    against the shape, so failing here would be dishonest.
/// 2. Confirmed - attempt count and (for offset shapes) every pairwise
///    offset within tolerance.
/// 3. Violated - anything else, with an auditable reason.
///
/// Offsets are matched positionally against the time-sorted timeline.
/// There is no reordering or best-match search: attempts are strictly
/// ordered in time by construction.
pub fn classify(
    record: &InvocationRecord,
    shape: &ExpectedShape,
    observation: Observation<'_>,
    elapsed: Duration,
) -> Verdict {
    let required = shape.min_manifest_time();
    if elapsed < required {
        debug!(
            function = %record.function,
            elapsed_secs = elapsed.as_secs_f64(),
            required_secs = required.as_secs_f64(),
            "observation is premature"
        );
        return Verdict::Premature {
            required_secs: required.as_secs_f64(),
        };
    }

    match (shape, observation) {
        (ExpectedShape::Offsets { offsets, tolerance }, Observation::Timeline(timeline)) => {
            classify_offsets(record, offsets, *tolerance, timeline)
        }
        (ExpectedShape::Offsets { .. }, Observation::Count(_)) => Verdict::Violated {
            reason: "offset shape requires a timeline observation; a bare count cannot \
                     confirm the retry curve"
                .into(),
        },
        (ExpectedShape::MinCount { min, .. }, observation) => {
            let count = match observation {
                Observation::Timeline(timeline) => timeline.len() as u64,
                Observation::Count(count) => count,
            };
            if count >= *min {
                Verdict::Confirmed
            } else {
                Verdict::Violated {
                    reason: format!("observed {count} attempts, expected at least {min}"),
                }
            }
        }
    }
}

fn classify_offsets(
    record: &InvocationRecord,
    offsets: &[Duration],
    tolerance: Duration,
    timeline: &AttemptTimeline,
) -> Verdict {
    if timeline.len() != offsets.len() {
        return Verdict::Violated {
            reason: format!(
                "observed {} attempts, expected exactly {}",
                timeline.len(),
                offsets.len()
            ),
        };
    }

    let observed = timeline.offsets_from(record.call_time);
    let tolerance_secs = tolerance.as_secs_f64();
    for (i, (obs, exp)) in observed.iter().zip(offsets.iter()).enumerate() {
        let exp_secs = exp.as_secs_f64();
        if (obs - exp_secs).abs() > tolerance_secs {
            return Verdict::Violated {
                reason: format!(
                    "attempt {} at +{obs:.1}s, outside +{exp_secs:.0}s ± {tolerance_secs:.0}s",
                    i + 1
                ),
            };
        }
    }
    Verdict::Confirmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use fip_common::types::{FunctionName, InvocationType};
    use proptest::prelude::*;

    const LATE: Duration = Duration::from_secs(3600);

    fn call_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn record() -> InvocationRecord {
        InvocationRecord {
            function: FunctionName::from("probe"),
            call_time: call_time(),
            invocation_type: InvocationType::Asynchronous,
        }
    }

    fn timeline_at(offsets_secs: &[i64]) -> AttemptTimeline {
        AttemptTimeline::new(
            offsets_secs
                .iter()
                .map(|s| call_time() + ChronoDuration::seconds(*s))
                .collect(),
        )
    }

    #[test]
    fn test_exact_offsets_confirmed() {
        let shape = ExpectedShape::offsets_secs([0, 60, 180], 15);
        let timeline = timeline_at(&[0, 60, 180]);
        let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
        assert!(verdict.is_confirmed());
    }

    #[test]
    fn test_offsets_within_tolerance_confirmed() {
        let shape = ExpectedShape::offsets_secs([0, 60, 180], 15);
        let timeline = timeline_at(&[3, 74, 166]);
        let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
        assert!(verdict.is_confirmed());
    }

    #[test]
    fn test_offset_outside_tolerance_violated() {
        let shape = ExpectedShape::offsets_secs([0, 60, 180], 15);
        let timeline = timeline_at(&[0, 90, 180]);
        let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
        match verdict {
            Verdict::Violated { reason } => assert!(reason.contains("attempt 2"), "{reason}"),
            other => panic!("expected Violated, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_attempt_count_violated() {
        let shape = ExpectedShape::offsets_secs([0, 60, 180], 15);
        let timeline = timeline_at(&[0, 60]);
        let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
        assert!(verdict.is_violated());
    }

    #[test]
    fn test_early_observation_is_premature_even_with_partial_timeline() {
        let shape = ExpectedShape::offsets_secs([0, 60, 180], 15);
        let timeline = timeline_at(&[0]);
        let verdict = classify(
            &record(),
            &shape,
            Observation::Timeline(&timeline),
            Duration::from_secs(30),
        );
        assert!(verdict.is_premature());
    }

    #[test]
    fn test_premature_boundary_is_inclusive_of_manifest_time() {
        let shape = ExpectedShape::offsets_secs([0, 60, 180], 15);
        // Exactly at min manifest time: no longer premature.
        let timeline = timeline_at(&[0, 60, 180]);
        let verdict = classify(
            &record(),
            &shape,
            Observation::Timeline(&timeline),
            Duration::from_secs(195),
        );
        assert!(verdict.is_confirmed());
    }

    #[test]
    fn test_empty_shape_with_empty_timeline_confirmed() {
        let shape = ExpectedShape::no_attempts(Duration::from_secs(60));
        let timeline = AttemptTimeline::empty();
        let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
        assert!(verdict.is_confirmed());
    }

    #[test]
    fn test_empty_shape_with_attempts_violated() {
        let shape = ExpectedShape::no_attempts(Duration::from_secs(60));
        let timeline = timeline_at(&[5]);
        let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
        assert!(verdict.is_violated());
    }

    #[test]
    fn test_min_count_confirmed_from_count() {
        let shape = ExpectedShape::min_count(3, Duration::from_secs(120));
        let verdict = classify(&record(), &shape, Observation::Count(6), LATE);
        assert!(verdict.is_confirmed());
    }

    #[test]
    fn test_min_count_confirmed_from_timeline_length() {
        let shape = ExpectedShape::min_count(2, Duration::from_secs(120));
        let timeline = timeline_at(&[0, 60, 180]);
        let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
        assert!(verdict.is_confirmed());
    }

    #[test]
    fn test_min_count_short_violated() {
        let shape = ExpectedShape::min_count(3, Duration::from_secs(120));
        let verdict = classify(&record(), &shape, Observation::Count(2), LATE);
        assert!(verdict.is_violated());
    }

    #[test]
    fn test_offsets_shape_with_bare_count_is_violated_with_reason() {
        let shape = ExpectedShape::offsets_secs([0, 60], 15);
        let verdict = classify(&record(), &shape, Observation::Count(2), LATE);
        match verdict {
            Verdict::Violated { reason } => assert!(reason.contains("timeline"), "{reason}"),
            other => panic!("expected Violated, got {other:?}"),
        }
    }

    #[test]
    fn test_attempt_before_call_time_violated() {
        let shape = ExpectedShape::offsets_secs([0], 15);
        let timeline = timeline_at(&[-30]);
        let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
        assert!(verdict.is_violated());
    }

    // Universal properties, over arbitrary shapes and perturbations.

    proptest! {
        /// N attempts at exactly the expected offsets are always Confirmed.
        #[test]
        fn prop_exact_match_is_confirmed(
            offsets in proptest::collection::vec(0u64..600, 1..6),
            tolerance in 1u64..30,
        ) {
            let mut offsets = offsets;
            offsets.sort_unstable();
            offsets.dedup();
            let shape = ExpectedShape::offsets_secs(offsets.clone(), tolerance);
            let timeline = timeline_at(
                &offsets.iter().map(|s| *s as i64).collect::<Vec<_>>(),
            );
            let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
            prop_assert!(verdict.is_confirmed());
        }

        /// Moving any single attempt outside tolerance is never Confirmed.
        #[test]
        fn prop_perturbed_entry_is_violated(
            offsets in proptest::collection::vec(0u64..600, 1..6),
            tolerance in 1u64..30,
            victim in 0usize..6,
            push in 1u64..120,
        ) {
            let mut offsets = offsets;
            // Keep expected offsets far enough apart that displacing one
            // cannot land inside a neighbor's window.
            offsets.sort_unstable();
            offsets.dedup();
            let mut spread = Vec::with_capacity(offsets.len());
            for (i, offset) in offsets.iter().enumerate() {
                spread.push(offset + (i as u64) * (2 * tolerance + 121));
            }
            let victim = victim % spread.len();

            let mut observed: Vec<i64> = spread.iter().map(|s| *s as i64).collect();
            observed[victim] += (tolerance + push) as i64;

            let shape = ExpectedShape::offsets_secs(spread, tolerance);
            let timeline = timeline_at(&observed);
            let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), LATE);
            prop_assert!(!verdict.is_confirmed());
        }

        /// Below the manifest time the verdict is Premature, whatever the
        /// partial timeline holds.
        #[test]
        fn prop_early_observation_is_premature(
            observed in proptest::collection::vec(0i64..600, 0..6),
            fraction in 0.0f64..0.99,
        ) {
            let shape = ExpectedShape::offsets_secs([0, 60, 180], 15);
            let required = shape.min_manifest_time().as_secs_f64();
            let elapsed = Duration::from_secs_f64(required * fraction);
            let timeline = timeline_at(&observed);
            let verdict = classify(&record(), &shape, Observation::Timeline(&timeline), elapsed);
            prop_assert!(verdict.is_premature());
        }
    }
}
