//! Expected retry shapes and classification verdicts.
//!
//! An [`ExpectedShape`] is a declarative description of one retry pattern.
//! Fixed-offset shapes require exactly as many attempts as offsets, each
//! within a symmetric tolerance of its expected offset from call time.
//! Minimum-count shapes only require "at least K attempts" and are used
//! where exact offsets are not practically assertable (jittered exponential
//! backoff is provider-internal and undocumented, so its curve must not be
//! hard-coded).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Declarative description of one expected retry pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedShape {
    /// Exactly `offsets.len()` attempts, each observed within
    /// `[offset - tolerance, offset + tolerance]` of call time, matched
    /// positionally against the time-sorted timeline.
    Offsets {
        offsets: Vec<Duration>,
        tolerance: Duration,
    },
    /// At least `min` attempts once `settle` has elapsed.
    MinCount { min: u64, settle: Duration },
}

impl ExpectedShape {
    /// Fixed-offset shape with the given tolerance.
    pub fn offsets(offsets: impl IntoIterator<Item = Duration>, tolerance: Duration) -> Self {
        Self::Offsets {
            offsets: offsets.into_iter().collect(),
            tolerance,
        }
    }

    /// Fixed-offset shape from whole seconds.
    pub fn offsets_secs(offsets: impl IntoIterator<Item = u64>, tolerance_secs: u64) -> Self {
        Self::offsets(
            offsets.into_iter().map(Duration::from_secs),
            Duration::from_secs(tolerance_secs),
        )
    }

    /// Minimum-count shape.
    pub fn min_count(min: u64, settle: Duration) -> Self {
        Self::MinCount { min, settle }
    }

    /// Shape asserting that no attempt at all is observed within `settle`.
    pub fn no_attempts(settle: Duration) -> Self {
        Self::Offsets {
            offsets: Vec::new(),
            tolerance: settle,
        }
    }

    /// Minimum elapsed time after which the shape could have fully
    /// manifested. Below this, absence of attempts is not evidence against
    /// the shape and the only honest verdict is Premature.
    pub fn min_manifest_time(&self) -> Duration {
        match self {
            Self::Offsets { offsets, tolerance } => {
                let last = offsets.iter().max().copied().unwrap_or(Duration::ZERO);
                last + *tolerance
            }
            Self::MinCount { settle, .. } => *settle,
        }
    }

    /// Number of attempts the shape requires, where that is exact.
    pub fn required_attempts(&self) -> Option<usize> {
        match self {
            Self::Offsets { offsets, .. } => Some(offsets.len()),
            Self::MinCount { .. } => None,
        }
    }
}

/// Result of classifying an observation against an expected shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The observation matches the expected shape.
    Confirmed,
    /// Not enough time has elapsed for the shape to have manifested.
    /// Inconclusive, not a failure: re-observe after `required` has passed
    /// since call time.
    Premature { required_secs: f64 },
    /// The observation contradicts the expected shape.
    Violated { reason: String },
}

impl Verdict {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    pub fn is_premature(&self) -> bool {
        matches!(self, Self::Premature { .. })
    }

    pub fn is_violated(&self) -> bool {
        matches!(self, Self::Violated { .. })
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Premature { required_secs } => {
                write!(
                    f,
                    "premature (inconclusive, re-observe after {required_secs:.0}s from call)"
                )
            }
            Self::Violated { reason } => write!(f, "violated: {reason}"),
        }
    }
}
