//! Error taxonomy for the probe.
//!
//! The harness deliberately does not retry store or precondition failures:
//! silent retries would contaminate the measurement being taken (was that
//! second invocation the platform retrying, or us?). Transient backend
//! failures surface immediately as [`ProbeError::StoreUnavailable`].
//!
//! A Premature classification is *not* an error; it is a non-terminal
//! verdict carried in [`crate::shape::Verdict`]. The only condition that
//! should fail a suite built on this harness is `ShapeViolated`.

use crate::types::FunctionName;
use serde::{Deserialize, Serialize};

/// Which backing store a read went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Log,
    Metric,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Metric => write!(f, "metric"),
        }
    }
}

/// Error type for probe operations.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The remote control API rejected a precondition change, e.g. a
    /// concurrency cap the account quota does not allow.
    #[error("precondition failed for {function}: {reason}")]
    PreconditionFailed {
        function: FunctionName,
        reason: String,
    },

    /// A synchronous invocation was rejected before execution (throttle).
    /// Expected in some scenarios, a hard failure in others; the scenario
    /// driver decides which.
    #[error("invocation rejected for {function}: {reason}")]
    InvokeRejected {
        function: FunctionName,
        reason: String,
    },

    /// The log or metric backend failed or timed out. Never retried
    /// internally; surfaced to the operator so a broken harness is visibly
    /// broken rather than quietly masking flakiness.
    #[error("{store} store unavailable: {reason}")]
    StoreUnavailable { store: StoreKind, reason: String },

    /// The observed attempt pattern contradicts the expected shape.
    #[error("scenario '{scenario}' violated its expected shape: {reason}")]
    ShapeViolated { scenario: String, reason: String },

    /// The target function is not registered with the gateway.
    #[error("unknown function: {0}")]
    UnknownFunction(FunctionName),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// Harness-side failure (e.g. a spawned invocation task panicked).
    #[error("internal harness error: {0}")]
    Internal(String),
}

/// Result type for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

impl ProbeError {
    /// Whether this error is an expected-rejection candidate (a throttle
    /// captured as data rather than a harness failure).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvokeRejected { .. })
    }
}
