//! Function Invocation Probe - the observation harness.
//!
//! Drives a remote function service under a fault condition, then uses the
//! platform's eventually consistent logs and metrics to reconstruct a
//! timeline of invocation attempts and classify the observed retry behavior
//! against a declared expected shape.

pub mod classify;
pub mod metrics;
pub mod report;
pub mod scenario;
pub mod scenarios;
pub mod timeline;

pub use classify::{Observation, classify};
pub use report::ScenarioReport;
pub use scenario::{InvokePlan, ObservationSource, ScenarioDriver, ScenarioSpec, ScenarioState};
