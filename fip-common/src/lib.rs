//! Shared types and utilities for the Function Invocation Probe.
//!
//! This crate holds everything the harness and its tests have in common:
//! - Core entities (invocation records, attempt timelines, metric samples)
//! - The expected-shape model and classification verdicts
//! - The error taxonomy
//! - Configuration loading (TOML file + `FIP_*` env overrides)
//! - Service-seam traits for the remote function gateway, log store,
//!   metric store, and event bus
//! - An in-memory mock gateway implementing those seams for tests and the
//!   simulation CLI

pub mod config;
pub mod errors;
pub mod gateway;
pub mod mock;
pub mod shape;
pub mod types;

pub use config::HarnessConfig;
pub use errors::{ProbeError, ProbeResult, StoreKind};
pub use gateway::{EventBus, FunctionGateway, LogStore, MetricStore};
pub use shape::{ExpectedShape, Verdict};
pub use types::{
    AttemptTimeline, FunctionName, InvocationRecord, InvocationType, InvokeOutcome, LogEvent,
    MetricName, MetricSample,
};
