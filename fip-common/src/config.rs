//! Harness configuration.
//!
//! Resolution order, last writer wins:
//! 1. Built-in defaults
//! 2. TOML file (explicit path, or `<config-dir>/fip/config.toml`)
//! 3. `FIP_*` environment variables

use crate::errors::{ProbeError, ProbeResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning knobs for the observation harness.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Default symmetric tolerance for fixed-offset shapes. Scenarios may
    /// override per shape.
    pub default_tolerance: Duration,
    /// How long to let asynchronous retries manifest before observing.
    pub settle_wait: Duration,
    /// Per-call timeout for log/metric store reads. Expiry is a loud
    /// `StoreUnavailable`, never an internal retry.
    pub store_call_timeout: Duration,
    /// Metric aggregation period. The backing store supports nothing finer
    /// than 60 seconds; smaller values are clamped up.
    pub metric_period: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            default_tolerance: Duration::from_secs(15),
            settle_wait: Duration::from_secs(5 * 60),
            store_call_timeout: Duration::from_secs(10),
            metric_period: Duration::from_secs(60),
        }
    }
}

/// On-disk representation. All fields optional; absent means default.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    tolerance_secs: Option<u64>,
    #[serde(default)]
    settle_secs: Option<u64>,
    #[serde(default)]
    store_timeout_secs: Option<u64>,
    #[serde(default)]
    metric_period_secs: Option<u64>,
}

impl HarnessConfig {
    /// Load configuration: defaults, then the TOML file (if any), then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> ProbeResult<Self> {
        let mut config = Self::default();

        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };
        if let Some(file) = file {
            let raw = std::fs::read_to_string(&file).map_err(|e| {
                ProbeError::Config(format!("failed to read {}: {e}", file.display()))
            })?;
            let raw: RawConfig = toml::from_str(&raw).map_err(|e| {
                ProbeError::Config(format!("invalid TOML in {}: {e}", file.display()))
            })?;
            config.apply_raw(&raw);
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// `<config-dir>/fip/config.toml`, if a config dir exists on this
    /// platform.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fip").join("config.toml"))
    }

    fn apply_raw(&mut self, raw: &RawConfig) {
        if let Some(secs) = raw.tolerance_secs {
            self.default_tolerance = Duration::from_secs(secs);
        }
        if let Some(secs) = raw.settle_secs {
            self.settle_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = raw.store_timeout_secs {
            self.store_call_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = raw.metric_period_secs {
            self.metric_period = Duration::from_secs(secs);
        }
    }

    fn apply_env(&mut self) -> ProbeResult<()> {
        if let Some(secs) = env_secs("FIP_TOLERANCE_SECS")? {
            self.default_tolerance = secs;
        }
        if let Some(secs) = env_secs("FIP_SETTLE_SECS")? {
            self.settle_wait = secs;
        }
        if let Some(secs) = env_secs("FIP_STORE_TIMEOUT_SECS")? {
            self.store_call_timeout = secs;
        }
        if let Some(secs) = env_secs("FIP_METRIC_PERIOD_SECS")? {
            self.metric_period = secs;
        }
        Ok(())
    }

    fn validate(&self) -> ProbeResult<()> {
        if self.store_call_timeout.is_zero() {
            return Err(ProbeError::Config(
                "store_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Metric period clamped to the store's 60-second granularity floor.
    pub fn effective_metric_period(&self) -> Duration {
        self.metric_period.max(Duration::from_secs(60))
    }
}

fn env_secs(var: &str) -> ProbeResult<Option<Duration>> {
    match std::env::var(var) {
        Ok(value) => {
            let secs: u64 = value
                .parse()
                .map_err(|_| ProbeError::Config(format!("{var} must be an integer, got {value:?}")))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ProbeError::Config(format!("{var}: {e}"))),
    }
}
