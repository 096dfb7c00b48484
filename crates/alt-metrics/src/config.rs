// config.rs - Recorder configuration.
//
// The host application owns its configuration system; the recorder only
// needs the handful of values below. They can be built in code or read
// from a TOML file, either as a bare table or nested under `[metrics]`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

/// Generation providers that run remotely and draw no local GPU power.
const HOSTED_PROVIDERS: &[&str] = &["gemini"];

/// Lower bound on the flush period so a zero interval can't spin.
pub const MIN_FLUSH_INTERVAL_MS: u64 = 100;

/// Configuration for a [`MetricsRecorder`](crate::MetricsRecorder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Master switch. When false every logging call is a no-op.
    pub enabled: bool,

    /// Path of the JSON file events are flushed to.
    pub file_path: PathBuf,

    /// Milliseconds between background flushes.
    pub flush_interval_ms: u64,

    /// Power consumption reporting for local generation.
    pub power_metrics: PowerMetricsConfig,

    /// Name of the active generation provider (e.g. "ollama", "gemini").
    pub llm_provider: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_path: PathBuf::from("metrics.json"),
            flush_interval_ms: 300_000,
            power_metrics: PowerMetricsConfig::default(),
            llm_provider: "ollama".to_string(),
        }
    }
}

/// Power consumption reporting settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerMetricsConfig {
    pub enabled: bool,
    /// Average draw of the GPU while generating, in watts.
    pub gpu_watts: f64,
}

/// Wrapper for configs embedded in a larger document.
#[derive(Deserialize)]
struct Nested {
    metrics: MetricsConfig,
}

impl MetricsConfig {
    pub fn new(enabled: bool, file_path: impl Into<PathBuf>, flush_interval: Duration) -> Self {
        Self {
            enabled,
            file_path: file_path.into(),
            flush_interval_ms: u64::try_from(flush_interval.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// Enable power reporting at the given GPU wattage.
    pub fn with_power_metrics(mut self, gpu_watts: f64) -> Self {
        self.power_metrics = PowerMetricsConfig {
            enabled: true,
            gpu_watts,
        };
        self
    }

    /// Set the active generation provider.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.llm_provider = provider.into();
        self
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, MetricsError> {
        let table: toml::Table = toml::from_str(content)?;
        if table.contains_key("metrics") {
            let nested: Nested = toml::from_str(content)?;
            return Ok(nested.metrics);
        }
        Ok(toml::from_str(content)?)
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, MetricsError> {
        let content = std::fs::read_to_string(path).map_err(|source| MetricsError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Background flush period, never shorter than [`MIN_FLUSH_INTERVAL_MS`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(MIN_FLUSH_INTERVAL_MS))
    }

    /// True when the active provider runs on local hardware.
    pub fn is_local_provider(&self) -> bool {
        !HOSTED_PROVIDERS
            .iter()
            .any(|hosted| hosted.eq_ignore_ascii_case(self.llm_provider.trim()))
    }

    /// True when generation events should carry a power figure.
    pub fn reports_power(&self) -> bool {
        self.power_metrics.enabled && self.is_local_provider()
    }
}
