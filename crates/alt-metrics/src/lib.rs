//! # alt-metrics
//!
//! Anonymized usage metrics for the alt-text bot.
//!
//! Call sites report discrete events (requests, successful generations,
//! consent decisions, ...) to a [`MetricsRecorder`]. The recorder hashes
//! the user identifier with SHA-256 before the event is stored, buffers
//! events in memory, and rewrites a pretty-printed JSON file on a fixed
//! interval and once more on shutdown.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use alt_metrics::{MetricsConfig, MetricsRecorder};
//!
//! let config = MetricsConfig::new(true, "/tmp/metrics.json", Duration::from_secs(60))
//!     .with_power_metrics(250.0)
//!     .with_provider("ollama");
//! let recorder = MetricsRecorder::new(config);
//! recorder.log_request("@alice@example.social");
//! recorder.log_successful_generation("@alice@example.social", "image", 1500, "en");
//! recorder.stop();
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod hasher;
pub mod recorder;
pub mod store;

pub use config::{MetricsConfig, PowerMetricsConfig};
pub use error::MetricsError;
pub use event::{Details, EventKind, MetricEvent};
pub use hasher::anonymize;
pub use recorder::{power_consumption_kwh, MetricsRecorder};
pub use store::EventStore;
