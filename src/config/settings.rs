//! Tunable settings for the bridge runtime
//!
//! Each section of the configuration file maps to one struct here. Every
//! field has a default so partial files are accepted.
//!
//! # Main Types
//!
//! - [`TelemetryPolicy`] - Thresholds the UI uses to highlight blocks
//! - [`SchedulerSettings`] - Step rate of the free-running loop
//! - [`MidiSettings`] - Ports known to the virtual MIDI device
//! - [`LoggingSettings`] - Log filter and optional log file

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Inbox depth above which a block is shown as backpressuring
pub const DEFAULT_BACKPRESSURE_THRESHOLD: u32 = 50;

/// Outbox depth at or above which a block is shown as emitting
pub const DEFAULT_EMISSION_THRESHOLD: u32 = 1;

/// Default step rate of the free-running scheduler in Hz
pub const DEFAULT_STEP_RATE_HZ: u32 = 60;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info,canvas_bridge=debug";

/// Thresholds consumed by the UI layer.
///
/// The engine does not enforce these; they only decide how an
/// [`OutputState`](crate::types::OutputState) is highlighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryPolicy {
    /// `inbox_size > backpressure_threshold` signals backpressure
    pub backpressure_threshold: u32,
    /// `outbox_size >= emission_threshold` signals active emission
    pub emission_threshold: u32,
}

impl Default for TelemetryPolicy {
    fn default() -> Self {
        Self {
            backpressure_threshold: DEFAULT_BACKPRESSURE_THRESHOLD,
            emission_threshold: DEFAULT_EMISSION_THRESHOLD,
        }
    }
}

/// Settings for the step scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Steps per second while free-running (0 = as fast as possible)
    pub step_rate_hz: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            step_rate_hz: DEFAULT_STEP_RATE_HZ,
        }
    }
}

impl SchedulerSettings {
    /// Interval between free-running steps, `None` when unthrottled
    pub fn step_interval(&self) -> Option<Duration> {
        if self.step_rate_hz == 0 {
            None
        } else {
            Some(Duration::from_micros(1_000_000 / self.step_rate_hz as u64))
        }
    }
}

/// MIDI settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Input ports the virtual device reports as available
    pub ports: Vec<u8>,
    /// Simulated latency of port readiness in milliseconds
    pub open_latency_ms: u64,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            ports: vec![0],
            open_latency_ms: 0,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Directory for daily rolling log files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
        }
    }
}
