//! Configuration module for the canvas bridge
//!
//! The bridge reads a single TOML file with one table per subsystem:
//!
//! ```toml
//! [telemetry]
//! backpressure_threshold = 50
//! emission_threshold = 1
//!
//! [scheduler]
//! step_rate_hz = 60
//!
//! [midi]
//! ports = [0, 1]
//!
//! [logging]
//! filter = "info,canvas_bridge=debug"
//! ```
//!
//! # Config Location
//!
//! When no path is given the file is looked up in the platform config
//! directory under `dev.canvas-bridge`:
//! - **Linux**: `~/.config/dev.canvas-bridge/bridge.toml`
//! - **macOS**: `~/Library/Application Support/dev.canvas-bridge/bridge.toml`
//! - **Windows**: `%APPDATA%\dev.canvas-bridge\bridge.toml`

pub mod settings;

pub use settings::*;

use crate::error::{BridgeError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.canvas-bridge";

/// Config filename
pub const CONFIG_FILE: &str = "bridge.toml";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Highlight thresholds for block output state
    pub telemetry: TelemetryPolicy,
    /// Free-running step loop
    pub scheduler: SchedulerSettings,
    /// Virtual MIDI device
    pub midi: MidiSettings,
    /// Tracing output
    pub logging: LoggingSettings,
}

impl BridgeConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(BridgeError::from)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Load the given file, or the default location when it exists.
    ///
    /// Without a path and without a default file this is the default
    /// configuration. Errors are returned so the caller can report them once
    /// logging is up.
    pub fn try_load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => match default_config_path() {
                Some(p) if p.exists() => Self::load(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Like [`try_load`](Self::try_load), falling back to defaults on failure
    pub fn load_or_default(path: Option<&Path>) -> Self {
        Self::try_load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration as pretty TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BridgeError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| BridgeError::Config(format!("Failed to write config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = BridgeConfig::from_toml(
            r#"
            [telemetry]
            backpressure_threshold = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.telemetry.backpressure_threshold, 10);
        assert_eq!(config.telemetry.emission_threshold, DEFAULT_EMISSION_THRESHOLD);
        assert_eq!(config.scheduler, SchedulerSettings::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = BridgeConfig::from_toml("").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = BridgeConfig::from_toml("[telemetry\n").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = BridgeConfig::default();
        config.scheduler.step_rate_hz = 240;
        config.midi.ports = vec![0, 3];
        config.save(&path).unwrap();

        let loaded = BridgeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = BridgeConfig::load_or_default(Some(&path));
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_try_load_reports_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[scheduler]\nstep_rate_hz = \"fast\"\n").unwrap();

        let err = BridgeConfig::try_load(Some(&path)).unwrap_err();
        match &err {
            BridgeError::WithContext { source, .. } => {
                assert!(matches!(**source, BridgeError::Config(_)))
            }
            other => panic!("expected context, got {:?}", other),
        }
        assert!(err.to_string().starts_with("Invalid config"));
        assert_eq!(BridgeConfig::load_or_default(Some(&path)), BridgeConfig::default());
    }

    #[test]
    fn test_try_load_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(BridgeConfig::try_load(Some(&path)).is_err());
    }
}
