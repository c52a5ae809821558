//! Configuration management for Chargelog
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{ChargelogError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct Config {
    /// Root directory for per-vehicle session logs
    pub data_root: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Sample validation limits
    pub validation: ValidationConfig,

    /// Anomaly detection thresholds
    pub anomaly: AnomalyConfig,

    /// Observer event channel configuration
    pub events: EventsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Log file path or directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// Plausibility limits applied by the sample validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct ValidationConfig {
    /// Samples stamped before this year are rejected
    pub min_year: i32,

    /// Upper bound for the maximum RMS voltage (V)
    pub max_voltage: f64,
}

/// Thresholds for advisory anomaly warnings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct AnomalyConfig {
    /// Average voltage change between consecutive samples (V)
    pub voltage_spike_threshold: f64,

    /// Average current change between consecutive samples (A)
    pub current_spike_threshold: f64,

    /// Power factors below this value raise a warning
    pub min_power_factor: f64,
}

/// Observer notification channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow observers lose older events
    pub capacity: usize,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "chargelog.yaml",
            "/data/chargelog.yaml",
            "/etc/chargelog/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Data root as a path
    pub fn data_root_path(&self) -> PathBuf {
        PathBuf::from(&self.data_root)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_root.trim().is_empty() {
            return Err(ChargelogError::validation(
                "data_root",
                "Data root cannot be empty",
            ));
        }

        if self.web.port == 0 {
            return Err(ChargelogError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        if !(self.validation.max_voltage.is_finite() && self.validation.max_voltage > 0.0) {
            return Err(ChargelogError::validation(
                "validation.max_voltage",
                "Must be positive",
            ));
        }

        if self.anomaly.voltage_spike_threshold < 0.0 || self.anomaly.current_spike_threshold < 0.0
        {
            return Err(ChargelogError::validation(
                "anomaly",
                "Spike thresholds cannot be negative",
            ));
        }

        if !(0.0..=1.0).contains(&self.anomaly.min_power_factor) {
            return Err(ChargelogError::validation(
                "anomaly.min_power_factor",
                "Must be between 0 and 1",
            ));
        }

        if self.events.capacity == 0 {
            return Err(ChargelogError::validation(
                "events.capacity",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
