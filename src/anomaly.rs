//! Advisory anomaly detection for accepted samples
//!
//! The detector compares an accepted sample with the previously accepted
//! sample of the same session. It never rejects data; the anomalies it
//! returns are turned into warning notifications by the session manager.

use crate::config::AnomalyConfig;
use crate::sample::ChargingSample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single advisory warning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Average voltage moved more than the threshold since the last sample
    VoltageSpike { delta: f64 },
    /// Average current moved more than the threshold since the last sample
    CurrentSpike { delta: f64 },
    /// Real/apparent power ratio below the threshold
    LowPowerFactor { power_factor: f64 },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VoltageSpike { delta } => write!(f, "Voltage spike detected: ΔV={delta:.2}V"),
            Self::CurrentSpike { delta } => write!(f, "Current spike detected: ΔI={delta:.2}A"),
            Self::LowPowerFactor { power_factor } => {
                write!(f, "Low power factor: {power_factor:.2}")
            }
        }
    }
}

/// Threshold-based anomaly detector
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    voltage_spike_threshold: f64,
    current_spike_threshold: f64,
    min_power_factor: f64,
}

impl AnomalyDetector {
    pub const fn new(config: &AnomalyConfig) -> Self {
        Self {
            voltage_spike_threshold: config.voltage_spike_threshold,
            current_spike_threshold: config.current_spike_threshold,
            min_power_factor: config.min_power_factor,
        }
    }

    /// Inspect `current` against the previously accepted sample, if any
    pub fn detect(&self, previous: Option<&ChargingSample>, current: &ChargingSample) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        if let Some(prev) = previous {
            let delta_v = (current.voltage_rms.avg - prev.voltage_rms.avg).abs();
            if delta_v > self.voltage_spike_threshold {
                anomalies.push(Anomaly::VoltageSpike { delta: delta_v });
            }

            let delta_i = (current.current_rms.avg - prev.current_rms.avg).abs();
            if delta_i > self.current_spike_threshold {
                anomalies.push(Anomaly::CurrentSpike { delta: delta_i });
            }
        }

        if let Some(power_factor) = current.power_factor()
            && power_factor < self.min_power_factor
        {
            anomalies.push(Anomaly::LowPowerFactor { power_factor });
        }

        anomalies
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(&AnomalyConfig::default())
    }
}
