//! Sample validation rules
//!
//! Validation is a pure function of the sample, the current time and the
//! configured limits. Rules are evaluated in a fixed order and the first
//! violation wins, so a sample with a bad voltage and a bad current is
//! always reported as a voltage violation.

use crate::config::ValidationConfig;
use crate::sample::ChargingSample;
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of validating a single sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ValidationOutcome {
    Valid,
    InvalidTimestamp,
    InvalidVoltage,
    InvalidCurrent,
    InvalidFrequency,
    InvalidPower,
}

impl ValidationOutcome {
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Human-readable reason written to the rejects log
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::InvalidTimestamp => "Invalid timestamp",
            Self::InvalidVoltage => "Invalid voltage values",
            Self::InvalidCurrent => "Invalid current values",
            Self::InvalidFrequency => "Invalid frequency values",
            Self::InvalidPower => "Invalid power values",
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Validator holding the configured plausibility limits
#[derive(Debug, Clone)]
pub struct SampleValidator {
    min_year: i32,
    max_voltage: f64,
}

impl SampleValidator {
    pub const fn new(config: &ValidationConfig) -> Self {
        Self {
            min_year: config.min_year,
            max_voltage: config.max_voltage,
        }
    }

    /// Validate `sample` as of `now`, returning the first violated rule
    pub fn validate(&self, sample: &ChargingSample, now: NaiveDateTime) -> ValidationOutcome {
        if !self.timestamp_ok(sample.timestamp, now) {
            return ValidationOutcome::InvalidTimestamp;
        }

        let v = &sample.voltage_rms;
        if !positive(v.avg) || !non_negative(v.min) || !positive(v.max) || v.max > self.max_voltage
        {
            return ValidationOutcome::InvalidVoltage;
        }

        let i = &sample.current_rms;
        if !non_negative(i.min) || !non_negative(i.max) {
            return ValidationOutcome::InvalidCurrent;
        }

        let f = &sample.frequency;
        if !positive(f.avg) || !positive(f.min) || !positive(f.max) {
            return ValidationOutcome::InvalidFrequency;
        }

        if !non_negative(sample.apparent_power.avg) || !non_negative(sample.real_power.avg) {
            return ValidationOutcome::InvalidPower;
        }

        ValidationOutcome::Valid
    }

    fn timestamp_ok(&self, timestamp: NaiveDateTime, now: NaiveDateTime) -> bool {
        !is_unset(timestamp) && timestamp <= now && timestamp.year() >= self.min_year
    }
}

impl Default for SampleValidator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

/// Validate with the default limits
pub fn validate_sample(sample: &ChargingSample, now: NaiveDateTime) -> ValidationOutcome {
    SampleValidator::default().validate(sample, now)
}

fn is_unset(timestamp: NaiveDateTime) -> bool {
    timestamp == NaiveDateTime::default() || timestamp == NaiveDateTime::MIN
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
