//! Charging telemetry sample model
//!
//! A [`ChargingSample`] carries one timestamped record of 18 measurements,
//! grouped as six min/avg/max triads. The triad order defined here is the
//! canonical column order used by the record parser and the session logs.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format written to the session logs
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of numeric measurements carried by a sample
pub const MEASUREMENT_COUNT: usize = 18;

/// Header of the accepted-data log
pub const ACCEPTED_LOG_HEADER: [&str; MEASUREMENT_COUNT + 2] = [
    "Timestamp",
    "VoltageRmsMin",
    "VoltageRmsAvg",
    "VoltageRmsMax",
    "CurrentRmsMin",
    "CurrentRmsAvg",
    "CurrentRmsMax",
    "RealPowerMin",
    "RealPowerAvg",
    "RealPowerMax",
    "ReactivePowerMin",
    "ReactivePowerAvg",
    "ReactivePowerMax",
    "ApparentPowerMin",
    "ApparentPowerAvg",
    "ApparentPowerMax",
    "FrequencyMin",
    "FrequencyAvg",
    "FrequencyMax",
    "RowIndex",
];

/// Header of the rejected-data log
pub const REJECTED_LOG_HEADER: [&str; 3] = ["Timestamp", "Reason", "RawData"];

/// Minimum, average and maximum of one quantity over the sample window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Triad {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl Triad {
    pub const fn new(min: f64, avg: f64, max: f64) -> Self {
        Self { min, avg, max }
    }
}

/// One telemetry record for a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChargingSample {
    /// Vehicle the sample belongs to
    pub vehicle_id: String,

    /// Wall-clock time of the measurement window; defaults to the unset sentinel
    #[serde(default)]
    pub timestamp: NaiveDateTime,

    /// RMS voltage (V)
    pub voltage_rms: Triad,

    /// RMS current (A)
    pub current_rms: Triad,

    /// Real power (W)
    pub real_power: Triad,

    /// Reactive power (var)
    pub reactive_power: Triad,

    /// Apparent power (VA)
    pub apparent_power: Triad,

    /// Grid frequency (Hz)
    pub frequency: Triad,

    /// Producer-assigned position in the source feed
    #[serde(default)]
    pub row_index: u64,
}

impl ChargingSample {
    /// Build a sample from the 18 measurements in canonical order
    pub fn from_measurements(
        vehicle_id: impl Into<String>,
        timestamp: NaiveDateTime,
        values: [f64; MEASUREMENT_COUNT],
        row_index: u64,
    ) -> Self {
        let triad = |i: usize| Triad::new(values[i], values[i + 1], values[i + 2]);
        Self {
            vehicle_id: vehicle_id.into(),
            timestamp,
            voltage_rms: triad(0),
            current_rms: triad(3),
            real_power: triad(6),
            reactive_power: triad(9),
            apparent_power: triad(12),
            frequency: triad(15),
            row_index,
        }
    }

    /// The 18 measurements in canonical order
    pub const fn measurements(&self) -> [f64; MEASUREMENT_COUNT] {
        let t = [
            self.voltage_rms,
            self.current_rms,
            self.real_power,
            self.reactive_power,
            self.apparent_power,
            self.frequency,
        ];
        [
            t[0].min, t[0].avg, t[0].max, t[1].min, t[1].avg, t[1].max, t[2].min, t[2].avg,
            t[2].max, t[3].min, t[3].avg, t[3].max, t[4].min, t[4].avg, t[4].max, t[5].min,
            t[5].avg, t[5].max,
        ]
    }

    /// Timestamp rendered in the log format
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(LOG_TIMESTAMP_FORMAT).to_string()
    }

    /// Power factor (real / apparent), when apparent power is positive
    pub fn power_factor(&self) -> Option<f64> {
        (self.apparent_power.avg > 0.0).then(|| self.real_power.avg / self.apparent_power.avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 8, 4)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap()
    }

    #[test]
    fn measurements_follow_canonical_order() {
        let values: [f64; MEASUREMENT_COUNT] = std::array::from_fn(|i| i as f64);
        let sample = ChargingSample::from_measurements("Lexus", ts(), values, 7);
        assert_eq!(sample.measurements(), values);
        assert!((sample.current_rms.avg - 4.0).abs() < f64::EPSILON);
        assert!((sample.frequency.max - 17.0).abs() < f64::EPSILON);
        assert_eq!(sample.row_index, 7);
    }

    #[test]
    fn formatted_timestamp_uses_log_format() {
        let sample = ChargingSample::from_measurements("Lexus", ts(), [1.0; 18], 1);
        assert_eq!(sample.formatted_timestamp(), "2023-08-04 10:15:00");
    }

    #[test]
    fn power_factor_requires_positive_apparent_power() {
        let mut sample = ChargingSample::from_measurements("Lexus", ts(), [1.0; 18], 1);
        sample.real_power.avg = 1700.0;
        sample.apparent_power.avg = 2000.0;
        assert!((sample.power_factor().unwrap() - 0.85).abs() < 1e-9);

        sample.apparent_power.avg = 0.0;
        assert!(sample.power_factor().is_none());
    }

    #[test]
    fn missing_timestamp_deserializes_to_sentinel() {
        let json = serde_json::json!({
            "vehicle_id": "Kia_Nero",
            "voltage_rms": {"min": 1.0, "avg": 1.0, "max": 1.0},
            "current_rms": {"min": 1.0, "avg": 1.0, "max": 1.0},
            "real_power": {"min": 1.0, "avg": 1.0, "max": 1.0},
            "reactive_power": {"min": 1.0, "avg": 1.0, "max": 1.0},
            "apparent_power": {"min": 1.0, "avg": 1.0, "max": 1.0},
            "frequency": {"min": 1.0, "avg": 1.0, "max": 1.0}
        });
        let sample: ChargingSample = serde_json::from_value(json).unwrap();
        assert_eq!(sample.timestamp, NaiveDateTime::default());
        assert_eq!(sample.row_index, 0);
    }
}
