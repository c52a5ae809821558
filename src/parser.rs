//! Record parser for delimited charging profiles
//!
//! Turns one raw text row into a [`ChargingSample`]. The parser is strict: a
//! row is rejected outright when it is short, when its timestamp matches no
//! supported format, or when any of the 18 measurements is not a number. A
//! rejected row is never forwarded as a zero-filled sample.
//!
//! Expected layout: timestamp followed by the 18 measurements in canonical
//! order. An optional 20th column (the producer's own index) is ignored;
//! the row index is always supplied by the caller.

use crate::error::ChargelogError;
use crate::sample::{ChargingSample, MEASUREMENT_COUNT};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Minimum number of fields in a data row
pub const MIN_FIELDS: usize = MEASUREMENT_COUNT + 1;

/// Exact timestamp formats, tried in order
const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%-m/%-d/%Y %-H:%M:%S",
];

/// Looser formats used when none of the exact ones match
const FALLBACK_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M",
];

const FALLBACK_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Why a row was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("empty line")]
    Empty,

    #[error("expected at least {MIN_FIELDS} fields, found {found}")]
    TooFewFields { found: usize },

    #[error("unrecognized timestamp '{value}'")]
    InvalidTimestamp { value: String },

    #[error("column {column}: '{value}' is not a number")]
    InvalidNumber { column: usize, value: String },
}

impl From<RecordError> for ChargelogError {
    fn from(err: RecordError) -> Self {
        Self::parse(err.to_string())
    }
}

/// Pick the field delimiter from a header line.
///
/// Semicolon wins only when it occurs strictly more often than comma.
pub fn detect_delimiter(header: &str) -> u8 {
    let semicolons = header.bytes().filter(|&b| b == b';').count();
    let commas = header.bytes().filter(|&b| b == b',').count();
    if semicolons > commas { b';' } else { b',' }
}

/// Parse a timestamp using the supported formats, then a general fallback
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    TIMESTAMP_FORMATS
        .iter()
        .chain(FALLBACK_FORMATS.iter())
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a decimal number with `.` as decimal point and optional `,` thousands separators
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let (integer, rest) = s
        .find(['.', 'e', 'E'])
        .map_or((s, ""), |idx| s.split_at(idx));
    if rest.contains(',') {
        return None;
    }

    let cleaned: String = if integer.contains(',') {
        let digits = integer.trim_start_matches(['+', '-']);
        if digits.starts_with(',') || digits.ends_with(',') {
            return None;
        }
        integer.chars().filter(|&c| c != ',').chain(rest.chars()).collect()
    } else {
        s.to_string()
    };

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Stateless parser bound to one delimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordParser {
    delimiter: u8,
}

impl RecordParser {
    pub const fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Build a parser for a file whose first line is `header`
    pub fn for_header(header: &str) -> Self {
        Self::new(detect_delimiter(header))
    }

    pub const fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Parse one raw line.
    ///
    /// Quoted fields are honoured within the line only; an unterminated
    /// quote swallows the rest of this line and nothing else.
    pub fn parse_line(
        &self,
        line: &str,
        row_index: u64,
        vehicle_id: &str,
    ) -> Result<ChargingSample, RecordError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(RecordError::Empty);
        }

        let mut fields = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());
        let mut record = csv::StringRecord::new();
        match fields.read_record(&mut record) {
            Ok(true) => {
                let fields: Vec<&str> = record.iter().collect();
                parse_fields(&fields, row_index, vehicle_id)
            }
            _ => {
                let fields: Vec<&str> = line.split(char::from(self.delimiter)).collect();
                parse_fields(&fields, row_index, vehicle_id)
            }
        }
    }
}

/// Parse already split fields
pub fn parse_fields<S: AsRef<str>>(
    fields: &[S],
    row_index: u64,
    vehicle_id: &str,
) -> Result<ChargingSample, RecordError> {
    if fields.iter().all(|f| f.as_ref().trim().is_empty()) {
        return Err(RecordError::Empty);
    }
    if fields.len() < MIN_FIELDS {
        return Err(RecordError::TooFewFields {
            found: fields.len(),
        });
    }

    let raw_ts = fields[0].as_ref();
    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| RecordError::InvalidTimestamp {
        value: raw_ts.trim().to_string(),
    })?;

    let mut values = [0.0_f64; MEASUREMENT_COUNT];
    for (i, slot) in values.iter_mut().enumerate() {
        let column = i + 1;
        let raw = fields[column].as_ref();
        *slot = parse_number(raw).ok_or_else(|| RecordError::InvalidNumber {
            column,
            value: raw.trim().to_string(),
        })?;
    }

    Ok(ChargingSample::from_measurements(
        vehicle_id, timestamp, values, row_index,
    ))
}
