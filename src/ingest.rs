//! Feeding charging profile files into a session
//!
//! Reads a delimited profile (header line followed by data rows), opens a
//! session for the vehicle, pushes every row that parses and always ends
//! the session afterwards. Rows that fail to parse never reach validation;
//! they are counted and written to the session's rejects log.

use crate::error::{ChargelogError, Result};
use crate::logging::{LogContext, get_logger_with_context};
use crate::parser::{RecordError, RecordParser};
use crate::sample::ChargingSample;
use crate::session::{PushOutcome, SessionManager, SessionSummary};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Anything that accepts a session's worth of samples
pub trait SampleSink {
    fn start_session(&self, vehicle_id: &str) -> Result<String>;
    fn push_sample(&self, sample: &ChargingSample) -> Result<PushOutcome>;
    /// Note a row that could not be parsed into a sample
    fn record_unparsed(&self, vehicle_id: &str, row_index: u64, reason: &str) -> Result<()>;
    fn end_session(&self, vehicle_id: &str) -> Result<SessionSummary>;
}

impl SampleSink for SessionManager {
    fn start_session(&self, vehicle_id: &str) -> Result<String> {
        Self::start_session(self, vehicle_id)
    }

    fn push_sample(&self, sample: &ChargingSample) -> Result<PushOutcome> {
        Self::push_sample(self, sample)
    }

    fn record_unparsed(&self, vehicle_id: &str, row_index: u64, reason: &str) -> Result<()> {
        Self::record_unparsed(self, vehicle_id, row_index, reason)
    }

    fn end_session(&self, vehicle_id: &str) -> Result<SessionSummary> {
        Self::end_session(self, vehicle_id)
    }
}

/// Counters for one ingested file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub vehicle_id: String,
    pub session_id: String,
    /// Data rows read, blank lines excluded
    pub rows: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub parse_failed: u64,
    /// Rows the sink failed to record (storage errors)
    pub push_failed: u64,
    pub summary: Option<SessionSummary>,
}

impl IngestReport {
    /// Rows that did not end up in the accepted log
    pub const fn errors(&self) -> u64 {
        self.rejected + self.parse_failed + self.push_failed
    }
}

/// Ingest the profile at `path` for `vehicle_id`
pub fn ingest_file<S: SampleSink + ?Sized>(
    sink: &S,
    path: &Path,
    vehicle_id: &str,
) -> Result<IngestReport> {
    let file = File::open(path)
        .map_err(|e| ChargelogError::io(format!("Failed to open {}: {e}", path.display())))?;
    ingest_reader(sink, file, vehicle_id)
}

/// Ingest a profile from any reader.
///
/// Every physical line after the header is one row; its row index is the
/// line number minus one, blank lines included.
pub fn ingest_reader<S: SampleSink + ?Sized, R: Read>(
    sink: &S,
    reader: R,
    vehicle_id: &str,
) -> Result<IngestReport> {
    let logger = get_logger_with_context(
        LogContext::new("ingest").with_vehicle_id(vehicle_id.to_string()),
    );

    let mut reader = BufReader::new(reader);
    let mut header = String::new();
    if reader.read_line(&mut header)? == 0 || header.trim().is_empty() {
        return Err(ChargelogError::parse("Empty CSV"));
    }
    let parser = RecordParser::for_header(&header);
    logger.debug(&format!(
        "Detected delimiter '{}' from header",
        char::from(parser.delimiter())
    ));

    let session_id = sink.start_session(vehicle_id)?;
    let mut report = IngestReport {
        vehicle_id: vehicle_id.to_string(),
        session_id,
        ..IngestReport::default()
    };

    let mut feed_error = None;
    for (row_index, line) in (1_u64..).zip(reader.split(b'\n')) {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                feed_error = Some(ChargelogError::from(e));
                break;
            }
        };
        let line = String::from_utf8_lossy(&line);

        let sample = match parser.parse_line(&line, row_index, vehicle_id) {
            Ok(sample) => sample,
            Err(RecordError::Empty) => continue,
            Err(e) => {
                report.rows += 1;
                report.parse_failed += 1;
                logger.warn(&format!("Row {row_index}: Parse error - {e}"));
                if let Err(e) =
                    sink.record_unparsed(vehicle_id, row_index, &format!("Parse error - {e}"))
                {
                    logger.error(&format!("Row {row_index}: {e}"));
                }
                continue;
            }
        };
        report.rows += 1;

        match sink.push_sample(&sample) {
            Ok(PushOutcome::Accepted { .. }) => report.accepted += 1,
            Ok(PushOutcome::Rejected(outcome)) => {
                report.rejected += 1;
                logger.debug(&format!("Row {row_index}: {outcome}"));
            }
            Err(e) => {
                report.push_failed += 1;
                logger.error(&format!("Row {row_index}: {e}"));
            }
        }
    }

    match sink.end_session(vehicle_id) {
        Ok(summary) => report.summary = Some(summary),
        Err(e) => logger.error(&format!("Failed to end session: {e}")),
    }

    if let Some(e) = feed_error {
        logger.error(&format!("Reading profile failed: {e}"));
        return Err(e);
    }

    logger.info(&format!(
        "Transfer completed for {vehicle_id}: {} success, {} errors",
        report.accepted,
        report.errors()
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::EventBus;
    use std::cell::RefCell;
    use std::io::Cursor;

    const HEADER: &str = "Timestamp;VoltageRmsMin;VoltageRmsAvg;VoltageRmsMax;CurrentRmsMin;CurrentRmsAvg;CurrentRmsMax;RealPowerMin;RealPowerAvg;RealPowerMax;ReactivePowerMin;ReactivePowerAvg;ReactivePowerMax;ApparentPowerMin;ApparentPowerAvg;ApparentPowerMax;FrequencyMin;FrequencyAvg;FrequencyMax;Index\n";
    const ROW: &str = "2023/08/04 10:15:00;218.0;220.0;222.0;9.5;10.0;10.5;2000;2100;2200;100;110;120;2050;2150;2250;49.9;50.0;50.1;0\n";

    /// Sink that records what it was given
    #[derive(Default)]
    struct RecordingSink {
        pushed: RefCell<Vec<u64>>,
        unparsed: RefCell<Vec<u64>>,
        ended: RefCell<bool>,
    }

    impl SampleSink for RecordingSink {
        fn start_session(&self, _vehicle_id: &str) -> Result<String> {
            Ok("test-session".to_string())
        }

        fn push_sample(&self, sample: &ChargingSample) -> Result<PushOutcome> {
            self.pushed.borrow_mut().push(sample.row_index);
            let count = self.pushed.borrow().len() as u64;
            Ok(PushOutcome::Accepted {
                sample_count: count,
            })
        }

        fn record_unparsed(&self, _vehicle_id: &str, row_index: u64, _reason: &str) -> Result<()> {
            self.unparsed.borrow_mut().push(row_index);
            Ok(())
        }

        fn end_session(&self, vehicle_id: &str) -> Result<SessionSummary> {
            *self.ended.borrow_mut() = true;
            Err(ChargelogError::no_active_session(vehicle_id))
        }
    }

    #[test]
    fn row_index_is_line_number_minus_one() {
        let input = format!("{HEADER}{ROW}2023/08/04 10:16:00;180;;220\n\n{ROW}");
        let sink = RecordingSink::default();
        let report = ingest_reader(&sink, Cursor::new(input), "Tesla_Model3").unwrap();

        assert_eq!(*sink.pushed.borrow(), vec![1, 4]);
        assert_eq!(*sink.unparsed.borrow(), vec![2]);
        assert!(*sink.ended.borrow());
        assert_eq!(report.rows, 3);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.parse_failed, 1);
        assert_eq!(report.errors(), 1);
    }

    #[test]
    fn empty_input_never_starts_a_session() {
        let sink = RecordingSink::default();
        let err = ingest_reader(&sink, Cursor::new(""), "Tesla_Model3").unwrap_err();
        assert!(matches!(err, ChargelogError::Parse { .. }));
        assert!(!*sink.ended.borrow());
    }

    #[test]
    fn comma_profile_with_quoted_thousands() {
        let input = "Timestamp,a,b,c,d,e,f,g,h,i,j,k,l,m,n,o,p,q,r\n\
            2023-08-04 10:15:00,218,220,222,9.5,10,10.5,\"2,000\",2100,2200,100,110,120,2050,2150,2250,49.9,50,50.1\n";
        let sink = RecordingSink::default();
        let report = ingest_reader(&sink, Cursor::new(input), "Kia_EV6").unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.parse_failed, 0);
    }

    #[test]
    fn stray_quote_only_costs_its_own_row() {
        let input = format!("{HEADER}{ROW}2023/08/04 10:16:00;\"218.0;220.0\n{ROW}{ROW}{ROW}");
        let sink = RecordingSink::default();
        let report = ingest_reader(&sink, Cursor::new(input), "Tesla_Model3").unwrap();

        assert_eq!(report.rows, 5);
        assert_eq!(report.accepted, 4);
        assert_eq!(report.parse_failed, 1);
        assert_eq!(*sink.pushed.borrow(), vec![1, 3, 4, 5]);
        assert_eq!(*sink.unparsed.borrow(), vec![2]);
    }

    #[test]
    fn invalid_utf8_row_is_a_parse_failure() {
        let mut input = HEADER.as_bytes().to_vec();
        input.extend_from_slice(b"\xff\xfe;1;2\n");
        input.extend_from_slice(ROW.as_bytes());
        let sink = RecordingSink::default();
        let report = ingest_reader(&sink, Cursor::new(input), "Tesla_Model3").unwrap();

        assert_eq!(report.parse_failed, 1);
        assert_eq!(*sink.pushed.borrow(), vec![2]);
    }

    #[test]
    fn unparsed_rows_land_in_the_rejects_log() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            data_root: tmp.path().to_string_lossy().into_owned(),
            ..Config::default()
        };
        let manager = SessionManager::new(&config, EventBus::new(16));

        let input = format!("{HEADER}{ROW}2023/08/04 10:16:00;180;;220\n");
        let report = ingest_reader(&manager, Cursor::new(input), "Renault_Zoe").unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.parse_failed, 1);
        let summary = report.summary.unwrap();
        assert_eq!(summary.sample_count, 1);
        assert_eq!(summary.rejected_count, 1);

        let rejects = std::fs::read_to_string(summary.rejected_log).unwrap();
        let lines: Vec<&str> = rejects.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            ",\"Parse error - expected at least 19 fields, found 4\",Row2"
        );
    }

    #[test]
    fn feeds_a_real_session_manager() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            data_root: tmp.path().to_string_lossy().into_owned(),
            ..Config::default()
        };
        let manager = SessionManager::new(&config, EventBus::new(16));

        let bad_voltage = ROW.replacen(";220.0;", ";0;", 1);
        let input = format!("{HEADER}{ROW}{bad_voltage}");
        let report = ingest_reader(&manager, Cursor::new(input), "BMW_i4").unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 1);
        let summary = report.summary.unwrap();
        assert_eq!(summary.sample_count, 1);
        assert_eq!(summary.rejected_count, 1);
        assert!(!manager.is_active("BMW_i4"));

        let rejects = std::fs::read_to_string(summary.rejected_log).unwrap();
        assert!(rejects.ends_with(",Invalid voltage values,Row2\n"));
    }
}
