//! Durable per-session logs
//!
//! Every session owns two append-only CSV logs stored under
//! `<data_root>/<vehicle_id>/<yyyy-MM-dd>/`:
//!
//! - `session_<id>.csv` with one line per accepted sample
//! - `rejects_<id>.csv` with one line per rejected sample
//!
//! Both are created with a header row at session start and every record is
//! flushed as soon as it is written, so an acknowledged sample survives a
//! crash of the service.

use crate::error::{ChargelogError, Result};
use crate::logging::get_logger;
use crate::sample::{ACCEPTED_LOG_HEADER, ChargingSample, REJECTED_LOG_HEADER};
use chrono::NaiveDate;
use std::fs::File;
use std::path::{Component, Path, PathBuf};

/// Date format of the per-day storage directory
pub const DATE_DIR_FORMAT: &str = "%Y-%m-%d";

/// File name prefix of accepted logs
pub const ACCEPTED_LOG_PREFIX: &str = "session_";

/// File name prefix of rejects logs
pub const REJECTED_LOG_PREFIX: &str = "rejects_";

/// Whether `file_name` lies in the namespace of session logs
pub fn is_session_log_name(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.starts_with(ACCEPTED_LOG_PREFIX) || lower.starts_with(REJECTED_LOG_PREFIX)
}

/// Whether `name` can be used as exactly one path component under the data root
pub fn is_safe_component(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\']) || name.chars().any(char::is_control) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Directory holding all files of a vehicle for one day
pub fn day_directory(data_root: &Path, vehicle_id: &str, date: NaiveDate) -> PathBuf {
    data_root
        .join(vehicle_id)
        .join(date.format(DATE_DIR_FORMAT).to_string())
}

/// Locations of the two logs of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLogPaths {
    pub directory: PathBuf,
    pub accepted: PathBuf,
    pub rejected: PathBuf,
}

impl SessionLogPaths {
    pub fn new(data_root: &Path, vehicle_id: &str, date: NaiveDate, session_id: &str) -> Self {
        let directory = day_directory(data_root, vehicle_id, date);
        Self {
            accepted: directory.join(format!("{ACCEPTED_LOG_PREFIX}{session_id}.csv")),
            rejected: directory.join(format!("{REJECTED_LOG_PREFIX}{session_id}.csv")),
            directory,
        }
    }

    /// Remove both files, logging any that could not be removed
    pub fn remove_files(&self) {
        remove_logged(&self.accepted);
        remove_logged(&self.rejected);
    }
}

fn remove_logged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        get_logger("persistence").warn(&format!("Failed to remove {}: {e}", path.display()));
    }
}

/// Open writers for the two logs of one session
pub struct SessionLogs {
    paths: SessionLogPaths,
    accepted: csv::Writer<File>,
    rejected: csv::Writer<File>,
}

impl std::fmt::Debug for SessionLogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLogs")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl SessionLogs {
    /// Create the day directory and both logs, writing their headers
    pub fn create(paths: SessionLogPaths) -> Result<Self> {
        std::fs::create_dir_all(&paths.directory).map_err(|e| {
            ChargelogError::io(format!(
                "Failed to create directory {}: {e}",
                paths.directory.display()
            ))
        })?;

        let accepted = open_with_header(&paths.accepted, &ACCEPTED_LOG_HEADER)?;
        let rejected = match open_with_header(&paths.rejected, &REJECTED_LOG_HEADER) {
            Ok(w) => w,
            Err(e) => {
                drop(accepted);
                remove_logged(&paths.accepted);
                return Err(e);
            }
        };

        get_logger("persistence").debug(&format!(
            "Created session logs in {}",
            paths.directory.display()
        ));

        Ok(Self {
            paths,
            accepted,
            rejected,
        })
    }

    pub const fn paths(&self) -> &SessionLogPaths {
        &self.paths
    }

    /// Append one accepted sample: timestamp, 18 measurements, row index
    pub fn append_accepted(&mut self, sample: &ChargingSample) -> Result<()> {
        let mut record = Vec::with_capacity(ACCEPTED_LOG_HEADER.len());
        record.push(sample.formatted_timestamp());
        record.extend(sample.measurements().iter().map(ToString::to_string));
        record.push(sample.row_index.to_string());

        self.accepted.write_record(&record)?;
        self.accepted.flush()?;
        Ok(())
    }

    /// Append one rejected sample: timestamp, reason, row reference
    pub fn append_rejected(&mut self, sample: &ChargingSample, reason: &str) -> Result<()> {
        self.rejected.write_record([
            sample.formatted_timestamp().as_str(),
            reason,
            format!("Row{}", sample.row_index).as_str(),
        ])?;
        self.rejected.flush()?;
        Ok(())
    }

    /// Append a row that never became a sample: empty timestamp, reason, row reference
    pub fn append_unparsed(&mut self, row_index: u64, reason: &str) -> Result<()> {
        self.rejected
            .write_record(["", reason, format!("Row{row_index}").as_str()])?;
        self.rejected.flush()?;
        Ok(())
    }

    /// Flush and release both handles; the handles are dropped even when a flush fails
    pub fn close(mut self) -> Result<SessionLogPaths> {
        let accepted = self.accepted.flush();
        let rejected = self.rejected.flush();
        let Self { paths, .. } = self;
        accepted.map_err(|e| ChargelogError::io(format!("Failed to flush accepted log: {e}")))?;
        rejected.map_err(|e| ChargelogError::io(format!("Failed to flush rejects log: {e}")))?;
        Ok(paths)
    }
}

fn open_with_header(path: &Path, header: &[&str]) -> Result<csv::Writer<File>> {
    let file = File::create(path)
        .map_err(|e| ChargelogError::io(format!("Failed to create {}: {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(header)?;
    writer.flush()?;
    Ok(writer)
}
