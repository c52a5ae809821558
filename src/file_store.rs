//! Bulk file transfer
//!
//! Raw upload and download of whole files under the data root. Content is
//! stored and returned byte for byte; only the path components are checked.
//! Uploads may not use the `session_`/`rejects_` names owned by session logs.

use crate::error::{ChargelogError, Result};
use crate::logging::get_logger;
use crate::persistence::{
    ACCEPTED_LOG_PREFIX, day_directory, is_safe_component, is_session_log_name,
};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};

/// File store rooted at the configured data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    data_root: PathBuf,
}

impl FileStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Store `content` as `<data_root>/<vehicle_id>/<today>/<file_name>`
    pub fn upload(&self, vehicle_id: &str, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        self.upload_on(vehicle_id, file_name, content, Local::now().date_naive())
    }

    /// Store `content` in the directory of `date`
    pub fn upload_on(
        &self,
        vehicle_id: &str,
        file_name: &str,
        content: &[u8],
        date: NaiveDate,
    ) -> Result<PathBuf> {
        check_component("vehicle_id", vehicle_id)?;
        check_component("file_name", file_name)?;
        if is_session_log_name(file_name) {
            return Err(ChargelogError::validation(
                "file_name".to_string(),
                format!("'{file_name}' is reserved for session logs"),
            ));
        }

        let directory = day_directory(&self.data_root, vehicle_id, date);
        std::fs::create_dir_all(&directory).map_err(|e| {
            ChargelogError::io(format!(
                "Failed to create directory {}: {e}",
                directory.display()
            ))
        })?;
        let path = directory.join(file_name);
        std::fs::write(&path, content)
            .map_err(|e| ChargelogError::io(format!("Failed to write {}: {e}", path.display())))?;

        get_logger("file_store").info(&format!(
            "Stored {} bytes at {}",
            content.len(),
            path.display()
        ));
        Ok(path)
    }

    /// Read back the accepted log of a session recorded on `date`
    pub fn download_session(
        &self,
        vehicle_id: &str,
        session_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<u8>> {
        check_component("vehicle_id", vehicle_id)?;
        check_component("session_id", session_id)?;

        let path =
            day_directory(&self.data_root, vehicle_id, date).join(format!("{ACCEPTED_LOG_PREFIX}{session_id}.csv"));
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChargelogError::not_found(format!("No session file {}", path.display()))
            } else {
                ChargelogError::io(format!("Failed to read {}: {e}", path.display()))
            }
        })
    }
}

fn check_component(field: &str, value: &str) -> Result<()> {
    if is_safe_component(value) {
        Ok(())
    } else {
        Err(ChargelogError::validation(
            field.to_string(),
            format!("'{value}' is not a valid name"),
        ))
    }
}
