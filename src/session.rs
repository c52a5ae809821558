//! Charging session management for Chargelog
//!
//! The [`SessionManager`] owns every open session, keyed by vehicle ID. A
//! session is created by `start_session`, receives samples through
//! `push_sample` and is closed by `end_session`; each session writes its
//! accepted and rejected samples to its own pair of logs.
//!
//! Locking: the session map is guarded by a mutex that is only held to
//! insert, look up or remove an entry. All file I/O happens under the
//! per-session mutex, so sessions of different vehicles never wait for each
//! other's disk writes.

use crate::anomaly::AnomalyDetector;
use crate::config::Config;
use crate::error::{ChargelogError, Result};
use crate::events::{EventBus, TransferEventKind};
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::persistence::{SessionLogPaths, SessionLogs, is_safe_component};
use crate::sample::ChargingSample;
use crate::validation::{SampleValidator, ValidationOutcome};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of pushing one sample into an open session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Sample was valid and appended; carries the new accepted count
    Accepted { sample_count: u64 },
    /// Sample failed validation and went to the rejects log
    Rejected(ValidationOutcome),
}

impl PushOutcome {
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Totals reported when a session ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionSummary {
    pub session_id: String,
    pub vehicle_id: String,
    pub sample_count: u64,
    pub rejected_count: u64,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub accepted_log: PathBuf,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub rejected_log: PathBuf,
}

/// Point-in-time view of an open session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionSnapshot {
    pub session_id: String,
    pub vehicle_id: String,
    pub started_at: DateTime<Utc>,
    pub sample_count: u64,
    pub rejected_count: u64,
}

/// State of one open session
#[derive(Debug)]
struct Session {
    id: String,
    vehicle_id: String,
    started_at: DateTime<Utc>,
    sample_count: u64,
    rejected_count: u64,
    last_sample: Option<ChargingSample>,
    /// `None` once the session has been ended
    logs: Option<SessionLogs>,
}

impl Session {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            vehicle_id: self.vehicle_id.clone(),
            started_at: self.started_at,
            sample_count: self.sample_count,
            rejected_count: self.rejected_count,
        }
    }
}

type SessionHandle = Arc<Mutex<Session>>;

/// Registry of open charging sessions
pub struct SessionManager {
    data_root: PathBuf,
    validator: SampleValidator,
    detector: AnomalyDetector,
    events: EventBus,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    logger: StructuredLogger,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("data_root", &self.data_root)
            .field("active_sessions", &lock(&self.sessions).len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a session manager from configuration
    pub fn new(config: &Config, events: EventBus) -> Self {
        Self {
            data_root: config.data_root_path(),
            validator: SampleValidator::new(&config.validation),
            detector: AnomalyDetector::new(&config.anomaly),
            events,
            sessions: Mutex::new(HashMap::new()),
            logger: get_logger("session"),
        }
    }

    pub fn data_root(&self) -> &std::path::Path {
        &self.data_root
    }

    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Open a new session for `vehicle_id` and return its session ID
    pub fn start_session(&self, vehicle_id: &str) -> Result<String> {
        check_vehicle_id(vehicle_id)?;
        if self.is_active(vehicle_id) {
            return Err(ChargelogError::session_already_active(vehicle_id));
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let paths = SessionLogPaths::new(
            &self.data_root,
            vehicle_id,
            Local::now().date_naive(),
            &session_id,
        );
        let logs = SessionLogs::create(paths).inspect_err(|e| {
            self.logger
                .error(&format!("Error starting session for vehicle {vehicle_id}: {e}"));
        })?;

        let session = Session {
            id: session_id.clone(),
            vehicle_id: vehicle_id.to_string(),
            started_at: Utc::now(),
            sample_count: 0,
            rejected_count: 0,
            last_sample: None,
            logs: Some(logs),
        };

        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(vehicle_id) {
            drop(sessions);
            // Lost a race with another start for the same vehicle
            if let Some(logs) = session.logs
                && let Ok(paths) = logs.close()
            {
                paths.remove_files();
            }
            return Err(ChargelogError::session_already_active(vehicle_id));
        }
        sessions.insert(vehicle_id.to_string(), Arc::new(Mutex::new(session)));
        drop(sessions);

        self.events.emit(
            TransferEventKind::SessionStarted,
            vehicle_id,
            format!("Session started: {session_id}"),
        );
        self.session_logger(vehicle_id, &session_id).info(&format!(
            "Session started for vehicle {vehicle_id}, ID: {session_id}"
        ));

        Ok(session_id)
    }

    /// Validate and record one sample for the vehicle named in the sample
    pub fn push_sample(&self, sample: &ChargingSample) -> Result<PushOutcome> {
        let handle = self
            .lookup(&sample.vehicle_id)
            .ok_or_else(|| ChargelogError::no_active_session(&sample.vehicle_id))?;
        let mut guard = lock(&handle);
        let session = &mut *guard;
        let Some(logs) = session.logs.as_mut() else {
            // Ended between lookup and lock
            return Err(ChargelogError::no_active_session(&sample.vehicle_id));
        };

        let outcome = self
            .validator
            .validate(sample, Local::now().naive_local());
        if !outcome.is_valid() {
            logs.append_rejected(sample, outcome.reason())
                .inspect_err(|e| {
                    self.session_logger(&session.vehicle_id, &session.id)
                        .error(&format!("Error writing rejected sample: {e}"));
                })?;
            session.rejected_count += 1;
            self.session_logger(&session.vehicle_id, &session.id).debug(&format!(
                "Rejected row {}: {}",
                sample.row_index,
                outcome.reason()
            ));
            return Ok(PushOutcome::Rejected(outcome));
        }

        for anomaly in self.detector.detect(session.last_sample.as_ref(), sample) {
            self.events.emit(
                TransferEventKind::WarningRaised,
                &session.vehicle_id,
                anomaly.to_string(),
            );
        }

        logs.append_accepted(sample).inspect_err(|e| {
            self.session_logger(&session.vehicle_id, &session.id)
                .error(&format!("Error writing accepted sample: {e}"));
        })?;
        session.sample_count += 1;
        session.last_sample = Some(sample.clone());

        self.events.emit(
            TransferEventKind::SampleReceived,
            &session.vehicle_id,
            format!("Sample {} received", session.sample_count),
        );

        Ok(PushOutcome::Accepted {
            sample_count: session.sample_count,
        })
    }

    /// Write a row that failed to parse to the rejects log of `vehicle_id`.
    ///
    /// The row is never validated; it counts towards the rejected total.
    pub fn record_unparsed(&self, vehicle_id: &str, row_index: u64, reason: &str) -> Result<()> {
        let handle = self
            .lookup(vehicle_id)
            .ok_or_else(|| ChargelogError::no_active_session(vehicle_id))?;
        let mut guard = lock(&handle);
        let session = &mut *guard;
        let Some(logs) = session.logs.as_mut() else {
            return Err(ChargelogError::no_active_session(vehicle_id));
        };

        logs.append_unparsed(row_index, reason).inspect_err(|e| {
            self.session_logger(&session.vehicle_id, &session.id)
                .error(&format!("Error writing unparsed row: {e}"));
        })?;
        session.rejected_count += 1;
        Ok(())
    }

    /// Close the session of `vehicle_id`, releasing both logs
    pub fn end_session(&self, vehicle_id: &str) -> Result<SessionSummary> {
        let handle = lock(&self.sessions)
            .remove(vehicle_id)
            .ok_or_else(|| ChargelogError::no_active_session(vehicle_id))?;
        let mut session = lock(&handle);
        let logs = session
            .logs
            .take()
            .ok_or_else(|| ChargelogError::no_active_session(vehicle_id))?;

        let logger = self.session_logger(vehicle_id, &session.id);
        let paths = logs.close().inspect_err(|e| {
            logger.error(&format!("Error closing session logs: {e}"));
        })?;

        let summary = SessionSummary {
            session_id: session.id.clone(),
            vehicle_id: vehicle_id.to_string(),
            sample_count: session.sample_count,
            rejected_count: session.rejected_count,
            accepted_log: paths.accepted,
            rejected_log: paths.rejected,
        };
        drop(session);

        self.events.emit(
            TransferEventKind::SessionCompleted,
            vehicle_id,
            format!("Session completed. Total samples: {}", summary.sample_count),
        );
        logger.info(&format!(
            "Session ended for vehicle {vehicle_id}, Total samples: {}, rejected: {}",
            summary.sample_count, summary.rejected_count
        ));

        Ok(summary)
    }

    /// Whether a session is open for `vehicle_id`
    pub fn is_active(&self, vehicle_id: &str) -> bool {
        lock(&self.sessions).contains_key(vehicle_id)
    }

    /// Snapshot of every open session, ordered by vehicle ID
    pub fn active_sessions(&self) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> = lock(&self.sessions).values().cloned().collect();
        let mut snapshots: Vec<SessionSnapshot> = handles
            .iter()
            .map(|handle| lock(handle))
            .filter(|session| session.logs.is_some())
            .map(|session| session.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        snapshots
    }

    /// End every open session; used when the process stops
    pub fn shutdown(&self) -> Vec<SessionSummary> {
        let vehicles: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        let mut summaries = Vec::with_capacity(vehicles.len());
        for vehicle_id in vehicles {
            match self.end_session(&vehicle_id) {
                Ok(summary) => summaries.push(summary),
                Err(ChargelogError::NoActiveSession { .. }) => {}
                Err(e) => self
                    .logger
                    .error(&format!("Failed to end session for {vehicle_id}: {e}")),
            }
        }
        if !summaries.is_empty() {
            self.logger
                .info(&format!("Closed {} open session(s) on shutdown", summaries.len()));
        }
        summaries
    }

    fn lookup(&self, vehicle_id: &str) -> Option<SessionHandle> {
        lock(&self.sessions).get(vehicle_id).cloned()
    }

    fn session_logger(&self, vehicle_id: &str, session_id: &str) -> StructuredLogger {
        get_logger_with_context(
            LogContext::new(&self.logger.context.component)
                .with_vehicle_id(vehicle_id.to_string())
                .with_session_id(session_id.to_string()),
        )
    }
}

fn check_vehicle_id(vehicle_id: &str) -> Result<()> {
    if vehicle_id.trim().is_empty() {
        return Err(ChargelogError::EmptyIdentifier);
    }
    if !is_safe_component(vehicle_id) {
        return Err(ChargelogError::InvalidIdentifier {
            vehicle_id: vehicle_id.to_string(),
        });
    }
    Ok(())
}

/// Lock a mutex, recovering the data if a previous holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
