//! # Chargelog - EV charging telemetry ingestion
//!
//! Receives per-vehicle charging telemetry, validates every sample and
//! records it in durable per-session logs, one accepted log and one rejects
//! log per session.
//!
//! ## Features
//!
//! - **Session lifecycle**: at most one open session per vehicle
//! - **Validation**: fixed-order plausibility rules with a typed outcome
//! - **Analytics**: voltage/current spike and power factor warnings
//! - **Durable logs**: every record flushed as soon as it is written
//! - **Profile ingestion**: delimited files parsed with a strict-reject parser
//! - **Web Interface**: REST API with server-sent event notifications
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `sample`: Telemetry sample model and log layout
//! - `parser`: Record parser for delimited profiles
//! - `validation`: Sample validation rules
//! - `anomaly`: Advisory anomaly detection
//! - `persistence`: Per-session accepted and rejects logs
//! - `session`: Charging session management
//! - `events`: Observer notifications
//! - `ingest`: Feeding profile files into sessions
//! - `file_store`: Bulk file upload and download
//! - `web`: HTTP server and REST API

pub mod anomaly;
pub mod config;
pub mod error;
pub mod events;
pub mod file_store;
pub mod ingest;
pub mod logging;
pub mod parser;
pub mod persistence;
pub mod sample;
pub mod session;
pub mod validation;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChargelogError, Result};
pub use events::{EventBus, TransferEvent, TransferEventKind};
pub use sample::{ChargingSample, Triad};
pub use session::{PushOutcome, SessionManager, SessionSummary};
pub use validation::ValidationOutcome;

/// Application version, including nightly suffix when built that way
pub const VERSION: &str = env!("APP_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
