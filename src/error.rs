//! Error types and handling for Chargelog
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting. Caller errors
//! (empty identifier, duplicate or missing session) are ordinary variants so
//! the transport can turn them into structured failure results.

use thiserror::Error;

/// Result type alias for Chargelog operations
pub type Result<T> = std::result::Result<T, ChargelogError>;

/// Main error type for Chargelog
#[derive(Debug, Error)]
pub enum ChargelogError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Malformed input record
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Requested file or record does not exist
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Vehicle identifier was empty
    #[error("Vehicle ID cannot be empty")]
    EmptyIdentifier,

    /// Vehicle identifier cannot be used as a storage path component
    #[error("Invalid vehicle ID: {vehicle_id}")]
    InvalidIdentifier { vehicle_id: String },

    /// A session is already open for the vehicle
    #[error("Session already active for vehicle {vehicle_id}")]
    SessionAlreadyActive { vehicle_id: String },

    /// No session is open for the vehicle
    #[error("No active session for vehicle {vehicle_id}")]
    NoActiveSession { vehicle_id: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl ChargelogError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        Self::Web {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn session_already_active<S: Into<String>>(vehicle_id: S) -> Self {
        Self::SessionAlreadyActive {
            vehicle_id: vehicle_id.into(),
        }
    }

    pub fn no_active_session<S: Into<String>>(vehicle_id: S) -> Self {
        Self::NoActiveSession {
            vehicle_id: vehicle_id.into(),
        }
    }

    /// Whether the error was caused by the caller rather than by storage
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::EmptyIdentifier
                | Self::InvalidIdentifier { .. }
                | Self::SessionAlreadyActive { .. }
                | Self::NoActiveSession { .. }
        )
    }
}

impl From<std::io::Error> for ChargelogError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<csv::Error> for ChargelogError {
    fn from(err: csv::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChargelogError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChargelogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for ChargelogError {
    fn from(err: chrono::ParseError) -> Self {
        Self::validation("datetime", &err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ChargelogError::config("test config error");
        assert!(matches!(err, ChargelogError::Config { .. }));

        let err = ChargelogError::no_active_session("Tesla_Model3");
        assert!(matches!(err, ChargelogError::NoActiveSession { .. }));

        let err = ChargelogError::validation("field", "test validation error");
        assert!(matches!(err, ChargelogError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = ChargelogError::config("test error");
        assert_eq!(err.to_string(), "Configuration error: test error");

        let err = ChargelogError::session_already_active("Kia_Nero");
        assert_eq!(
            err.to_string(),
            "Session already active for vehicle Kia_Nero"
        );

        assert_eq!(
            ChargelogError::EmptyIdentifier.to_string(),
            "Vehicle ID cannot be empty"
        );
    }

    #[test]
    fn test_caller_error_classification() {
        assert!(ChargelogError::EmptyIdentifier.is_caller_error());
        assert!(ChargelogError::no_active_session("x").is_caller_error());
        assert!(!ChargelogError::io("disk full").is_caller_error());
    }
}
