//! Observer notifications
//!
//! The session manager reports lifecycle and warning notifications through
//! a broadcast channel. Delivery is fire-and-forget: publishing without
//! subscribers is fine and a subscriber that falls behind loses the oldest
//! events.

use crate::logging::{LogContext, get_logger_with_context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Kind of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum TransferEventKind {
    SessionStarted,
    SampleReceived,
    SessionCompleted,
    WarningRaised,
}

impl TransferEventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::SampleReceived => "sample_received",
            Self::SessionCompleted => "session_completed",
            Self::WarningRaised => "warning_raised",
        }
    }
}

/// One notification for observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TransferEvent {
    pub kind: TransferEventKind,
    pub vehicle_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl TransferEvent {
    pub fn new(kind: TransferEventKind, vehicle_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            vehicle_id: vehicle_id.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Cloneable handle to the notification channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TransferEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: TransferEvent) {
        let _ = self.tx.send(event);
    }

    pub fn emit(&self, kind: TransferEventKind, vehicle_id: &str, message: impl Into<String>) {
        self.publish(TransferEvent::new(kind, vehicle_id, message));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Observer that writes every event to the operational log until the bus closes
pub async fn log_events(mut rx: broadcast::Receiver<TransferEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let logger = get_logger_with_context(
                    LogContext::new("events").with_vehicle_id(event.vehicle_id.clone()),
                );
                match event.kind {
                    TransferEventKind::SessionStarted => {
                        logger.info(&format!("[START] {}", event.message));
                    }
                    TransferEventKind::SampleReceived => {
                        logger.debug(&format!("[DATA] {}", event.message));
                    }
                    TransferEventKind::SessionCompleted => {
                        logger.info(&format!("[COMPLETE] {}", event.message));
                    }
                    TransferEventKind::WarningRaised => {
                        logger.warn(&format!("[WARNING] {}", event.message));
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                crate::logging::get_logger("events")
                    .warn(&format!("Event observer lagged, skipped {skipped} events"));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
