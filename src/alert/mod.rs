//! Alert events raised by the strategy.
//!
//! Alerts are the only notification channel beyond routine logs: entries,
//! exits, and anything that threatens position integrity. Emission is
//! fire-and-forget; the sink does not acknowledge.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    /// Get display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// What happened.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum AlertKind {
    /// Hedge pair opened
    Entered {
        spot_qty: Decimal,
        perp_qty: Decimal,
        funding_rate: Decimal,
    },
    /// Hedge pair closed
    Exited {
        funding_rate: Decimal,
    },
    /// One leg filled, its pair did not
    LegMismatch {
        detail: String,
    },
    /// Order submission or unwind failed
    ExecutionFailure {
        detail: String,
    },
}

/// A single alert event.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for alert events. Fire-and-forget, no acknowledgment.
pub trait AlertSink: Send + Sync {
    fn emit(&self, event: AlertEvent);
}

/// Sink that routes alerts through the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn emit(&self, event: AlertEvent) {
        match event.severity {
            AlertSeverity::Info => {
                info!(kind = ?event.kind, "[ALERT] {}", event.message)
            }
            AlertSeverity::Warning => {
                warn!(kind = ?event.kind, "[ALERT] {}", event.message)
            }
            AlertSeverity::Error | AlertSeverity::Critical => {
                error!(
                    kind = ?event.kind,
                    severity = event.severity.as_str(),
                    "[ALERT] {}",
                    event.message
                )
            }
        }
    }
}

/// Sink that buffers alerts in memory. Used by tests to assert on sequences.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    events: std::sync::Mutex<Vec<AlertEvent>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events emitted so far.
    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().expect("alert sink poisoned").clone()
    }

    /// Kinds only, in emission order.
    pub fn kinds(&self) -> Vec<AlertKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl AlertSink for MemoryAlertSink {
    fn emit(&self, event: AlertEvent) {
        self.events.lock().expect("alert sink poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_severity_display() {
        assert_eq!(AlertSeverity::Critical.as_str(), "CRITICAL");
        assert_eq!(AlertSeverity::Info.as_str(), "INFO");
    }

    #[test]
    fn test_memory_sink_preserves_order() {
        let sink = MemoryAlertSink::new();
        sink.emit(AlertEvent::new(
            AlertKind::Entered {
                spot_qty: dec!(0.001),
                perp_qty: dec!(0.001),
                funding_rate: dec!(0.0002),
            },
            AlertSeverity::Info,
            "entered",
        ));
        sink.emit(AlertEvent::new(
            AlertKind::Exited {
                funding_rate: dec!(0.00005),
            },
            AlertSeverity::Info,
            "exited",
        ));

        let kinds = sink.kinds();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(kinds[0], AlertKind::Entered { .. }));
        assert!(matches!(kinds[1], AlertKind::Exited { .. }));
    }
}
