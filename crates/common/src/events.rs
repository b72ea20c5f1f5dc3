//! Structured diagnostic event log
//!
//! Every retry failure, wrapper failure and snapshot probe is recorded here
//! as a `{ timestamp, severity, component, message }` event and mirrored to
//! `tracing`. Tests query the log instead of scraping console output.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub component: String,
    pub message: String,
}

/// Shared, append-only event log. Cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<DiagnosticEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and mirror it to tracing
    pub fn record(&self, severity: Severity, component: &str, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Debug => debug!(component, "{}", message),
            Severity::Info => info!(component, "{}", message),
            Severity::Warn => warn!(component, "{}", message),
            Severity::Error => error!(component, "{}", message),
        }

        self.events.lock().push(DiagnosticEvent {
            timestamp: Utc::now(),
            severity,
            component: component.to_string(),
            message,
        });
    }

    pub fn debug(&self, component: &str, message: impl Into<String>) {
        self.record(Severity::Debug, component, message);
    }

    pub fn info(&self, component: &str, message: impl Into<String>) {
        self.record(Severity::Info, component, message);
    }

    pub fn warn(&self, component: &str, message: impl Into<String>) {
        self.record(Severity::Warn, component, message);
    }

    pub fn error(&self, component: &str, message: impl Into<String>) {
        self.record(Severity::Error, component, message);
    }

    /// Copy of all events recorded so far
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn by_component(&self, component: &str) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.component == component)
            .cloned()
            .collect()
    }

    pub fn at_least(&self, severity: Severity) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.severity >= severity)
            .cloned()
            .collect()
    }

    /// Whether any event message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.events.lock().iter().any(|e| e.message.contains(needle))
    }

    /// Remove and return all events
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_query() {
        let log = EventLog::new();
        log.warn("retry", "Attempt 1 failed: boom");
        log.info("diagnostics", "URL: https://example.test");
        log.error("retry", "giving up");

        assert_eq!(log.len(), 3);
        assert_eq!(log.by_component("retry").len(), 2);
        assert_eq!(log.at_least(Severity::Warn).len(), 2);
        assert!(log.contains("boom"));
        assert!(!log.contains("missing"));
    }

    #[test]
    fn test_clones_share_buffer() {
        let log = EventLog::new();
        let other = log.clone();
        other.debug("x", "hello");
        assert_eq!(log.len(), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert!(other.is_empty());
    }
}
