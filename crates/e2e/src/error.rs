//! Error types for the executor and runner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Timeout after {timeout_ms}ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Failed to {action} {description}: {source}")]
    ActionFailed {
        action: &'static str,
        description: String,
        #[source]
        source: Box<E2eError>,
    },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] pihr_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    pub fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        E2eError::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Annotate an error with the action and a human description of its target
    pub fn annotate(self, action: &'static str, description: impl Into<String>) -> Self {
        E2eError::ActionFailed {
            action,
            description: description.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error is, or wraps, a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            E2eError::Timeout { .. } => true,
            E2eError::ActionFailed { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
