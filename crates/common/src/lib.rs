//! PiHR E2E Common Library
//!
//! Shared value types, suite configuration and the structured diagnostic
//! event log used by the resilient-action executor.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

// Re-export commonly used types
pub use config::{Browser, DiagnosticsConfig, SuiteConfig, Viewport};
pub use error::{Error, Result};
pub use events::{DiagnosticEvent, EventLog, Severity};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
