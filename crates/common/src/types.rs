//! Core value types shared by the executor, the configuration and scenarios

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Delay growth between retry attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Constant `base_delay` before every retry
    #[default]
    Fixed,
    /// `base_delay * 2^(attempt - 1)` before retry `attempt`
    Exponential,
}

/// Bounded retry policy for a flaky action.
///
/// Built through [`RetryPolicy::new`] or deserialization, both of which
/// reject `max_attempts == 0`. Fields are read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, backoff: Backoff) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            base_delay_ms,
            backoff,
        })
    }

    /// A policy that runs the action exactly once
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            backoff: Backoff::Fixed,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Suspension applied after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let millis = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1);
                let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
        };
        Duration::from_millis(millis)
    }

    /// Upper bound on the total time spent sleeping between attempts
    pub fn total_delay_bound(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_for(attempt))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff: Backoff::Fixed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawRetryPolicy {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    base_delay_ms: u64,
    #[serde(default)]
    backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = Error;

    fn try_from(raw: RawRetryPolicy) -> Result<Self> {
        RetryPolicy::new(raw.max_attempts, raw.base_delay_ms, raw.backoff)
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay_ms,
            backoff: policy.backoff,
        }
    }
}

/// Record of one attempt made by the retry engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    /// 1-based attempt index
    pub attempt: u32,
    pub succeeded: bool,
    /// Display form of the failure, if the attempt failed
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Delay slept after this attempt before the next one
    pub delay_after_ms: Option<u64>,
}

/// Element state to wait for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page load states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Browser events a caller can wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new page opened from the current one (e.g. a PDF report tab)
    Popup,
    /// A file download started (e.g. an Excel export)
    Download,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Popup => "popup",
            EventKind::Download => "download",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named element the diagnostic snapshot should look for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub selector: String,
}

impl Candidate {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
        }
    }
}
