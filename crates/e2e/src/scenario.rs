//! Declarative YAML scenarios
//!
//! A scenario is an ordered list of typed UI actions. Each variant maps to
//! exactly one executor operation; there is no string dispatch.

use serde::{Deserialize, Serialize};
use std::path::Path;

use pihr_common::{Candidate, EventKind, RetryPolicy, WaitState};

use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Retry policy for every step; the suite default when absent
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Skip this scenario
    #[serde(default)]
    pub skip: bool,

    /// Steps to execute in order
    pub steps: Vec<UiAction>,
}

/// A single UI action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UiAction {
    /// Navigate to a URL (relative to the base URL)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Wait for visibility, then click
    Click {
        selector: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
        /// Set to false for clicks that must not be repeated (e.g. submits)
        #[serde(default = "default_true")]
        retry: bool,
    },

    /// Wait for visibility, then replace the field's value.
    /// `${VAR}` in `value` is expanded from the environment.
    Fill {
        selector: String,
        value: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Pick between alternate UI paths depending on whether `selector`
    /// becomes visible within the timeout
    Branch {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        present: Vec<UiAction>,
        #[serde(default)]
        absent: Vec<UiAction>,
    },

    /// Click something that opens a popup or starts a download
    ExpectEvent {
        selector: String,
        event: EventKind,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_event_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        url_contains: Option<String>,
        #[serde(default)]
        filename_suffix: Option<String>,
        #[serde(default = "default_true")]
        retry: bool,
    },

    /// Assert an element's text contains a substring
    AssertText {
        selector: String,
        contains: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Assert the current URL contains a substring
    AssertUrl {
        contains: String,
    },

    /// Best-effort wait for network idle
    SettleNetwork {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
    },

    /// Log a diagnostic snapshot; uses the configured candidates when empty
    Snapshot {
        #[serde(default)]
        candidates: Vec<Candidate>,
        #[serde(default)]
        max_controls: Option<usize>,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_wait_timeout() -> u64 {
    5000
}

fn default_event_timeout() -> u64 {
    30_000
}

impl UiAction {
    /// Short label used in logs and results
    pub fn step_name(&self) -> String {
        match self {
            UiAction::Navigate { url, .. } => format!("navigate:{}", url),
            UiAction::Click {
                selector,
                description,
                ..
            } => format!("click:{}", description.as_deref().unwrap_or(selector)),
            UiAction::Fill {
                selector,
                description,
                ..
            } => format!("fill:{}", description.as_deref().unwrap_or(selector)),
            UiAction::Wait { selector, state, .. } => format!("wait:{}:{}", selector, state),
            UiAction::Branch { selector, .. } => format!("branch:{}", selector),
            UiAction::ExpectEvent {
                selector, event, ..
            } => format!("{}:{}", event, selector),
            UiAction::AssertText { selector, .. } => format!("assert_text:{}", selector),
            UiAction::AssertUrl { contains } => format!("assert_url:{}", contains),
            UiAction::SettleNetwork { .. } => "settle_network".to_string(),
            UiAction::Screenshot { name } => format!("screenshot:{}", name),
            UiAction::Snapshot { .. } => "snapshot".to_string(),
            UiAction::Sleep { ms } => format!("sleep:{}ms", ms),
            UiAction::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }

    /// Whether the runner may retry this action under the scenario policy
    pub fn retryable(&self) -> bool {
        match self {
            UiAction::Click { retry, .. } | UiAction::ExpectEvent { retry, .. } => *retry,
            UiAction::Navigate { .. }
            | UiAction::Fill { .. }
            | UiAction::Wait { .. }
            | UiAction::AssertText { .. }
            | UiAction::AssertUrl { .. }
            | UiAction::Screenshot { .. } => true,
            UiAction::Branch { .. }
            | UiAction::SettleNetwork { .. }
            | UiAction::Snapshot { .. }
            | UiAction::Sleep { .. }
            | UiAction::Log { .. } => false,
        }
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        if scenario.steps.is_empty() {
            return Err(E2eError::SpecParse(format!(
                "scenario '{}' has no steps",
                scenario.name
            )));
        }
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        scenarios.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }
}

/// Expand `${VAR}` references using `lookup`; unknown variables are an error
pub fn expand_vars<F>(input: &str, lookup: F) -> E2eResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| E2eError::SpecParse(format!("unterminated variable in {:?}", input)))?;
        let name = &after[..end];
        let value = lookup(name)
            .ok_or_else(|| E2eError::SpecParse(format!("variable {} is not set", name)))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
