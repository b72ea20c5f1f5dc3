//! Suite configuration
//!
//! Loaded from TOML (defaults when the file is absent), then overridden from
//! the environment variables the PiHR suite has always used.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{Candidate, RetryPolicy};

/// Browser engine to drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(Browser::Chromium),
            "firefox" => Some(Browser::Firefox),
            "webkit" | "safari" => Some(Browser::Webkit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Diagnostic snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Named elements to report presence/visibility for
    pub candidates: Vec<Candidate>,

    /// Selector for generic interactive controls to enumerate
    pub control_selector: String,

    /// Maximum number of controls to enumerate
    pub max_controls: usize,

    /// Capture a snapshot when a scenario step fails
    pub on_failure: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                Candidate::new("Self Service", r#"p:has-text("Self Service")"#),
                Candidate::new("Reports", r#"p:has-text("Reports")"#),
                Candidate::new("My Job Card", r#"button:has-text("My Job Card")"#),
                Candidate::new("Monthly Attendance", r#"button:has-text("Monthly Attendance")"#),
                Candidate::new("Employee Menu", r#"p:has-text("Employee")"#),
            ],
            control_selector: "button".to_string(),
            max_controls: 10,
            on_failure: true,
        }
    }
}

/// Complete suite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Application base URL; relative scenario URLs are joined onto it
    pub base_url: String,

    pub browser: Browser,

    pub headless: bool,

    pub viewport: Viewport,

    /// Visibility timeout used by the safe wrappers
    pub action_timeout_ms: u64,

    /// Timeout for page navigation
    pub navigation_timeout_ms: u64,

    /// Default retry policy for scenario steps
    pub retry: RetryPolicy,

    /// Where screenshots are written
    pub screenshot_dir: PathBuf,

    /// Where results.json is written
    pub output_dir: PathBuf,

    pub diagnostics: DiagnosticsConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://webable.pihr.xyz".to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            action_timeout_ms: 5000,
            navigation_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            output_dir: PathBuf::from("test-results"),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl SuiteConfig {
    /// Load configuration from file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognized: `BASE_URL`, `BROWSER_TYPE`, `PLAYWRIGHT_HEADLESS`,
    /// `PLAYWRIGHT_TIMEOUT`, `PLAYWRIGHT_RETRIES`, `BROWSER_WIDTH`,
    /// `BROWSER_HEIGHT`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BASE_URL") {
            self.base_url = url;
        }

        if let Some(name) = lookup("BROWSER_TYPE") {
            self.browser = Browser::parse(&name).ok_or_else(|| Error::InvalidOverride {
                var: "BROWSER_TYPE".to_string(),
                value: name.clone(),
            })?;
        }

        if let Some(value) = lookup("PLAYWRIGHT_HEADLESS") {
            self.headless = value.trim().eq_ignore_ascii_case("true") || value.trim() == "1";
        }

        if let Some(value) = lookup("PLAYWRIGHT_TIMEOUT") {
            self.navigation_timeout_ms = parse_number("PLAYWRIGHT_TIMEOUT", &value)?;
        }

        if let Some(value) = lookup("PLAYWRIGHT_RETRIES") {
            // The variable counts retries; the policy counts attempts
            let retries: u32 = parse_number("PLAYWRIGHT_RETRIES", &value)?;
            self.retry = RetryPolicy::new(
                retries.saturating_add(1),
                self.retry.base_delay().as_millis() as u64,
                self.retry.backoff(),
            )?;
        }

        if let Some(value) = lookup("BROWSER_WIDTH") {
            self.viewport.width = parse_number("BROWSER_WIDTH", &value)?;
        }

        if let Some(value) = lookup("BROWSER_HEIGHT") {
            self.viewport.height = parse_number("BROWSER_HEIGHT", &value)?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("base_url must not be empty".to_string()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Resolve a scenario URL against the base URL
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("data:") {
            return url.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if url.is_empty() {
            base.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", base, url)
        } else {
            format!("{}/{}", base, url)
        }
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidOverride {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Backoff;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SuiteConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.base_url, "https://webable.pihr.xyz");
        assert_eq!(config.action_timeout_ms, 5000);
        assert_eq!(config.diagnostics.candidates.len(), 5);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.toml");
        std::fs::write(
            &path,
            r#"
base_url = "https://staging.pihr.test"
browser = "firefox"

[retry]
max_attempts = 5
base_delay_ms = 200
backoff = "exponential"
"#,
        )
        .unwrap();

        let config = SuiteConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "https://staging.pihr.test");
        assert_eq!(config.browser, Browser::Firefox);
        assert_eq!(config.retry.max_attempts(), 5);
        assert_eq!(config.retry.backoff(), Backoff::Exponential);
        assert_eq!(config.viewport, Viewport::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("suite.toml");
        let mut config = SuiteConfig::default();
        config.headless = false;
        config.save(&path).unwrap();

        let loaded = SuiteConfig::load(&path).unwrap();
        assert!(!loaded.headless);
        assert_eq!(loaded.retry, config.retry);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SuiteConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("BASE_URL", "http://localhost:3000"),
                ("BROWSER_TYPE", "webkit"),
                ("PLAYWRIGHT_HEADLESS", "false"),
                ("PLAYWRIGHT_TIMEOUT", "45000"),
                ("PLAYWRIGHT_RETRIES", "2"),
                ("BROWSER_WIDTH", "1280"),
            ]))
            .unwrap();

        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.browser, Browser::Webkit);
        assert!(!config.headless);
        assert_eq!(config.navigation_timeout_ms, 45_000);
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 1080);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = SuiteConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("PLAYWRIGHT_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOverride { .. }));

        let err = config
            .apply_overrides(lookup_from(&[("BROWSER_TYPE", "netscape")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOverride { .. }));
    }

    #[test]
    fn test_resolve_url() {
        let config = SuiteConfig {
            base_url: "https://webable.pihr.xyz/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolve_url("/login"), "https://webable.pihr.xyz/login");
        assert_eq!(config.resolve_url("dashboard"), "https://webable.pihr.xyz/dashboard");
        assert_eq!(config.resolve_url(""), "https://webable.pihr.xyz");
        assert_eq!(config.resolve_url("https://other.test/x"), "https://other.test/x");
    }
}
