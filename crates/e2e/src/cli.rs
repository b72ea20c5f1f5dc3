//! Command-line surface of the scenario runner
//!
//! Settings are layered: the TOML suite file, then environment variables,
//! then the flags given here.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use pihr_common::{Browser, SuiteConfig};

use crate::error::{E2eError, E2eResult};
use crate::scenario::Scenario;

#[derive(Parser, Debug, Clone)]
#[command(name = "pihr-e2e")]
#[command(about = "Resilient E2E scenario runner for PiHR")]
pub struct RunnerArgs {
    /// Path to scenario directory
    #[arg(short, long, default_value = "scenarios")]
    pub scenarios: PathBuf,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Suite configuration file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "e2e.toml")]
    pub config: PathBuf,

    /// Override the base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    pub browser: Option<String>,

    /// Run in headless mode
    #[arg(long)]
    pub headless: Option<bool>,

    /// Output directory for results
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Check that the base URL answers before launching a browser
    #[arg(long)]
    pub preflight: bool,
}

impl RunnerArgs {
    /// Load the suite config, reading overrides from the process environment
    pub fn load_config(&self) -> E2eResult<SuiteConfig> {
        self.load_config_with(|var| std::env::var(var).ok())
    }

    /// Load the suite config with environment overrides taken from `lookup`
    pub fn load_config_with<F>(&self, lookup: F) -> E2eResult<SuiteConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = SuiteConfig::load(&self.config)?;
        config.apply_overrides(lookup)?;
        self.apply_to(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the flags that were given on top of `config`
    pub fn apply_to(&self, config: &mut SuiteConfig) -> E2eResult<()> {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(name) = &self.browser {
            config.browser = Browser::parse(name).ok_or_else(|| {
                E2eError::Config(pihr_common::Error::InvalidOverride {
                    var: "--browser".to_string(),
                    value: name.clone(),
                })
            })?;
        }
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
        if let Some(output) = &self.output {
            config.screenshot_dir = output.join("screenshots");
            config.output_dir = output.clone();
        }
        Ok(())
    }

    /// Scenarios to run: by name, else by tag, else all of them
    pub fn select_scenarios(&self) -> E2eResult<Vec<Scenario>> {
        let all = Scenario::load_all(&self.scenarios)?;

        let selected: Vec<Scenario> = if let Some(name) = &self.name {
            let found: Vec<Scenario> = all.into_iter().filter(|s| &s.name == name).collect();
            if found.is_empty() {
                return Err(E2eError::SpecParse(format!("scenario not found: {}", name)));
            }
            found
        } else if let Some(tag) = &self.tag {
            Scenario::filter_by_tag(&all, tag).into_iter().cloned().collect()
        } else {
            all
        };

        info!("Selected {} scenario(s)", selected.len());
        Ok(selected)
    }
}
