//! Per-run test context
//!
//! Built once per run and passed to every flow: configuration, the page, the
//! retry executor and the event log travel together instead of living in
//! module-level state.

use std::path::PathBuf;
use std::time::Duration;

use pihr_common::{Candidate, EventLog, RetryPolicy, SuiteConfig};
use tracing::info;

use crate::actions::{
    capture_screenshot, safe_click_within, safe_fill_within, settle_network, wait_for_element_exists,
};
use crate::diagnostics::{capture_snapshot, SnapshotOptions, SnapshotReport};
use crate::error::E2eResult;
use crate::locator::Page;
use crate::retry::RetryExecutor;

pub struct TestContext<P: Page> {
    config: SuiteConfig,
    page: P,
    executor: RetryExecutor,
    events: EventLog,
}

impl<P: Page> TestContext<P> {
    pub fn new(config: SuiteConfig, page: P) -> Self {
        let events = EventLog::new();
        let executor = RetryExecutor::new(config.retry).with_events(events.clone());
        Self {
            config,
            page,
            executor,
            events,
        }
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Executor for a single step with its own policy
    pub fn executor_with(&self, policy: RetryPolicy) -> RetryExecutor {
        self.executor.with_policy(policy)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn locator(&self, selector: &str) -> P::Locator {
        self.page.locator(selector)
    }

    /// Navigate to `url` (relative to the base URL), retried
    pub async fn goto(&self, url: &str) -> E2eResult<()> {
        let target = self.config.resolve_url(url);
        let timeout = self.config.navigation_timeout();
        info!("Navigating to {}", target);
        self.executor
            .execute(&format!("navigate {}", target), || self.page.goto(&target, timeout))
            .await
    }

    /// Retried [`safe_click_within`] using the configured action timeout
    pub async fn click(&self, selector: &str, description: &str) -> E2eResult<()> {
        let locator = self.page.locator(selector);
        let timeout = self.config.action_timeout();
        self.executor
            .execute(&format!("click {}", description), || {
                safe_click_within(&locator, description, timeout)
            })
            .await
    }

    /// Retried [`safe_fill_within`] using the configured action timeout
    pub async fn fill(&self, selector: &str, value: &str, description: &str) -> E2eResult<()> {
        let locator = self.page.locator(selector);
        let timeout = self.config.action_timeout();
        self.executor
            .execute(&format!("fill {}", description), || {
                safe_fill_within(&locator, value, description, timeout)
            })
            .await
    }

    pub async fn element_exists(&self, selector: &str, timeout: Duration) -> bool {
        wait_for_element_exists(&self.page.locator(selector), timeout).await
    }

    pub async fn settle(&self) {
        settle_network(&self.page, self.config.navigation_timeout()).await
    }

    pub async fn screenshot(&self, name: &str) -> E2eResult<PathBuf> {
        capture_screenshot(&self.page, &self.config.screenshot_dir, name).await
    }

    /// Snapshot using the configured candidates
    pub async fn snapshot(&self) -> SnapshotReport {
        self.snapshot_of(&self.config.diagnostics.candidates, None).await
    }

    pub async fn snapshot_of(
        &self,
        candidates: &[Candidate],
        max_controls: Option<usize>,
    ) -> SnapshotReport {
        let mut options = SnapshotOptions::from(&self.config.diagnostics);
        if let Some(max) = max_controls {
            options.max_controls = max;
        }
        capture_snapshot(&self.page, candidates, &options, &self.events).await
    }
}
