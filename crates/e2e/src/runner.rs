//! Scenario runner: executes scenario steps through the retry executor

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use pihr_common::{AttemptOutcome, RetryPolicy, WaitState};

use crate::actions::{
    click_and_wait_for_event, expect_text_contains, safe_click_within, safe_fill_within,
    settle_network,
};
use crate::context::TestContext;
use crate::diagnostics::SnapshotReport;
use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, Page, PageEvent};
use crate::scenario::{expand_vars, Scenario, UiAction};

/// Result of executing one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub success: bool,
    pub attempts: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub outcomes: Vec<AttemptOutcome>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    pub failure_screenshot: Option<PathBuf>,
    pub failure_snapshot: Option<SnapshotReport>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn from_results(results: Vec<ScenarioResult>, duration: Duration) -> Self {
        let skipped = results.iter().filter(|r| r.skipped).count();
        let passed = results.iter().filter(|r| !r.skipped && r.success).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed - skipped,
            skipped,
            duration_ms: duration.as_millis() as u64,
            results,
        }
    }
}

/// Runs scenarios against the page owned by a [`TestContext`]
pub struct ScenarioRunner<P: Page> {
    ctx: TestContext<P>,
}

impl<P: Page> ScenarioRunner<P> {
    pub fn new(ctx: TestContext<P>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &TestContext<P> {
        &self.ctx
    }

    pub fn into_context(self) -> TestContext<P> {
        self.ctx
    }

    /// Check that the base URL answers before driving a browser at it
    pub async fn preflight(&self) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let url = self.ctx.config().base_url.clone();

        self.ctx
            .executor()
            .execute("preflight", || async {
                let response = client.get(&url).send().await?;
                if response.status().is_server_error() {
                    return Err(E2eError::StepFailed {
                        step: "preflight".to_string(),
                        reason: format!("{} answered {}", url, response.status()),
                    });
                }
                Ok(())
            })
            .await?;

        info!("Base URL {} is reachable", url);
        Ok(())
    }

    /// Run every scenario in order
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            results.push(self.run_scenario(scenario).await);
        }

        let suite = SuiteResult::from_results(results, start.elapsed());
        info!(
            "Scenarios: {} passed, {} failed, {} skipped ({} total) in {}ms",
            suite.passed, suite.failed, suite.skipped, suite.total, suite.duration_ms
        );
        suite
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&self, scenarios: &[Scenario], tag: &str) -> SuiteResult {
        let selected: Vec<Scenario> = Scenario::filter_by_tag(scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_all(&selected).await
    }

    /// Run one scenario, stopping at the first failed step
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();

        if scenario.skip {
            info!("Skipping scenario: {}", scenario.name);
            return ScenarioResult {
                name: scenario.name.clone(),
                success: true,
                skipped: true,
                duration_ms: 0,
                steps: Vec::new(),
                error: None,
                failure_screenshot: None,
                failure_snapshot: None,
            };
        }

        info!("Running scenario: {}", scenario.name);
        let policy = scenario.retry.unwrap_or(self.ctx.config().retry);
        let mut steps = Vec::new();
        let outcome = self.execute_steps(&scenario.steps, policy, &mut steps).await;

        let mut result = ScenarioResult {
            name: scenario.name.clone(),
            success: outcome.is_ok(),
            skipped: false,
            duration_ms: 0,
            steps,
            error: outcome.as_ref().err().map(|e| e.to_string()),
            failure_screenshot: None,
            failure_snapshot: None,
        };

        if let Err(e) = outcome {
            error!("Scenario {} failed: {}", scenario.name, e);
            self.collect_failure_artifacts(scenario, &mut result).await;
        } else {
            info!("Scenario {} passed", scenario.name);
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Best-effort snapshot and screenshot; the step error is what gets reported
    async fn collect_failure_artifacts(&self, scenario: &Scenario, result: &mut ScenarioResult) {
        if self.ctx.config().diagnostics.on_failure {
            result.failure_snapshot = Some(self.ctx.snapshot().await);
        }

        match self.ctx.screenshot(&format!("{}-failure", scenario.name)).await {
            Ok(path) => result.failure_screenshot = Some(path),
            Err(e) => warn!("Could not capture failure screenshot: {}", e),
        }
    }

    fn execute_steps<'a>(
        &'a self,
        steps: &'a [UiAction],
        policy: RetryPolicy,
        results: &'a mut Vec<StepResult>,
    ) -> BoxFuture<'a, E2eResult<()>> {
        async move {
            for step in steps {
                if let UiAction::Branch {
                    selector,
                    timeout_ms,
                    present,
                    absent,
                } = step
                {
                    let start = Instant::now();
                    let found = self
                        .ctx
                        .element_exists(selector, Duration::from_millis(*timeout_ms))
                        .await;
                    info!(
                        "Branch on {}: {}",
                        selector,
                        if found { "present" } else { "absent" }
                    );
                    results.push(StepResult {
                        step_name: step.step_name(),
                        success: true,
                        attempts: 1,
                        duration_ms: start.elapsed().as_millis() as u64,
                        error: None,
                        outcomes: Vec::new(),
                    });

                    let chosen = if found { present } else { absent };
                    self.execute_steps(chosen, policy, results).await?;
                    continue;
                }

                self.execute_step(step, policy, results).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn execute_step(
        &self,
        step: &UiAction,
        policy: RetryPolicy,
        results: &mut Vec<StepResult>,
    ) -> E2eResult<()> {
        let step_name = step.step_name();
        let policy = if step.retryable() {
            policy
        } else {
            RetryPolicy::once()
        };

        let start = Instant::now();
        let report = self
            .ctx
            .executor_with(policy)
            .run(&step_name, || self.perform(step))
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let (outcomes, result) = report.into_parts();

        results.push(StepResult {
            step_name: step_name.clone(),
            success: result.is_ok(),
            attempts: outcomes.len(),
            duration_ms,
            error: result.as_ref().err().map(|e| e.to_string()),
            outcomes,
        });

        result
    }

    /// One attempt at a leaf action
    async fn perform(&self, step: &UiAction) -> E2eResult<()> {
        let config = self.ctx.config();
        let page = self.ctx.page();
        let action_timeout =
            |ms: &Option<u64>| ms.map(Duration::from_millis).unwrap_or(config.action_timeout());

        match step {
            UiAction::Navigate {
                url,
                wait_for_selector,
            } => {
                let target = config.resolve_url(url);
                page.goto(&target, config.navigation_timeout()).await?;
                if let Some(selector) = wait_for_selector {
                    page.locator(selector)
                        .wait_for(WaitState::Visible, config.navigation_timeout())
                        .await?;
                }
                Ok(())
            }
            UiAction::Click {
                selector,
                description,
                timeout_ms,
                ..
            } => {
                let description = description.as_deref().unwrap_or(selector);
                safe_click_within(&page.locator(selector), description, action_timeout(timeout_ms))
                    .await
            }
            UiAction::Fill {
                selector,
                value,
                description,
                timeout_ms,
            } => {
                let value = expand_vars(value, |name| std::env::var(name).ok())?;
                let description = description.as_deref().unwrap_or(selector);
                safe_fill_within(
                    &page.locator(selector),
                    &value,
                    description,
                    action_timeout(timeout_ms),
                )
                .await
            }
            UiAction::Wait {
                selector,
                timeout_ms,
                state,
            } => {
                page.locator(selector)
                    .wait_for(*state, Duration::from_millis(*timeout_ms))
                    .await
            }
            UiAction::ExpectEvent {
                selector,
                event,
                description,
                timeout_ms,
                url_contains,
                filename_suffix,
                ..
            } => {
                let description = description.as_deref().unwrap_or(selector);
                let handle = click_and_wait_for_event(
                    page,
                    &page.locator(selector),
                    description,
                    *event,
                    Duration::from_millis(*timeout_ms),
                )
                .await?;

                let check = check_event(&handle, url_contains.as_deref(), filename_suffix.as_deref());
                if let Err(e) = handle.close().await {
                    warn!("Could not close {} handle: {}", event, e);
                }
                check
            }
            UiAction::AssertText {
                selector,
                contains,
                timeout_ms,
            } => {
                expect_text_contains(&page.locator(selector), contains, action_timeout(timeout_ms))
                    .await
            }
            UiAction::AssertUrl { contains } => {
                let url = page.url().await?;
                if url.contains(contains.as_str()) {
                    Ok(())
                } else {
                    Err(E2eError::AssertionFailed(format!(
                        "expected URL containing {:?}, got {}",
                        contains, url
                    )))
                }
            }
            UiAction::SettleNetwork { timeout_ms } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(config.navigation_timeout());
                settle_network(page, timeout).await;
                Ok(())
            }
            UiAction::Screenshot { name } => {
                self.ctx.screenshot(name).await?;
                Ok(())
            }
            UiAction::Snapshot {
                candidates,
                max_controls,
            } => {
                if candidates.is_empty() {
                    self.ctx
                        .snapshot_of(&config.diagnostics.candidates, *max_controls)
                        .await;
                } else {
                    self.ctx.snapshot_of(candidates, *max_controls).await;
                }
                Ok(())
            }
            UiAction::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            UiAction::Log { message } => {
                self.ctx.events().info("scenario", message.clone());
                Ok(())
            }
            UiAction::Branch { .. } => Err(E2eError::StepFailed {
                step: step.step_name(),
                reason: "branch steps are expanded by the runner".to_string(),
            }),
        }
    }

    /// Write results to `<output_dir>/results.json`
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        let output_dir = &self.ctx.config().output_dir;
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join("results.json");
        std::fs::write(&path, serde_json::to_string_pretty(results)?)?;
        info!("Results written to {}", path.display());
        Ok(path)
    }
}

fn check_event<E: PageEvent>(
    event: &E,
    url_contains: Option<&str>,
    filename_suffix: Option<&str>,
) -> E2eResult<()> {
    if let Some(expected) = url_contains {
        if !event.url().contains(expected) {
            return Err(E2eError::AssertionFailed(format!(
                "{} URL {} does not contain {:?}",
                event.kind(),
                event.url(),
                expected
            )));
        }
    }
    if let Some(suffix) = filename_suffix {
        let name = event.suggested_filename().unwrap_or_default();
        if !name.ends_with(suffix) {
            return Err(E2eError::AssertionFailed(format!(
                "{} file name {:?} does not end with {:?}",
                event.kind(),
                name,
                suffix
            )));
        }
    }
    Ok(())
}
