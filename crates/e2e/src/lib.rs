//! PiHR E2E resilient-action executor
//!
//! This crate drives UI automation flows against a flaky web UI:
//! - Retries async actions under a bounded [`RetryPolicy`](pihr_common::RetryPolicy)
//! - Wraps click/fill so they wait for visibility first and fail with context
//! - Captures diagnostic snapshots of a page without ever failing
//! - Runs declarative YAML scenarios through a Playwright driver process
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ScenarioRunner / TestContext                │
//! │    ├── run_scenario(Scenario) -> ScenarioResult             │
//! │    └── goto / click / fill / snapshot / screenshot          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RetryExecutor          safe_* wrappers      capture_snapshot│
//! ├─────────────────────────────────────────────────────────────┤
//! │  Page / Locator / PageEvent traits                          │
//! │    ├── PlaywrightPage  (node driver, JSON lines)            │
//! │    └── FakePage        (in-memory, `test-support` feature)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod cli;
pub mod context;
pub mod diagnostics;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod locator;
pub mod playwright;
pub mod retry;
pub mod runner;
pub mod scenario;

pub use actions::{
    capture_screenshot, click_and_wait_for_event, expect_text_contains, safe_click,
    safe_click_within, safe_fill, safe_fill_within, settle_network, wait_for_element_exists,
    wait_for_element_visible, DEFAULT_ACTION_TIMEOUT,
};
pub use cli::RunnerArgs;
pub use context::TestContext;
pub use diagnostics::{capture_snapshot, CandidateStatus, ControlInfo, SnapshotOptions, SnapshotReport};
pub use error::{E2eError, E2eResult};
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeElement, FakeEvent, FakePage};
pub use locator::{Locator, Page, PageEvent};
pub use playwright::{PlaywrightConfig, PlaywrightPage};
pub use retry::{retry_action, ExecutionReport, RetryExecutor};
pub use runner::{ScenarioResult, ScenarioRunner, StepResult, SuiteResult};
pub use scenario::{expand_vars, Scenario, UiAction};
