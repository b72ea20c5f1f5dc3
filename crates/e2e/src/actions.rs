//! Safe wrappers around locator capabilities
//!
//! Each wrapper waits for the target to become visible within a bounded
//! timeout and then acts on it. Wait and act together form one action that a
//! caller can hand to [`crate::retry::RetryExecutor`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use pihr_common::{EventKind, LoadState, WaitState};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, Page};

/// Visibility timeout used by the wrappers unless told otherwise
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Wait for `locator` to be visible, then click it
pub async fn safe_click<L: Locator>(locator: &L, description: &str) -> E2eResult<()> {
    safe_click_within(locator, description, DEFAULT_ACTION_TIMEOUT).await
}

pub async fn safe_click_within<L: Locator>(
    locator: &L,
    description: &str,
    timeout: Duration,
) -> E2eResult<()> {
    let deadline = Instant::now() + timeout;
    let result = async {
        locator.wait_for(WaitState::Visible, timeout).await?;
        locator.click(remaining(deadline)).await
    }
    .await;

    match result {
        Ok(()) => {
            info!("Clicked {}", description);
            Ok(())
        }
        Err(e) => {
            warn!("Failed to click {} ({}): {}", description, locator.selector(), e);
            Err(e.annotate("click", description))
        }
    }
}

/// Wait for `locator` to be visible, then replace its value with `value`
pub async fn safe_fill<L: Locator>(locator: &L, value: &str, description: &str) -> E2eResult<()> {
    safe_fill_within(locator, value, description, DEFAULT_ACTION_TIMEOUT).await
}

pub async fn safe_fill_within<L: Locator>(
    locator: &L,
    value: &str,
    description: &str,
    timeout: Duration,
) -> E2eResult<()> {
    let deadline = Instant::now() + timeout;
    let result = async {
        locator.wait_for(WaitState::Visible, timeout).await?;
        locator.fill(value, remaining(deadline)).await
    }
    .await;

    match result {
        Ok(()) => {
            // Values can be credentials; log the length only
            info!("Filled {} ({} chars)", description, value.chars().count());
            Ok(())
        }
        Err(e) => {
            warn!("Failed to fill {} ({}): {}", description, locator.selector(), e);
            Err(e.annotate("fill", description))
        }
    }
}

/// Budget left for the act half of a wrapper. Never zero: drivers read a
/// zero timeout as "wait forever".
fn remaining(deadline: Instant) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .max(Duration::from_millis(1))
}

/// Wait for `locator` to be visible, failing with a timeout error otherwise
pub async fn wait_for_element_visible<L: Locator>(locator: &L, timeout: Duration) -> E2eResult<()> {
    locator.wait_for(WaitState::Visible, timeout).await
}

/// `true` once `locator` is visible, `false` if it does not become visible
/// within `timeout`. Never returns an error.
pub async fn wait_for_element_exists<L: Locator>(locator: &L, timeout: Duration) -> bool {
    match locator.wait_for(WaitState::Visible, timeout).await {
        Ok(()) => true,
        Err(e) => {
            debug!("{} not visible within {:?}: {}", locator.selector(), timeout, e);
            false
        }
    }
}

/// Best-effort wait for the network to go idle; timeouts are logged and ignored
pub async fn settle_network<P: Page>(page: &P, timeout: Duration) {
    if let Err(e) = page.wait_for_load_state(LoadState::NetworkIdle, timeout).await {
        info!("Network idle wait ended early, continuing: {}", e);
    }
}

/// Full-page screenshot at `dir/<name>-<timestamp>.png`
pub async fn capture_screenshot<P: Page>(page: &P, dir: &Path, name: &str) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(screenshot_file_name(name));
    page.screenshot(&path, true).await?;
    info!("Screenshot saved: {}", path.display());
    Ok(path)
}

fn screenshot_file_name(name: &str) -> String {
    let timestamp = Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}-{}.png", name, timestamp)
}

/// Click `locator` and return the `kind` event the click triggers.
///
/// The event wait is armed before the click so a fast popup or download is
/// not missed.
pub async fn click_and_wait_for_event<P: Page>(
    page: &P,
    locator: &P::Locator,
    description: &str,
    kind: EventKind,
    timeout: Duration,
) -> E2eResult<P::Event> {
    let event = async {
        page.wait_for_event(kind, timeout)
            .await
            .map_err(|e| e.annotate("receive event from", format!("{} ({})", description, kind)))
    };
    let click = safe_click_within(locator, description, timeout);

    let (event, ()) = tokio::try_join!(event, click)?;
    Ok(event)
}

/// Assert the element's text contains `expected`
pub async fn expect_text_contains<L: Locator>(
    locator: &L,
    expected: &str,
    timeout: Duration,
) -> E2eResult<()> {
    locator.wait_for(WaitState::Visible, timeout).await?;
    let text = locator.text_content().await?.unwrap_or_default();
    if text.contains(expected) {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(format!(
            "{}: expected text containing {:?}, got {:?}",
            locator.selector(),
            expected,
            text.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeElement, FakePage};
    use crate::retry::RetryExecutor;
    use pihr_common::RetryPolicy;

    #[test]
    fn test_screenshot_file_name_has_no_colons() {
        let name = screenshot_file_name("job-card");
        assert!(name.starts_with("job-card-"));
        assert!(name.ends_with(".png"));
        assert!(!name.contains(':'));
        assert_eq!(name.matches('.').count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_element_visible_times_out() {
        let page = FakePage::new();
        page.add("#late", FakeElement::visible_after(Duration::from_secs(10)));

        let err = wait_for_element_visible(&page.locator("#late"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Timeout { timeout_ms: 2000, .. }));

        wait_for_element_visible(&page.locator("#late"), Duration::from_secs(9))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_network_swallows_timeout() {
        let page = FakePage::new();
        page.network_idle_after(Duration::from_secs(60));

        let start = Instant::now();
        settle_network(&page, Duration::from_secs(3)).await;
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_safe_click_retries_through_executor() {
        let page = FakePage::new();
        page.add("#menu", FakeElement::visible().failing_clicks(1));
        let locator = page.locator("#menu");

        let executor = RetryExecutor::new(RetryPolicy::default());
        let report = executor
            .run("menu", || safe_click(&locator, "Self Service menu"))
            .await;

        assert!(report.succeeded());
        assert_eq!(report.attempts(), 2);
        assert_eq!(page.clicks("#menu"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safe_click_budget_covers_wait_and_click() {
        let page = FakePage::new();
        page.add(
            "#export",
            FakeElement::visible_after(Duration::from_secs(3)).busy_for(Duration::from_secs(10)),
        );
        let locator = page.locator("#export");

        let start = Instant::now();
        let err = safe_click_within(&locator, "export button", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(page.clicks("#export"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safe_fill_passes_remaining_budget() {
        let page = FakePage::new();
        page.add(
            "#search",
            FakeElement::visible_after(Duration::from_secs(1)).busy_for(Duration::from_secs(2)),
        );
        let locator = page.locator("#search");

        safe_fill_within(&locator, "job card", "search box", Duration::from_secs(4))
            .await
            .unwrap();
        assert_eq!(page.value("#search").as_deref(), Some("job card"));

        let err = safe_fill_within(&locator, "x", "search box", Duration::from_millis(1500))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_capture_screenshot_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new();

        let path = capture_screenshot(&page, &dir.path().join("shots"), "dashboard")
            .await
            .unwrap();
        assert!(path.exists());
        assert_eq!(page.screenshots(), vec![path]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expect_text_contains() {
        let page = FakePage::new();
        page.add("h1", FakeElement::visible().with_text("My Job Card"));

        expect_text_contains(&page.locator("h1"), "Job Card", DEFAULT_ACTION_TIMEOUT)
            .await
            .unwrap();
        let err = expect_text_contains(&page.locator("h1"), "Attendance", DEFAULT_ACTION_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(_)));
    }
}
