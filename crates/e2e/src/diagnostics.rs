//! Best-effort diagnostic snapshot of the current page
//!
//! Used right before or after a failed interaction. Every probe is guarded on
//! its own, so a missing element or a broken frame never aborts the snapshot
//! and never replaces the error being diagnosed.

use pihr_common::{Candidate, DiagnosticsConfig, EventLog};
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::locator::{Locator, Page};

const COMPONENT: &str = "diagnostics";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Selector for generic interactive controls
    pub control_selector: String,
    /// Enumerate at most this many controls
    pub max_controls: usize,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            control_selector: "button".to_string(),
            max_controls: 10,
        }
    }
}

impl From<&DiagnosticsConfig> for SnapshotOptions {
    fn from(config: &DiagnosticsConfig) -> Self {
        Self {
            control_selector: config.control_selector.clone(),
            max_controls: config.max_controls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStatus {
    pub name: String,
    pub selector: String,
    pub present: bool,
    pub count: usize,
    /// Only probed when the element is present
    pub visible: Option<bool>,
    pub probe_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlInfo {
    pub index: usize,
    pub text: Option<String>,
    /// Value of the `name` attribute
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub url: Option<String>,
    pub title: Option<String>,
    pub frame_urls: Vec<String>,
    pub candidates: Vec<CandidateStatus>,
    pub total_controls: Option<usize>,
    pub controls: Vec<ControlInfo>,
    /// Number of probes that failed and were skipped
    pub probe_errors: usize,
}

impl SnapshotReport {
    pub fn candidate(&self, name: &str) -> Option<&CandidateStatus> {
        self.candidates.iter().find(|c| c.name == name)
    }
}

/// Inventory the page: URL, title, frames, named candidates and the first
/// `max_controls` controls. Never fails.
pub async fn capture_snapshot<P: Page>(
    page: &P,
    candidates: &[Candidate],
    options: &SnapshotOptions,
    events: &EventLog,
) -> SnapshotReport {
    let mut report = SnapshotReport::default();
    let mut probe = Prober {
        events,
        errors: 0,
    };

    events.info(COMPONENT, "=== Page snapshot ===");

    report.url = probe.guard("url", page.url()).await;
    report.title = probe.guard("title", page.title()).await;
    report.frame_urls = probe.guard("frames", page.frame_urls()).await.unwrap_or_default();

    events.info(
        COMPONENT,
        format!(
            "URL: {} | title: {} | frames: {}",
            report.url.as_deref().unwrap_or("<unknown>"),
            report.title.as_deref().unwrap_or("<unknown>"),
            report.frame_urls.len()
        ),
    );
    for (index, frame) in report.frame_urls.iter().enumerate() {
        events.debug(COMPONENT, format!("Frame {}: {}", index, frame));
    }

    for candidate in candidates {
        let status = probe_candidate(page, candidate, &mut probe).await;
        let mut line = format!("{} exists: {}", status.name, status.present);
        if let Some(visible) = status.visible {
            line.push_str(&format!(", visible: {}", visible));
        }
        if let Some(err) = &status.probe_error {
            line.push_str(&format!(" (probe failed: {})", err));
        }
        events.info(COMPONENT, line);
        report.candidates.push(status);
    }

    let controls = page.locator(&options.control_selector);
    report.total_controls = probe.guard("control count", controls.count()).await;
    let total = report.total_controls.unwrap_or(0);
    events.info(
        COMPONENT,
        format!("Total {} found: {}", options.control_selector, total),
    );

    for index in 0..total.min(options.max_controls) {
        let control = controls.nth(index);
        let text = probe
            .guard("control text", control.text_content())
            .await
            .flatten()
            .map(|t| t.trim().to_string());
        let name = probe
            .guard("control name", control.get_attribute("name"))
            .await
            .flatten();
        events.info(
            COMPONENT,
            format!(
                "Control {}: text={:?}, name={:?}",
                index,
                text.as_deref().unwrap_or(""),
                name.as_deref().unwrap_or("")
            ),
        );
        report.controls.push(ControlInfo { index, text, name });
    }

    report.probe_errors = probe.errors;
    report
}

async fn probe_candidate<P: Page>(
    page: &P,
    candidate: &Candidate,
    probe: &mut Prober<'_>,
) -> CandidateStatus {
    let locator = page.locator(&candidate.selector);
    let mut status = CandidateStatus {
        name: candidate.name.clone(),
        selector: candidate.selector.clone(),
        present: false,
        count: 0,
        visible: None,
        probe_error: None,
    };

    match locator.count().await {
        Ok(count) => {
            status.count = count;
            status.present = count > 0;
        }
        Err(e) => {
            probe.note(&candidate.name, &e);
            status.probe_error = Some(e.to_string());
            return status;
        }
    }

    if status.present {
        match locator.is_visible().await {
            Ok(visible) => status.visible = Some(visible),
            Err(e) => {
                probe.note(&candidate.name, &e);
                status.probe_error = Some(e.to_string());
            }
        }
    }

    status
}

struct Prober<'a> {
    events: &'a EventLog,
    errors: usize,
}

impl Prober<'_> {
    async fn guard<T, F>(&mut self, what: &str, probe: F) -> Option<T>
    where
        F: std::future::Future<Output = E2eResult<T>>,
    {
        match probe.await {
            Ok(value) => Some(value),
            Err(e) => {
                self.note(what, &e);
                None
            }
        }
    }

    fn note(&mut self, what: &str, err: &dyn std::fmt::Display) {
        self.errors += 1;
        self.events
            .debug(COMPONENT, format!("probe '{}' failed: {}", what, err));
    }
}
