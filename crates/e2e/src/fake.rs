//! In-memory page for exercising the executor without a browser
//!
//! Elements become visible at scripted instants on the tokio clock, so tests
//! running with a paused clock get exact, instant timings.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, sleep_until, Instant};

use pihr_common::{EventKind, LoadState, WaitState};

use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, Page, PageEvent};

/// Scripted element behaviour
#[derive(Debug, Clone)]
pub struct FakeElement {
    visible_at: Option<Instant>,
    text: Option<String>,
    value: String,
    attributes: HashMap<String, String>,
    clicks: u32,
    failing_clicks: u32,
    busy_for: Duration,
    broken: bool,
    on_click_event: Option<(EventKind, String, Option<String>)>,
    on_click_navigate: Option<String>,
}

impl FakeElement {
    fn with_visibility(visible_at: Option<Instant>) -> Self {
        Self {
            visible_at,
            text: None,
            value: String::new(),
            attributes: HashMap::new(),
            clicks: 0,
            failing_clicks: 0,
            busy_for: Duration::ZERO,
            broken: false,
            on_click_event: None,
            on_click_navigate: None,
        }
    }

    /// Attached and visible right away
    pub fn visible() -> Self {
        Self::with_visibility(Some(Instant::now()))
    }

    /// Attached but never visible
    pub fn hidden() -> Self {
        Self::with_visibility(None)
    }

    /// Attached now, visible after `delay`
    pub fn visible_after(delay: Duration) -> Self {
        Self::with_visibility(Some(Instant::now() + delay))
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The first `n` clicks fail as if intercepted by an overlay
    pub fn failing_clicks(mut self, n: u32) -> Self {
        self.failing_clicks = n;
        self
    }

    /// Clicks and fills wait this long for the element to become actionable
    /// (e.g. still animating or covered by a spinner)
    pub fn busy_for(mut self, delay: Duration) -> Self {
        self.busy_for = delay;
        self
    }

    /// Every capability call fails
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Clicking fires a page event
    pub fn on_click_event(
        mut self,
        kind: EventKind,
        url: impl Into<String>,
        suggested_filename: Option<&str>,
    ) -> Self {
        self.on_click_event = Some((kind, url.into(), suggested_filename.map(String::from)));
        self
    }

    /// Clicking changes the page URL
    pub fn on_click_navigate(mut self, url: impl Into<String>) -> Self {
        self.on_click_navigate = Some(url.into());
        self
    }

    fn is_visible_at(&self, now: Instant) -> bool {
        self.visible_at.map(|t| t <= now).unwrap_or(false)
    }
}

#[derive(Default)]
struct FakeState {
    elements: HashMap<String, Vec<FakeElement>>,
    url: String,
    title: String,
    frames: Vec<String>,
    broken_page: bool,
    network_idle_after: Option<Duration>,
    navigations: Vec<String>,
    screenshots: Vec<PathBuf>,
    queued_events: Vec<FakeEvent>,
    event_waiters: Vec<(EventKind, oneshot::Sender<FakeEvent>)>,
}

/// In-memory [`Page`]. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new() -> Self {
        let page = Self::default();
        {
            let mut state = page.state.lock();
            state.url = "about:blank".to_string();
            state.frames = vec!["about:blank".to_string()];
        }
        page
    }

    /// Add one more element matching `selector`
    pub fn add(&self, selector: &str, element: FakeElement) -> &Self {
        self.state
            .lock()
            .elements
            .entry(selector.to_string())
            .or_default()
            .push(element);
        self
    }

    pub fn remove(&self, selector: &str) {
        self.state.lock().elements.remove(selector);
    }

    pub fn set_url(&self, url: &str) {
        let mut state = self.state.lock();
        state.url = url.to_string();
        if let Some(main) = state.frames.first_mut() {
            *main = url.to_string();
        }
    }

    pub fn set_title(&self, title: &str) {
        self.state.lock().title = title.to_string();
    }

    pub fn add_frame(&self, url: &str) {
        self.state.lock().frames.push(url.to_string());
    }

    /// Page-level probes (url, title, frames) fail
    pub fn break_page(&self) {
        self.state.lock().broken_page = true;
    }

    /// Network goes idle this long after any load-state wait starts
    pub fn network_idle_after(&self, delay: Duration) {
        self.state.lock().network_idle_after = Some(delay);
    }

    /// Current value of the first element matching `selector`
    pub fn value(&self, selector: &str) -> Option<String> {
        self.with_element(selector, 0, |e| e.value.clone())
    }

    /// Successful clicks on the first element matching `selector`
    pub fn clicks(&self, selector: &str) -> u32 {
        self.with_element(selector, 0, |e| e.clicks).unwrap_or(0)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().screenshots.clone()
    }

    /// Fire an event as if the browser raised it
    pub fn emit(&self, event: FakeEvent) {
        let mut state = self.state.lock();
        let waiter = state
            .event_waiters
            .iter()
            .position(|(kind, tx)| *kind == event.kind && !tx.is_closed());
        match waiter {
            Some(index) => {
                let (_, tx) = state.event_waiters.remove(index);
                if let Err(event) = tx.send(event) {
                    state.queued_events.push(event);
                }
            }
            None => state.queued_events.push(event),
        }
    }

    fn with_element<T>(
        &self,
        selector: &str,
        index: usize,
        f: impl FnOnce(&FakeElement) -> T,
    ) -> Option<T> {
        let state = self.state.lock();
        state.elements.get(selector).and_then(|els| els.get(index)).map(f)
    }

    fn page_probe<T>(&self, f: impl FnOnce(&FakeState) -> T) -> E2eResult<T> {
        let state = self.state.lock();
        if state.broken_page {
            return Err(E2eError::Driver("page crashed".to_string()));
        }
        Ok(f(&state))
    }
}

/// Locator over a [`FakePage`]
#[derive(Clone)]
pub struct FakeLocator {
    page: FakePage,
    selector: String,
    index: usize,
}

impl FakeLocator {
    /// Run `f` on the targeted element, failing if it is absent or broken
    fn element<T>(&self, f: impl FnOnce(&mut FakeElement) -> E2eResult<T>) -> E2eResult<T> {
        let mut state = self.page.state.lock();
        let element = state
            .elements
            .get_mut(&self.selector)
            .and_then(|els| els.get_mut(self.index))
            .ok_or_else(|| E2eError::ElementNotFound(self.selector.clone()))?;
        if element.broken {
            return Err(E2eError::Driver(format!("{} detached from DOM", self.selector)));
        }
        f(element)
    }

    /// Sleep out the element's busy time, or fail like a driver would once
    /// `timeout` is spent
    async fn wait_actionable(&self, action: &str, timeout: Duration) -> E2eResult<()> {
        let busy = self.element(|e| Ok(e.busy_for))?;
        if busy > timeout {
            sleep(timeout).await;
            return Err(E2eError::timeout(
                format!("{} to accept {}", self.selector, action),
                timeout,
            ));
        }
        sleep(busy).await;
        Ok(())
    }

    /// When the wait for `state` would be satisfied, if ever
    fn ready_at(&self, wanted: WaitState) -> E2eResult<Option<Instant>> {
        let state = self.page.state.lock();
        let element = state
            .elements
            .get(&self.selector)
            .and_then(|els| els.get(self.index));
        let now = Instant::now();

        if element.map(|e| e.broken).unwrap_or(false) {
            return Err(E2eError::Driver(format!("{} detached from DOM", self.selector)));
        }

        let at = match (wanted, element) {
            (WaitState::Visible, Some(e)) => e.visible_at.map(|t| t.max(now)),
            (WaitState::Visible, None) => None,
            (WaitState::Hidden, Some(e)) if e.is_visible_at(now) => None,
            (WaitState::Hidden, _) => Some(now),
            (WaitState::Attached, Some(_)) => Some(now),
            (WaitState::Attached, None) => None,
            (WaitState::Detached, Some(_)) => None,
            (WaitState::Detached, None) => Some(now),
        };
        Ok(at)
    }
}

#[async_trait]
impl Locator for FakeLocator {
    fn selector(&self) -> &str {
        &self.selector
    }

    fn nth(&self, index: usize) -> Self {
        Self {
            page: self.page.clone(),
            selector: self.selector.clone(),
            index,
        }
    }

    async fn click(&self, timeout: Duration) -> E2eResult<()> {
        self.wait_actionable("click", timeout).await?;
        let (event, navigate) = self.element(|e| {
            if !e.is_visible_at(Instant::now()) {
                return Err(E2eError::Driver("element is not visible".to_string()));
            }
            if e.failing_clicks > 0 {
                e.failing_clicks -= 1;
                return Err(E2eError::Driver(
                    "element click intercepted by overlay".to_string(),
                ));
            }
            e.clicks += 1;
            Ok((e.on_click_event.clone(), e.on_click_navigate.clone()))
        })?;

        if let Some(url) = navigate {
            self.page.set_url(&url);
        }
        if let Some((kind, url, suggested_filename)) = event {
            self.page.emit(FakeEvent::new(kind, url, suggested_filename));
        }
        Ok(())
    }

    async fn fill(&self, text: &str, timeout: Duration) -> E2eResult<()> {
        self.wait_actionable("fill", timeout).await?;
        self.element(|e| {
            if !e.is_visible_at(Instant::now()) {
                return Err(E2eError::Driver("element is not visible".to_string()));
            }
            e.value = text.to_string();
            Ok(())
        })
    }

    async fn wait_for(&self, state: WaitState, timeout: Duration) -> E2eResult<()> {
        let deadline = Instant::now() + timeout;
        match self.ready_at(state)? {
            Some(at) if at <= deadline => {
                sleep_until(at).await;
                Ok(())
            }
            _ => {
                sleep_until(deadline).await;
                Err(E2eError::timeout(
                    format!("{} to be {}", self.selector, state),
                    timeout,
                ))
            }
        }
    }

    async fn count(&self) -> E2eResult<usize> {
        let state = self.page.state.lock();
        match state.elements.get(&self.selector) {
            Some(els) if els.iter().any(|e| e.broken) => Err(E2eError::Driver(format!(
                "{} detached from DOM",
                self.selector
            ))),
            Some(els) => Ok(els.len()),
            None => Ok(0),
        }
    }

    async fn is_visible(&self) -> E2eResult<bool> {
        let now = Instant::now();
        match self.element(|e| Ok(e.is_visible_at(now))) {
            Err(E2eError::ElementNotFound(_)) => Ok(false),
            other => other,
        }
    }

    async fn text_content(&self) -> E2eResult<Option<String>> {
        self.element(|e| Ok(e.text.clone()))
    }

    async fn get_attribute(&self, name: &str) -> E2eResult<Option<String>> {
        self.element(|e| Ok(e.attributes.get(name).cloned()))
    }
}

/// Event delivered by [`FakePage::wait_for_event`]
#[derive(Debug, Clone)]
pub struct FakeEvent {
    kind: EventKind,
    url: String,
    suggested_filename: Option<String>,
    closed: Arc<AtomicBool>,
}

impl FakeEvent {
    pub fn new(kind: EventKind, url: impl Into<String>, suggested_filename: Option<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            suggested_filename,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageEvent for FakeEvent {
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn suggested_filename(&self) -> Option<&str> {
        self.suggested_filename.as_deref()
    }

    async fn close(&self) -> E2eResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Page for FakePage {
    type Locator = FakeLocator;
    type Event = FakeEvent;

    fn locator(&self, selector: &str) -> FakeLocator {
        FakeLocator {
            page: self.clone(),
            selector: selector.to_string(),
            index: 0,
        }
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> E2eResult<()> {
        self.page_probe(|_| ())?;
        self.set_url(url);
        self.state.lock().navigations.push(url.to_string());
        Ok(())
    }

    async fn url(&self) -> E2eResult<String> {
        self.page_probe(|s| s.url.clone())
    }

    async fn title(&self) -> E2eResult<String> {
        self.page_probe(|s| s.title.clone())
    }

    async fn frame_urls(&self) -> E2eResult<Vec<String>> {
        self.page_probe(|s| s.frames.clone())
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> E2eResult<()> {
        let idle_after = self.page_probe(|s| s.network_idle_after)?;
        match (state, idle_after) {
            (LoadState::NetworkIdle, Some(delay)) if delay > timeout => {
                sleep(timeout).await;
                Err(E2eError::timeout("networkidle", timeout))
            }
            (LoadState::NetworkIdle, Some(delay)) => {
                sleep(delay).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn wait_for_event(&self, kind: EventKind, timeout: Duration) -> E2eResult<FakeEvent> {
        let rx = {
            let mut state = self.state.lock();
            if let Some(index) = state.queued_events.iter().position(|e| e.kind == kind) {
                return Ok(state.queued_events.remove(index));
            }
            let (tx, rx) = oneshot::channel();
            state.event_waiters.push((kind, tx));
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(E2eError::Driver("page closed while waiting for event".into())),
            Err(_) => Err(E2eError::timeout(format!("{} event", kind), timeout)),
        }
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> E2eResult<()> {
        self.page_probe(|_| ())?;
        std::fs::write(path, b"\x89PNG fake")?;
        self.state.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_visible_after_delay() {
        let page = FakePage::new();
        page.add("#slow", FakeElement::visible_after(Duration::from_millis(300)));
        let locator = page.locator("#slow");

        assert!(!locator.is_visible().await.unwrap());
        let start = Instant::now();
        locator
            .wait_for(WaitState::Visible, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        assert!(locator.is_visible().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_element_times_out() {
        let page = FakePage::new();
        let err = page
            .locator("#nope")
            .wait_for(WaitState::Visible, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(page.locator("#nope").count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queued_event_delivered_to_late_waiter() {
        let page = FakePage::new();
        page.emit(FakeEvent::new(EventKind::Download, "https://x.test/r.xlsx", None));
        let event = page
            .wait_for_event(EventKind::Download, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(event.url(), "https://x.test/r.xlsx");
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_element_click_honours_timeout() {
        let page = FakePage::new();
        page.add("#busy", FakeElement::visible().busy_for(Duration::from_secs(2)));
        let locator = page.locator("#busy");

        let start = Instant::now();
        let err = locator.click(Duration::from_millis(500)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(page.clicks("#busy"), 0);

        locator.click(Duration::from_secs(3)).await.unwrap();
        assert_eq!(page.clicks("#busy"), 1);
    }
}
