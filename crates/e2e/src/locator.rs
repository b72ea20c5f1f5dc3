//! Collaborator traits the executor drives
//!
//! The executor never constructs elements itself. Page implementations hand
//! out locators; wrappers and the diagnostic snapshot only invoke their
//! capabilities.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use pihr_common::{EventKind, LoadState, WaitState};

use crate::error::E2eResult;

/// Handle to zero or more elements matching a selector
#[async_trait]
pub trait Locator: Send + Sync {
    /// Selector this locator resolves, used in diagnostics
    fn selector(&self) -> &str;

    /// Locator for the `index`-th match (0-based)
    fn nth(&self, index: usize) -> Self
    where
        Self: Sized;

    /// Click, waiting at most `timeout` for the element to accept it
    async fn click(&self, timeout: Duration) -> E2eResult<()>;

    /// Replace the element's value with exactly `text`
    async fn fill(&self, text: &str, timeout: Duration) -> E2eResult<()>;

    /// Wait until the element reaches `state`, or fail with `E2eError::Timeout`
    async fn wait_for(&self, state: WaitState, timeout: Duration) -> E2eResult<()>;

    async fn count(&self) -> E2eResult<usize>;

    async fn is_visible(&self) -> E2eResult<bool>;

    async fn text_content(&self) -> E2eResult<Option<String>>;

    async fn get_attribute(&self, name: &str) -> E2eResult<Option<String>>;
}

/// Handle returned by an awaited browser event (popup page or download)
#[async_trait]
pub trait PageEvent: Send + Sync {
    fn kind(&self) -> EventKind;

    /// URL of the popup page, or of the downloaded resource
    fn url(&self) -> &str;

    /// Suggested file name for downloads
    fn suggested_filename(&self) -> Option<&str>;

    /// Close the popup or discard the download
    async fn close(&self) -> E2eResult<()>;
}

/// A browser page (or any surface that hands out locators)
#[async_trait]
pub trait Page: Send + Sync {
    type Locator: Locator;
    type Event: PageEvent;

    fn locator(&self, selector: &str) -> Self::Locator;

    async fn goto(&self, url: &str, timeout: Duration) -> E2eResult<()>;

    async fn url(&self) -> E2eResult<String>;

    async fn title(&self) -> E2eResult<String>;

    /// URLs of all frames, main frame first
    async fn frame_urls(&self) -> E2eResult<Vec<String>>;

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> E2eResult<()>;

    /// Wait for the next `kind` event; resolves even if it was triggered
    /// after this call started
    async fn wait_for_event(&self, kind: EventKind, timeout: Duration) -> E2eResult<Self::Event>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> E2eResult<()>;
}
