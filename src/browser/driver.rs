//! Browser driver interface
//!
//! The orchestrator never talks to a browser directly. It works against the
//! [`Driver`] trait, addressing frames by their index path from the top
//! document and elements through opaque tokens handed out by the driver.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by driver primitives
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Frame detached: {0}")]
    Detached(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// True for failures that a later attempt might not hit
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NotInteractable(_) | Self::Navigation(_) | Self::Protocol(_)
        )
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Index path of a frame, starting at the top-level document
///
/// The empty path is the top document itself; `[2, 0]` is the first child
/// frame of the third frame of the top document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FramePath(Vec<usize>);

impl FramePath {
    pub fn top() -> Self {
        Self(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn is_top(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }
}

impl fmt::Display for FramePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "top");
        }
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "top/{}", parts.join("/"))
    }
}

/// A frame as reported by [`Driver::frames`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHandle {
    pub path: FramePath,
    pub name: String,
    pub url: String,
}

impl FrameHandle {
    pub fn top(url: impl Into<String>) -> Self {
        Self {
            path: FramePath::top(),
            name: String::new(),
            url: url.into(),
        }
    }
}

/// Reference to an element inside a frame
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub frame: FramePath,
    pub token: u64,
}

impl ElementHandle {
    pub fn new(frame: FramePath, token: u64) -> Self {
        Self { frame, token }
    }
}

/// How a click is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    /// Requires the element to be visible and interactable
    Normal,
    /// Dispatches the click regardless of visibility
    Force,
}

/// Primitives the crawl needs from a browser automation backend
///
/// Every operation may fail with a [`DriverError`]; none of them retries on
/// its own. Elements returned by queries are in document order.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Loads `url` in the top-level document
    async fn navigate(&self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// Every sub-frame of the page, depth first, in document order
    async fn frames(&self) -> DriverResult<Vec<FrameHandle>>;

    /// Elements matching a CSS selector inside a frame
    async fn query_all(&self, frame: &FramePath, selector: &str) -> DriverResult<Vec<ElementHandle>>;

    /// Elements matching a CSS selector below `element`
    async fn query_within(
        &self,
        element: &ElementHandle,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>>;

    async fn is_visible(&self, element: &ElementHandle) -> DriverResult<bool>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    /// Rendered text of an element
    async fn inner_text(&self, element: &ElementHandle) -> DriverResult<String>;

    /// Rendered text of a whole frame
    async fn text_content(&self, frame: &FramePath) -> DriverResult<String>;

    async fn click(&self, element: &ElementHandle, mode: ClickMode) -> DriverResult<()>;

    async fn hover(&self, element: &ElementHandle) -> DriverResult<()>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()>;

    /// Sends a key press (e.g. `"Escape"`) to the focused document
    async fn press_key(&self, key: &str) -> DriverResult<()>;

    /// Evaluates a script expression inside a frame and returns its JSON value
    async fn evaluate(&self, frame: &FramePath, script: &str) -> DriverResult<serde_json::Value>;

    /// Browser history back
    async fn go_back(&self) -> DriverResult<()>;

    /// Waits until no new network activity is observed
    async fn wait_for_network_idle(&self, timeout: Duration) -> DriverResult<()>;

    /// Serialized DOM of a frame
    async fn content(&self, frame: &FramePath) -> DriverResult<String>;

    /// Current address of a frame
    async fn frame_url(&self, frame: &FramePath) -> DriverResult<String>;
}
