//! The browser capability the harvester drives.
//!
//! Handles are plain values so an implementation can be a remote protocol
//! client, an in-process automation library, or a scripted fake.
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

const VISIBLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A top-level browsing view (tab or window).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub String);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document inside a view: the view itself (empty path) or a nested frame,
/// addressed by the chain of frame elements leading to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    pub view: ViewId,
    pub path: Vec<String>,
}

impl FrameHandle {
    pub fn root(view: ViewId) -> Self {
        Self {
            view,
            path: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn child(&self, frame_element: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(frame_element.into());
        Self {
            view: self.view.clone(),
            path,
        }
    }
}

/// A frame as enumerated by [`Browser::frames`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub handle: FrameHandle,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub frame: FrameHandle,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickModifier {
    #[default]
    None,
    /// Ctrl-click, which opens links in a new view.
    Control,
}

/// A completed file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Name proposed by the server, possibly percent-encoded.
    pub suggested_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserErrorKind {
    Timeout,
    NoSuchElement,
    StaleElement,
    ViewClosed,
    Protocol(String),
    Transport,
    Io,
}

impl fmt::Display for BrowserErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserErrorKind::Timeout => write!(f, "timeout"),
            BrowserErrorKind::NoSuchElement => write!(f, "no such element"),
            BrowserErrorKind::StaleElement => write!(f, "stale element"),
            BrowserErrorKind::ViewClosed => write!(f, "view closed"),
            BrowserErrorKind::Protocol(code) => write!(f, "protocol error ({code})"),
            BrowserErrorKind::Transport => write!(f, "transport error"),
            BrowserErrorKind::Io => write!(f, "io error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BrowserError {
    pub kind: BrowserErrorKind,
    pub message: String,
}

impl BrowserError {
    pub fn new(kind: BrowserErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BrowserErrorKind::Timeout, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == BrowserErrorKind::Timeout
    }
}

#[async_trait::async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, view: &ViewId, url: &str) -> Result<(), BrowserError>;

    /// Wait until the view's document has been parsed.
    async fn wait_for_load(&self, view: &ViewId, timeout: Duration) -> Result<(), BrowserError>;

    /// All open views of the browsing context.
    async fn views(&self) -> Result<Vec<ViewId>, BrowserError>;

    /// The view itself first, then every nested frame in document order.
    async fn frames(&self, view: &ViewId) -> Result<Vec<Frame>, BrowserError>;

    async fn find_all(
        &self,
        scope: &FrameHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, BrowserError>;

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, BrowserError>;

    async fn remove_attribute(&self, element: &ElementHandle, name: &str)
        -> Result<(), BrowserError>;

    async fn click(
        &self,
        element: &ElementHandle,
        modifier: ClickModifier,
    ) -> Result<(), BrowserError>;

    /// Click `link` and wait for the file transfer that click started.
    /// Transfers started by anything else are never returned.
    async fn download(
        &self,
        link: &ElementHandle,
        timeout: Duration,
    ) -> Result<Download, BrowserError>;

    async fn close_view(&self, view: &ViewId) -> Result<(), BrowserError>;

    /// First visible match of `selector` in `scope`, polling until `timeout`.
    async fn wait_for_visible(
        &self,
        scope: &FrameHandle,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(found) = self.find_all(scope, selector).await {
                for element in found {
                    if self.is_visible(&element).await.unwrap_or(false) {
                        return Ok(element);
                    }
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(BrowserError::timeout(format!(
                    "`{selector}` not visible after {timeout:?}"
                )));
            }
            tokio::time::sleep(VISIBLE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
