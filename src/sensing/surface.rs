//! The browser-automation capability the stabilization engine drives.
//!
//! A [`Surface`] is one exclusive page (tab) plus the frames inside it. The
//! engine never holds on to DOM handles: every query names its [`Target`]
//! and frames are re-resolved by id on each poll, so a detached frame shows
//! up as an ordinary [`SurfaceError`] instead of a dangling handle.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u64),
    #[error("frame {0} is detached")]
    FrameDetached(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("{0}")]
    Other(String),
}

pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Stable identifier of a frame within one page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameId(pub String);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub id: FrameId,
    pub name: String,
    pub url: String,
}

/// Attributes of an `<iframe>` element as seen from its parent document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IframeElement {
    pub src: String,
    pub name: String,
    pub id: String,
    /// Rendered height in CSS pixels
    pub height: f64,
}

/// Where a query runs: the top-level document or one child frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Page,
    Frame(FrameId),
}

impl Target {
    pub fn frame(frame: &FrameInfo) -> Self {
        Target::Frame(frame.id.clone())
    }
}

#[async_trait]
pub trait Surface: Send + Sync {
    async fn goto(&self, url: &str, timeout_ms: u64) -> SurfaceResult<()>;
    async fn reload(&self, timeout_ms: u64) -> SurfaceResult<()>;

    async fn url(&self) -> SurfaceResult<String>;
    async fn title(&self) -> SurfaceResult<String>;

    /// Every frame of the page except the main frame.
    async fn frames(&self) -> SurfaceResult<Vec<FrameInfo>>;

    /// `<iframe>` elements matching `selector` inside `target`.
    async fn iframes(&self, target: &Target, selector: &str) -> SurfaceResult<Vec<IframeElement>>;

    /// Evaluates a script expression and returns its JSON value.
    async fn evaluate(&self, target: &Target, script: &str) -> SurfaceResult<Value>;

    async fn query_exists(&self, target: &Target, selector: &str) -> SurfaceResult<bool>;

    /// Waits up to `timeout_ms` for `selector`; `Ok(false)` on timeout.
    async fn wait_for_selector(
        &self,
        target: &Target,
        selector: &str,
        timeout_ms: u64,
    ) -> SurfaceResult<bool>;

    /// Serialized markup of the target document.
    async fn content(&self, target: &Target) -> SurfaceResult<String>;

    /// Text of the first element matching `selector`, or "" when none.
    async fn inner_text(&self, target: &Target, selector: &str) -> SurfaceResult<String>;

    /// PNG bytes of the viewport (page) or of the frame's element.
    async fn screenshot(&self, target: &Target) -> SurfaceResult<Vec<u8>>;

    /// Cooperative wait. Surfaces may override it to observe page time.
    async fn wait_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn close(&self) -> SurfaceResult<()>;
}

/// Opens exclusive surfaces for the runner, one per item.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn open(&self) -> anyhow::Result<Box<dyn Surface>>;

    /// Releases the backend once the run is over.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

const RELOAD_SETTLE_MS: u64 = 700;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Navigates with one retry: after a failed first attempt the page is
/// reloaded and loaded again. Returns whether either attempt succeeded.
pub async fn navigate(surface: &dyn Surface, url: &str, timeout_ms: u64) -> bool {
    for attempt in 0..2 {
        match surface.goto(url, timeout_ms).await {
            Ok(()) => return true,
            Err(err) => {
                log_warn!("goto failed attempt={} url={} err={}", attempt + 1, url, err);
                if attempt == 0 {
                    surface.wait_ms(RELOAD_SETTLE_MS).await;
                    if let Err(err) = surface.reload(timeout_ms).await {
                        log_warn!("reload failed url={} err={}", url, err);
                    }
                }
            }
        }
    }
    false
}

/// The child frame an `<iframe>` element hosts, matched by name or src.
pub fn frame_for_iframe<'a>(frames: &'a [FrameInfo], iframe: &IframeElement) -> Option<&'a FrameInfo> {
    frames.iter().find(|f| {
        (!iframe.name.is_empty() && f.name == iframe.name)
            || (!iframe.src.is_empty() && f.url == iframe.src)
    })
}

/// Frame URL for logging, or "" for the page.
pub fn target_label(target: &Target, frames: &[FrameInfo]) -> String {
    match target {
        Target::Page => "page".to_string(),
        Target::Frame(id) => frames
            .iter()
            .find(|f| &f.id == id)
            .map(|f| format!("frame[{}]", if f.name.is_empty() { "noname" } else { f.name.as_str() }))
            .unwrap_or_else(|| format!("frame[{id}]")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, name: &str, url: &str) -> FrameInfo {
        FrameInfo {
            id: FrameId(id.to_string()),
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn iframe_matches_by_name_then_src() {
        let frames = vec![
            frame("1", "ads", "https://ads.example/"),
            frame("2", "pcreserveiframe", "https://yoyaku.example/cal"),
            frame("3", "", "https://other.example/embed"),
        ];
        let by_name = IframeElement {
            name: "pcreserveiframe".into(),
            ..IframeElement::default()
        };
        assert_eq!(frame_for_iframe(&frames, &by_name).map(|f| f.id.0.as_str()), Some("2"));

        let by_src = IframeElement {
            src: "https://other.example/embed".into(),
            ..IframeElement::default()
        };
        assert_eq!(frame_for_iframe(&frames, &by_src).map(|f| f.id.0.as_str()), Some("3"));

        assert!(frame_for_iframe(&frames, &IframeElement::default()).is_none());
    }

    #[test]
    fn labels() {
        let frames = vec![frame("1", "", "u"), frame("2", "cal", "v")];
        assert_eq!(target_label(&Target::Page, &frames), "page");
        assert_eq!(target_label(&Target::Frame(FrameId("1".into())), &frames), "frame[noname]");
        assert_eq!(target_label(&Target::Frame(FrameId("2".into())), &frames), "frame[cal]");
    }
}
