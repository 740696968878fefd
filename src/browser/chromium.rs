//! Chromium backend over the DevTools protocol.
//!
//! Frames are addressed by their CDP frame id. Scripts for a child frame
//! run in an isolated world created inside that frame, so cross-origin
//! reservation frames are reachable as long as they live in the page's
//! process (site isolation is switched off at launch).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, CreateIsolatedWorldParams,
    FrameId as CdpFrameId, FrameTree, GetFrameTreeParams, ReloadParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::sensing::surface::{
    FrameId, FrameInfo, IframeElement, Surface, SurfaceError, SurfaceFactory, SurfaceResult, Target,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const WORLD_NAME: &str = "slotwatch";
const SELECTOR_POLL_MS: u64 = 100;
const LAUNCH_ARGS: [&str; 3] = [
    "--disable-features=IsolateOrigins,site-per-process",
    "--lang=ja-JP",
    "--no-first-run",
];

pub struct ChromiumFactory {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumFactory {
    pub async fn launch(headful: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder();
        if headful {
            builder = builder.with_head();
        }
        let config = builder
            .args(LAUNCH_ARGS)
            .build()
            .map_err(|e| anyhow!("browser config failed: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch chromium")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            log_warn!("chromium event loop exited");
        });
        log_info!("chromium launched headful={}", headful);

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl SurfaceFactory for ChromiumFactory {
    async fn open(&self) -> Result<Box<dyn Surface>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to open page")?;
        Ok(Box::new(ChromiumSurface { page }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        self.handler.abort();
        closed.map(|_| ()).context("failed to close chromium")
    }
}

#[derive(Deserialize)]
struct IframeRow {
    src: String,
    name: String,
    id: String,
    height: f64,
}

pub struct ChromiumSurface {
    page: Page,
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn other<E: std::fmt::Display>(err: E) -> SurfaceError {
    SurfaceError::Other(err.to_string())
}

fn flatten_frames(tree: &FrameTree, out: &mut Vec<FrameInfo>) {
    for child in tree.child_frames.iter().flatten() {
        out.push(FrameInfo {
            id: FrameId(child.frame.id.inner().clone()),
            name: child.frame.name.clone().unwrap_or_default(),
            url: child.frame.url.clone(),
        });
        flatten_frames(child, out);
    }
}

impl ChromiumSurface {
    async fn run(&self, target: &Target, expression: &str) -> SurfaceResult<Value> {
        let mut params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true);
        if let Target::Frame(id) = target {
            let world = CreateIsolatedWorldParams::builder()
                .frame_id(CdpFrameId::new(id.0.clone()))
                .world_name(WORLD_NAME)
                .build()
                .map_err(SurfaceError::Other)?;
            let created = self
                .page
                .execute(world)
                .await
                .map_err(|_| SurfaceError::FrameDetached(id.to_string()))?;
            params = params.context_id(created.execution_context_id);
        }
        let params = params.build().map_err(SurfaceError::Evaluation)?;
        let evaluated = self
            .page
            .execute(params)
            .await
            .map_err(|e| SurfaceError::Evaluation(e.to_string()))?;
        if let Some(details) = &evaluated.exception_details {
            return Err(SurfaceError::Evaluation(details.text.clone()));
        }
        Ok(evaluated.result.value.clone().unwrap_or(Value::Null))
    }

    async fn run_as<T: serde::de::DeserializeOwned>(&self, target: &Target, expression: &str) -> SurfaceResult<T> {
        let value = self.run(target, expression).await?;
        serde_json::from_value(value).map_err(|e| SurfaceError::Evaluation(e.to_string()))
    }

    async fn await_load(&self, timeout_ms: u64) -> SurfaceResult<()> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(other(err)),
            Err(_) => Err(SurfaceError::NavigationTimeout(timeout_ms)),
        }
    }
}

#[async_trait]
impl Surface for ChromiumSurface {
    async fn goto(&self, url: &str, timeout_ms: u64) -> SurfaceResult<()> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(other(err)),
            Err(_) => Err(SurfaceError::NavigationTimeout(timeout_ms)),
        }
    }

    async fn reload(&self, timeout_ms: u64) -> SurfaceResult<()> {
        self.page
            .execute(ReloadParams::default())
            .await
            .map_err(other)?;
        self.await_load(timeout_ms).await
    }

    async fn url(&self) -> SurfaceResult<String> {
        Ok(self.page.url().await.map_err(other)?.unwrap_or_default())
    }

    async fn title(&self) -> SurfaceResult<String> {
        self.run_as(&Target::Page, "document.title || ''").await
    }

    async fn frames(&self) -> SurfaceResult<Vec<FrameInfo>> {
        let tree = self
            .page
            .execute(GetFrameTreeParams::default())
            .await
            .map_err(other)?;
        let mut frames = Vec::new();
        flatten_frames(&tree.frame_tree, &mut frames);
        Ok(frames)
    }

    async fn iframes(&self, target: &Target, selector: &str) -> SurfaceResult<Vec<IframeElement>> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(el => ({{ \
               src: el.getAttribute('src') || '', name: el.getAttribute('name') || '', \
               id: el.id || '', height: el.getBoundingClientRect().height || 0 }}))",
            js_str(selector)
        );
        let rows: Vec<IframeRow> = self.run_as(target, &script).await?;
        Ok(rows
            .into_iter()
            .map(|r| IframeElement {
                src: r.src,
                name: r.name,
                id: r.id,
                height: r.height,
            })
            .collect())
    }

    async fn evaluate(&self, target: &Target, script: &str) -> SurfaceResult<Value> {
        self.run(target, script).await
    }

    async fn query_exists(&self, target: &Target, selector: &str) -> SurfaceResult<bool> {
        let script = format!("!!document.querySelector({})", js_str(selector));
        self.run_as(target, &script).await
    }

    async fn wait_for_selector(&self, target: &Target, selector: &str, timeout_ms: u64) -> SurfaceResult<bool> {
        let mut waited = 0;
        loop {
            if self.query_exists(target, selector).await? {
                return Ok(true);
            }
            if waited >= timeout_ms {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(SELECTOR_POLL_MS)).await;
            waited += SELECTOR_POLL_MS;
        }
    }

    async fn content(&self, target: &Target) -> SurfaceResult<String> {
        self.run_as(
            target,
            "document.documentElement ? document.documentElement.outerHTML : ''",
        )
        .await
    }

    async fn inner_text(&self, target: &Target, selector: &str) -> SurfaceResult<String> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.innerText || '') : ''; }})()",
            js_str(selector)
        );
        self.run_as(target, &script).await
    }

    async fn screenshot(&self, target: &Target) -> SurfaceResult<Vec<u8>> {
        if let Target::Frame(id) = target {
            // no element clip without the parent's iframe handle
            return Err(SurfaceError::Other(format!("frame screenshot unsupported ({id})")));
        }
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page.screenshot(params).await.map_err(other)
    }

    async fn close(&self) -> SurfaceResult<()> {
        self.page.clone().close().await.map_err(other)
    }
}
