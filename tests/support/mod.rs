//! Scripted automation surface for driving the stabilizer and the runner
//! without a browser. Documents are static HTML parsed with `scraper`;
//! frame markup advances one snapshot per `wait_ms` call.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use slotwatch_lib::calendar::{light_signature, LIGHT_PROBE_SCRIPT};
use slotwatch_lib::sensing::surface::SurfaceResult;
use slotwatch_lib::sensing::{FrameId, FrameInfo, IframeElement, Surface, SurfaceError, SurfaceFactory, Target};
use slotwatch_lib::suspicious::SNIPPET_SCRIPT;

pub const CALENDAR_URL: &str = "https://yoyaku.cityheaven.net/calendar/girl/1";

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// A reservation calendar with `rows` half-hour rows and `cols` service
/// dates starting today. `cell(row, col)` gives each cell's text.
pub fn calendar_html(rows: usize, cols: usize, cell: impl Fn(usize, usize) -> &'static str) -> String {
    let mut html = String::from("<html><body><p>2026年10月</p><table><tr><th>時間</th>");
    for c in 0..cols {
        let date = today() + Duration::days(c as i64);
        html.push_str(&format!("<th>{}</th>", date.format("%-m/%-d")));
    }
    html.push_str("</tr>");
    for r in 0..rows {
        let minutes = 10 * 60 + r * 30;
        html.push_str(&format!("<tr><td>{}:{:02}</td>", minutes / 60, minutes % 60));
        for c in 0..cols {
            html.push_str(&format!("<td>{}</td>", cell(r, c)));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table></body></html>");
    html
}

/// 24 x 7 grid: bell on even rows of the first two dates, TEL in the
/// last column, open elsewhere.
pub fn busy_calendar() -> String {
    calendar_html(24, 7, |r, c| match (r, c) {
        (r, 0 | 1) if r % 2 == 0 => "×",
        (_, 6) => "TEL",
        _ => "○",
    })
}

pub fn reserve_page(frame_src: &str) -> String {
    format!(
        r#"<html><head><title>予約</title></head><body><div id="shop-reservation">
        <iframe name="pcreserveiframe" id="pcreserveiframe" src="{frame_src}" height="600"></iframe>
        </div></body></html>"#
    )
}

#[derive(Debug, Clone)]
pub struct FrameScript {
    pub name: String,
    pub url: String,
    pub snapshots: Vec<String>,
    /// Repeat the snapshots instead of holding the last one
    pub cycle: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PageScript {
    pub url: String,
    pub title: String,
    pub html: String,
    pub frames: Vec<FrameScript>,
}

impl PageScript {
    pub fn plain(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            html: html.to_string(),
            frames: Vec::new(),
        }
    }

    /// Reservation page hosting the calendar frame, whose markup walks
    /// through `snapshots`.
    pub fn calendar(url: &str, snapshots: Vec<String>) -> Self {
        Self {
            url: url.to_string(),
            title: "予約カレンダー".to_string(),
            html: reserve_page(CALENDAR_URL),
            frames: vec![FrameScript {
                name: "pcreserveiframe".to_string(),
                url: CALENDAR_URL.to_string(),
                snapshots,
                cycle: false,
            }],
        }
    }

    pub fn cycling(mut self) -> Self {
        for frame in &mut self.frames {
            frame.cycle = true;
        }
        self
    }
}

fn frame_id(idx: usize) -> FrameId {
    FrameId(format!("frame-{idx}"))
}

pub struct FakeSurface {
    pages: Arc<HashMap<String, PageScript>>,
    current: Mutex<PageScript>,
    tick: AtomicUsize,
    waited_ms: AtomicU64,
    gotos: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl FakeSurface {
    /// A surface with `page` already loaded.
    pub fn loaded(page: PageScript) -> Self {
        let pages = HashMap::from([(page.url.clone(), page.clone())]);
        let surface = Self::blank(Arc::new(pages), Arc::new(AtomicUsize::new(0)));
        *surface.current.lock().unwrap() = page;
        surface
    }

    fn blank(pages: Arc<HashMap<String, PageScript>>, closed: Arc<AtomicUsize>) -> Self {
        Self {
            pages,
            current: Mutex::new(PageScript::default()),
            tick: AtomicUsize::new(0),
            waited_ms: AtomicU64::new(0),
            gotos: AtomicUsize::new(0),
            closed,
        }
    }

    pub fn waited_ms(&self) -> u64 {
        self.waited_ms.load(Ordering::SeqCst)
    }

    pub fn goto_count(&self) -> usize {
        self.gotos.load(Ordering::SeqCst)
    }

    fn frame_html(&self, frame: &FrameScript) -> String {
        if frame.snapshots.is_empty() {
            return String::new();
        }
        let tick = self.tick.load(Ordering::SeqCst);
        let idx = if frame.cycle {
            tick % frame.snapshots.len()
        } else {
            tick.min(frame.snapshots.len() - 1)
        };
        frame.snapshots[idx].clone()
    }

    fn document(&self, target: &Target) -> SurfaceResult<String> {
        let page = self.current.lock().unwrap();
        match target {
            Target::Page => Ok(page.html.clone()),
            Target::Frame(id) => page
                .frames
                .iter()
                .enumerate()
                .find(|(idx, _)| frame_id(*idx) == *id)
                .map(|(_, frame)| self.frame_html(frame))
                .ok_or_else(|| SurfaceError::FrameDetached(id.to_string())),
        }
    }
}

fn select_all<T>(html: &str, selector: &str, map: impl Fn(scraper::ElementRef<'_>) -> T) -> Vec<T> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let found = doc.select(&selector).map(map).collect();
    found
}

#[async_trait]
impl Surface for FakeSurface {
    async fn goto(&self, url: &str, timeout_ms: u64) -> SurfaceResult<()> {
        self.gotos.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(page) => {
                *self.current.lock().unwrap() = page.clone();
                Ok(())
            }
            None => Err(SurfaceError::NavigationTimeout(timeout_ms)),
        }
    }

    async fn reload(&self, _timeout_ms: u64) -> SurfaceResult<()> {
        Ok(())
    }

    async fn url(&self) -> SurfaceResult<String> {
        Ok(self.current.lock().unwrap().url.clone())
    }

    async fn title(&self) -> SurfaceResult<String> {
        Ok(self.current.lock().unwrap().title.clone())
    }

    async fn frames(&self) -> SurfaceResult<Vec<FrameInfo>> {
        let page = self.current.lock().unwrap();
        Ok(page
            .frames
            .iter()
            .enumerate()
            .map(|(idx, frame)| FrameInfo {
                id: frame_id(idx),
                name: frame.name.clone(),
                url: frame.url.clone(),
            })
            .collect())
    }

    async fn iframes(&self, target: &Target, selector: &str) -> SurfaceResult<Vec<IframeElement>> {
        let html = self.document(target)?;
        let found = select_all(&html, selector, |el| {
            let attr = |name: &str| el.value().attr(name).unwrap_or("").to_string();
            (el.value().name() == "iframe").then(|| IframeElement {
                src: attr("src"),
                name: attr("name"),
                id: attr("id"),
                height: el.value().attr("height").and_then(|h| h.parse().ok()).unwrap_or(0.0),
            })
        });
        Ok(found.into_iter().flatten().collect())
    }

    async fn evaluate(&self, target: &Target, script: &str) -> SurfaceResult<Value> {
        let html = self.document(target)?;
        if script == LIGHT_PROBE_SCRIPT {
            return Ok(match light_signature(&html) {
                Ok(sig) => json!({
                    "ok": true,
                    "time_rows": sig.time_rows,
                    "td_count": sig.td_count,
                    "max_cols": sig.max_cols,
                }),
                Err(reason) => json!({ "ok": false, "reason": reason }),
            });
        }
        if script == SNIPPET_SCRIPT {
            return Ok(Value::String(html.chars().take(80_000).collect()));
        }
        Ok(Value::Bool(true))
    }

    async fn query_exists(&self, target: &Target, selector: &str) -> SurfaceResult<bool> {
        let html = self.document(target)?;
        Ok(!select_all(&html, selector, |_| ()).is_empty())
    }

    async fn wait_for_selector(&self, target: &Target, selector: &str, _timeout_ms: u64) -> SurfaceResult<bool> {
        self.query_exists(target, selector).await
    }

    async fn content(&self, target: &Target) -> SurfaceResult<String> {
        self.document(target)
    }

    async fn inner_text(&self, target: &Target, selector: &str) -> SurfaceResult<String> {
        let html = self.document(target)?;
        let texts = select_all(&html, selector, |el| el.text().collect::<String>());
        Ok(texts.into_iter().next().unwrap_or_default())
    }

    async fn screenshot(&self, _target: &Target) -> SurfaceResult<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }

    async fn wait_ms(&self, ms: u64) {
        self.waited_ms.fetch_add(ms, Ordering::SeqCst);
        self.tick.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) -> SurfaceResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out fresh surfaces that can navigate to any scripted page.
pub struct FakeFactory {
    pages: Arc<HashMap<String, PageScript>>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn new(pages: Vec<PageScript>) -> Self {
        let pages = pages.into_iter().map(|p| (p.url.clone(), p)).collect();
        Self {
            pages: Arc::new(pages),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurfaceFactory for FakeFactory {
    async fn open(&self) -> Result<Box<dyn Surface>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSurface::blank(
            Arc::clone(&self.pages),
            Arc::clone(&self.closed),
        )))
    }
}
