use serde_json::Value;

use super::frames::{discover_frame, frame_names, frame_urls, Discovery};
use super::reservation::check_not_reservable;
use super::surface::{FrameInfo, Surface, Target};
use super::{CalendarScrape, ScrapeContext};
use crate::calendar::{
    check_calendar, extract_summary, looks_all_dash, LightSignature, SanityIssue, ScrapeReason,
    SlotSummary, StabilizeDetail, LIGHT_PROBE_SCRIPT,
};
use crate::suspicious::{confirm_hit, light_probe, should_dump, DumpMeta, DumpRequest, SuspiciousVerdict};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const TABLE_SELECTOR: &str = "table, td";

enum Poll {
    Done(CalendarScrape),
    /// Sleep, optionally after a not-reservable check.
    Wait { ms: u64, check: bool },
}

struct Stabilizer<'a, 'c> {
    surface: &'a dyn Surface,
    ctx: &'a ScrapeContext<'c>,
    max_wait_ms: u64,

    waited: u64,
    slow_mode: bool,
    attempt: u32,
    light_hits: u32,
    last_light: Option<LightSignature>,
    /// Frame of the most recent successful light probe
    light_frame: Option<FrameInfo>,
    last_invalid: Option<(SlotSummary, SanityIssue, String)>,
    sanity_retries: u32,
    sanity_last_reason: Option<&'static str>,
    dumped: bool,
}

/// Polls the page until the calendar grid is settled and sane, or the
/// budget (the sum of waits, in ms) runs out. Never fails: every surface
/// error degrades into a retry or a typed reason.
pub async fn stabilize_calendar(
    surface: &dyn Surface,
    ctx: &ScrapeContext<'_>,
    max_wait_ms: u64,
) -> CalendarScrape {
    let mut stabilizer = Stabilizer {
        surface,
        ctx,
        max_wait_ms,
        waited: 0,
        slow_mode: false,
        attempt: 0,
        light_hits: 0,
        last_light: None,
        light_frame: None,
        last_invalid: None,
        sanity_retries: 0,
        sanity_last_reason: None,
        dumped: false,
    };
    stabilizer.run().await
}

impl<'a, 'c> Stabilizer<'a, 'c> {
    async fn run(&mut self) -> CalendarScrape {
        let step_ms = self.ctx.config.step_ms;
        while self.waited <= self.max_wait_ms {
            let discovery = discover_frame(
                self.surface,
                self.waited,
                self.max_wait_ms,
                self.ctx.config.iframe_no_src_grace_ms,
            )
            .await;

            let poll = match discovery {
                Discovery::Terminal { reason, frame_url } => {
                    return CalendarScrape::failed(reason, frame_url);
                }
                Discovery::Found(frame) => self.poll_frame(frame).await,
                Discovery::NotFound => Poll::Wait {
                    ms: step_ms,
                    check: true,
                },
            };

            match poll {
                Poll::Done(scrape) => return scrape,
                Poll::Wait { ms, check } => {
                    if check {
                        if let Some(why) = check_not_reservable(self.surface).await {
                            return CalendarScrape::failed(ScrapeReason::NotReservable(Some(why)), None);
                        }
                    }
                    self.surface.wait_ms(ms).await;
                    self.waited += ms;
                }
            }
        }
        self.on_timeout().await
    }

    fn detail(&self) -> StabilizeDetail {
        StabilizeDetail {
            sanity_retries: self.sanity_retries,
            sanity_last_reason: self.sanity_last_reason.map(str::to_string),
        }
    }

    fn slow_step(&mut self) -> Poll {
        self.slow_mode = true;
        Poll::Wait {
            ms: self.ctx.config.step_ms,
            check: true,
        }
    }

    async fn light_signature(&self, target: &Target) -> Result<LightSignature, String> {
        let value = self
            .surface
            .evaluate(target, LIGHT_PROBE_SCRIPT)
            .await
            .map_err(|err| err.to_string())?;
        if value.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = value
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("light_probe_failed");
            return Err(reason.to_string());
        }
        serde_json::from_value(value).map_err(|err| err.to_string())
    }

    async fn full_evaluation(&self, target: &Target) -> (SlotSummary, String) {
        match self.surface.content(target).await {
            Ok(html) => (extract_summary(&html, self.ctx.today), html),
            Err(err) => (SlotSummary::failed(format!("content failed: {err}")), String::new()),
        }
    }

    async fn poll_frame(&mut self, frame: FrameInfo) -> Poll {
        let cfg = self.ctx.config;
        let target = Target::frame(&frame);
        self.attempt += 1;

        let table_ready = self
            .surface
            .wait_for_selector(&target, TABLE_SELECTOR, cfg.fast_wait_ms)
            .await
            .unwrap_or(false);
        if !table_ready {
            log_debug!(
                "calendar retry item={} frame_url={} attempt={} reason=td_wait_timeout",
                self.ctx.item_id,
                frame.url,
                self.attempt
            );
            return self.slow_step();
        }

        let light = match self.light_signature(&target).await {
            Ok(light) => light,
            Err(reason) => {
                log_debug!(
                    "calendar retry item={} frame_url={} attempt={} reason={}",
                    self.ctx.item_id,
                    frame.url,
                    self.attempt,
                    reason
                );
                return self.slow_step();
            }
        };

        self.light_hits = if self.last_light == Some(light) {
            self.light_hits + 1
        } else {
            1
        };
        self.last_light = Some(light);
        self.light_frame = Some(frame.clone());
        log_debug!(
            "calendar stabilize probe item={} attempt={} td_count={} time_rows={} max_cols={} stable_hits={}/{}",
            self.ctx.item_id,
            self.attempt,
            light.td_count,
            light.time_rows,
            light.max_cols,
            self.light_hits,
            cfg.light_quorum
        );

        if self.light_hits < cfg.light_quorum {
            return if self.slow_mode {
                Poll::Wait {
                    ms: cfg.step_ms,
                    check: true,
                }
            } else {
                Poll::Wait {
                    ms: cfg.fast_step_ms,
                    check: false,
                }
            };
        }

        let (mut summary, frame_html) = self.full_evaluation(&target).await;
        let verdict = self.suspicious_verdict(&target, &frame_html).await;
        if should_dump(&summary, &verdict, Some(&frame.url)) && !self.dumped {
            self.dumped = true;
            self.dump(&target, &frame, &frame_html, &verdict).await;
        }
        summary.suspicious = Some(verdict);

        if !summary.ok {
            self.light_hits = 0;
            self.last_light = None;
            return Poll::Wait {
                ms: cfg.step_ms,
                check: true,
            };
        }

        if let Err(issue) = check_calendar(&summary) {
            log_debug!(
                "calendar retry item={} frame_url={} td_count={} time_rows={} max_cols={} expected_total={} total_slots={} reason={}",
                self.ctx.item_id,
                frame.url,
                summary.td_count,
                summary.time_rows,
                summary.max_cols,
                summary.expected_slots(),
                summary.total,
                issue.as_str()
            );
            self.sanity_retries += 1;
            self.sanity_last_reason = Some(issue.as_str());
            self.last_invalid = Some((summary, issue, frame.url.clone()));
            return self.slow_step();
        }

        summary.detail = Some(self.detail());
        if looks_all_dash(&summary) {
            summary.empty_calendar = true;
            summary.reason = Some(ScrapeReason::EmptyCalendar.to_string());
            log_info!(
                "calendar all-dash confirmed item={} waited_ms={} total={} dash={}",
                self.ctx.item_id,
                self.waited,
                summary.total,
                summary.dash
            );
        } else {
            log_info!(
                "calendar stats confirmed item={} frame_url={} td_count={} time_rows={} max_cols={} stable_hits={}",
                self.ctx.item_id,
                frame.url,
                summary.td_count,
                summary.time_rows,
                summary.max_cols,
                self.light_hits
            );
        }
        Poll::Done(CalendarScrape {
            summary,
            frame_url: Some(frame.url),
        })
    }

    async fn suspicious_verdict(&self, target: &Target, frame_html: &str) -> SuspiciousVerdict {
        match light_probe(self.surface, Some(target)).await {
            Some(hit) => {
                let page_html = self
                    .surface
                    .content(&Target::Page)
                    .await
                    .unwrap_or_default();
                confirm_hit(&hit, &page_html, frame_html)
            }
            None => SuspiciousVerdict::clear(),
        }
    }

    async fn dump(&self, target: &Target, frame: &FrameInfo, frame_html: &str, verdict: &SuspiciousVerdict) {
        let Some(sink) = self.ctx.diagnostics else {
            return;
        };
        let page_html = self
            .surface
            .content(&Target::Page)
            .await
            .unwrap_or_default();
        let meta = DumpMeta {
            group: self.ctx.group.to_string(),
            item_id: self.ctx.item_id.to_string(),
            page_url: self.surface.url().await.unwrap_or_default(),
            frame_url: frame.url.clone(),
            markers_hit: verdict.markers_hit.clone(),
            vendors: verdict.vendor_list(),
            strength: verdict.strength,
            excerpt: verdict.excerpt.clone(),
        };
        let request = DumpRequest {
            page_html: &page_html,
            frame_html,
            meta,
        };
        sink.dump(self.surface, Some(target), request).await;
    }

    /// Budget spent. A grid that was seen but never repeated gets one last
    /// full read and is returned marked unstable if it passes the checks.
    async fn on_timeout(&mut self) -> CalendarScrape {
        if let Some(frame) = self.light_frame.clone() {
            let target = Target::frame(&frame);
            let (mut summary, _) = self.full_evaluation(&target).await;
            if summary.ok {
                match check_calendar(&summary) {
                    Ok(()) => {
                        summary.unstable = true;
                        summary.empty_calendar = looks_all_dash(&summary);
                        summary.detail = Some(self.detail());
                        log_info!(
                            "calendar stats unstable item={} frame_url={} td_count={} time_rows={} max_cols={} stable_hits={} reason=light_stable_timeout",
                            self.ctx.item_id,
                            frame.url,
                            summary.td_count,
                            summary.time_rows,
                            summary.max_cols,
                            self.light_hits
                        );
                        return CalendarScrape {
                            summary,
                            frame_url: Some(frame.url),
                        };
                    }
                    Err(issue) => {
                        self.sanity_retries += 1;
                        self.sanity_last_reason = Some(issue.as_str());
                        self.last_invalid = Some((summary, issue, frame.url.clone()));
                    }
                }
            }
        }

        if let Some((mut summary, issue, frame_url)) = self.last_invalid.take() {
            log_info!(
                "calendar stats sanity invalid item={} frame_url={} reason={}",
                self.ctx.item_id,
                frame_url,
                issue.as_str()
            );
            summary.ok = false;
            summary.reason = Some(ScrapeReason::SanityFail(issue.as_str().to_string()).to_string());
            summary.detail = Some(self.detail());
            return CalendarScrape {
                summary,
                frame_url: Some(frame_url),
            };
        }

        if let Some(frame) = &self.light_frame {
            let mut summary = SlotSummary::from(ScrapeReason::TimeoutUnstable);
            summary.detail = Some(self.detail());
            return CalendarScrape {
                summary,
                frame_url: Some(frame.url.clone()),
            };
        }

        let frames = self.surface.frames().await.unwrap_or_default();
        log_info!(
            "calendar iframe not detected item={} waited_ms={} frame_names={:?} frame_urls={:?}",
            self.ctx.item_id,
            self.waited,
            frame_names(&frames),
            frame_urls(&frames)
        );
        CalendarScrape::failed(ScrapeReason::FrameNotDetected, None)
    }
}
