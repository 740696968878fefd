use super::loop_worker::stabilize_calendar;
use super::reservation::{check_not_reservable, probe_reservation_page, ReservationProbe};
use super::surface::{Surface, Target};
use super::{CalendarScrape, ScrapeContext};
use crate::calendar::ScrapeReason;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const SCROLL_SCRIPT: &str = "(() => { window.scrollTo(0, document.body.scrollHeight); return true; })()";
const SCROLL_ATTEMPTS: u32 = 3;
const SCROLL_SETTLE_MS: u64 = 400;

/// Counts the calendar slots of the page currently loaded in `surface`.
///
/// Runs the stabilizer on the short budget first. The long budget is only
/// spent when the short run timed out without finding the frame and the
/// page still shows some calendar evidence.
pub async fn count_calendar_slots(surface: &dyn Surface, ctx: &ScrapeContext<'_>) -> CalendarScrape {
    if let Some(why) = check_not_reservable(surface).await {
        return CalendarScrape::failed(ScrapeReason::NotReservable(Some(why)), None);
    }

    let probe = probe_reservation_page(surface).await;
    if let Err(reason) = gate_probe(surface, ctx, probe, "initial", true).await {
        return CalendarScrape::failed(reason, None);
    }

    let short_ms = ctx.config.short_budget_ms();
    let long_ms = ctx.config.long_budget_ms();

    let first = stabilize_calendar(surface, ctx, short_ms).await;
    if first.summary.ok {
        log_debug!("iframe_wait used=short item={} wait_ms={}", ctx.item_id, short_ms);
        return first;
    }
    let reason = first.summary.reason_str();
    if !reason.is_empty() && !reason.contains("iframe not detected") {
        return first;
    }

    let probe = probe_reservation_page(surface).await;
    let probe = match gate_probe(surface, ctx, probe, "recheck", false).await {
        Ok(probe) => probe,
        Err(reason) => return CalendarScrape::failed(reason, None),
    };
    if !probe.has_calendar_evidence() {
        log_debug!("iframe_wait used=skip item={} reason=no_evidence", ctx.item_id);
        return CalendarScrape::failed(ScrapeReason::IframeMissing, None);
    }
    if long_ms <= short_ms {
        return first;
    }

    log_debug!("iframe_wait used=long item={} wait_ms={}", ctx.item_id, long_ms);
    stabilize_calendar(surface, ctx, long_ms).await
}

/// Applies the login-iframe and not-reservable rules to a fresh probe.
/// Returns the (possibly re-taken) probe when polling should go ahead.
async fn gate_probe(
    surface: &dyn Surface,
    ctx: &ScrapeContext<'_>,
    mut probe: ReservationProbe,
    stage: &str,
    scroll_for_evidence: bool,
) -> Result<ReservationProbe, ScrapeReason> {
    if probe.login_like {
        surface.wait_ms(ctx.config.short_budget_ms()).await;
        probe = probe_reservation_page(surface).await;
        if probe.should_skip_login_like() {
            log_info!(
                "skip login iframe item={} stage={} frame_url={}",
                ctx.item_id,
                stage,
                probe.iframe_frame_url
            );
            return Err(ScrapeReason::NotReservable(Some("login_iframe_src".into())));
        }
    }

    let not_reservable = probe.effective_not_reservable();

    let no_signal = !(probe.iframe
        || probe.link
        || probe.iframe_hint
        || probe.has_calendar_table
        || probe.text_hit
        || probe.error_page);
    if scroll_for_evidence && probe.login_like && no_signal {
        let mut found = false;
        for _ in 0..SCROLL_ATTEMPTS {
            let _ = surface.evaluate(&Target::Page, SCROLL_SCRIPT).await;
            surface.wait_ms(SCROLL_SETTLE_MS).await;
            probe = probe_reservation_page(surface).await;
            if probe.iframe || probe.link || probe.has_calendar_table {
                found = true;
                break;
            }
        }
        if !found {
            log_info!("calendar not present item={} stage={}", ctx.item_id, stage);
            return Err(ScrapeReason::CalendarNotPresent(None));
        }
    }

    if not_reservable {
        if probe.should_reprobe_text_hit() {
            surface.wait_ms(ctx.config.text_hit_reprobe_ms).await;
            probe = probe_reservation_page(surface).await;
        }
        if probe.effective_not_reservable() {
            let detail = if probe.error_page {
                Some("error_page".to_string())
            } else if probe.should_reprobe_text_hit() {
                Some("text_hit".to_string())
            } else {
                None
            };
            log_info!(
                "skip not-reservable item={} stage={} detail={:?}",
                ctx.item_id,
                stage,
                detail
            );
            return Err(ScrapeReason::NotReservable(detail));
        }
    }

    Ok(probe)
}
