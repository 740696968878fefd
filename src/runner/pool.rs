use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{ItemJob, ItemResult, ItemTiming, RunError, RunSettings};
use crate::calendar::ScrapeReason;
use crate::sensing::surface::{navigate, Surface, SurfaceFactory, Target};
use crate::sensing::{count_calendar_slots, ScrapeContext};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Markup fragments of the site's own abuse page. Seeing one means every
/// further request is wasted, so the whole run stops.
const BLOCK_MARKERS: [&str; 3] = [
    "detected as abnormal",
    "Please try again later",
    "Your current behavior",
];

const SLOWEST_REPORTED: usize = 5;

fn blocked_marker(html: &str) -> Option<&'static str> {
    BLOCK_MARKERS.into_iter().find(|m| html.contains(m))
}

/// Scrapes every job with at most `concurrency` pages open at once.
///
/// Cancellation and the stop flag are checked before each item starts; an
/// item already running finishes. A blocked-by-site page cancels the rest
/// of the run and is returned as the error.
pub async fn scrape_items(
    factory: Arc<dyn SurfaceFactory>,
    jobs: Vec<ItemJob>,
    settings: Arc<RunSettings>,
    cancel: CancellationToken,
) -> Result<Vec<ItemResult>, RunError> {
    let permits = Arc::new(Semaphore::new(settings.config.auto.concurrency.max(1)));
    let mut workers = JoinSet::new();

    for job in jobs {
        let factory = Arc::clone(&factory);
        let settings = Arc::clone(&settings);
        let permits = Arc::clone(&permits);
        let cancel = cancel.clone();
        workers.spawn(async move {
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return Ok(None),
                },
                _ = cancel.cancelled() => return Ok(None),
            };
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if settings.stop_requested() {
                log_info!("stop flag present, skipping item={}", job.id);
                cancel.cancel();
                return Ok(None);
            }
            scrape_one(factory.as_ref(), &settings, job).await.map(Some)
        });
    }

    let mut results = Vec::new();
    let mut failure = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(Some(result))) => results.push(result),
            Ok(Ok(None)) => {}
            Ok(Err(err)) => {
                log_error!("run aborted: {err}");
                cancel.cancel();
                failure.get_or_insert(err);
            }
            Err(err) => {
                log_error!("worker join failed: {err}");
                failure.get_or_insert(RunError::Worker(err.to_string()));
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    log_slowest(&results);
    Ok(results)
}

async fn scrape_one(
    factory: &dyn SurfaceFactory,
    settings: &RunSettings,
    job: ItemJob,
) -> Result<ItemResult, RunError> {
    let surface = match factory.open().await {
        Ok(surface) => surface,
        Err(err) => {
            log_error!("open page failed item={} err={err:#}", job.id);
            return Ok(failed_result(job, ScrapeReason::NavigationFailed, ItemTiming::default()));
        }
    };

    let outcome = scrape_on_surface(surface.as_ref(), settings, job).await;
    if let Err(err) = surface.close().await {
        log_warn!("close page failed err={}", err);
    }
    outcome
}

async fn scrape_on_surface(
    surface: &dyn Surface,
    settings: &RunSettings,
    job: ItemJob,
) -> Result<ItemResult, RunError> {
    let cfg = &settings.config.stabilizer;
    let started = Instant::now();

    settings.limiter.wait_turn().await;
    let goto_start = Instant::now();
    let navigated = navigate(surface, &job.reservation_url, cfg.nav_timeout_ms).await;
    let goto_s = goto_start.elapsed().as_secs_f64();
    if !navigated {
        log_warn!("navigation failed item={} url={}", job.id, job.reservation_url);
        let timing = ItemTiming {
            goto_s,
            count_s: 0.0,
            total_s: started.elapsed().as_secs_f64(),
        };
        return Ok(failed_result(job, ScrapeReason::NavigationFailed, timing));
    }
    surface.wait_ms(cfg.after_goto_wait_ms).await;

    let html = surface.content(&Target::Page).await.unwrap_or_default();
    if let Some(marker) = blocked_marker(&html) {
        return Err(RunError::BlockedBySite {
            item_id: job.id,
            marker: marker.to_string(),
        });
    }

    let ctx = ScrapeContext {
        item_id: &job.id,
        group: &job.group,
        today: settings.today,
        config: cfg,
        diagnostics: settings.diagnostics.as_ref(),
    };
    let count_start = Instant::now();
    let scrape = count_calendar_slots(surface, &ctx).await;
    let timing = ItemTiming {
        goto_s,
        count_s: count_start.elapsed().as_secs_f64(),
        total_s: started.elapsed().as_secs_f64(),
    };

    let retries = scrape
        .summary
        .detail
        .as_ref()
        .map_or(0, |d| d.sanity_retries);
    log_info!(
        "calendar perf item={} goto_s={:.2} count_s={:.2} total_s={:.2} sanity_retries={} ok={} reason={}",
        job.id,
        timing.goto_s,
        timing.count_s,
        timing.total_s,
        retries,
        scrape.summary.ok,
        scrape.summary.reason_str()
    );

    Ok(ItemResult {
        job,
        summary: scrape.summary,
        frame_url: scrape.frame_url,
        timing,
    })
}

fn failed_result(job: ItemJob, reason: ScrapeReason, timing: ItemTiming) -> ItemResult {
    ItemResult {
        job,
        summary: reason.into(),
        frame_url: None,
        timing,
    }
}

fn log_slowest(results: &[ItemResult]) {
    let mut by_time: Vec<&ItemResult> = results.iter().collect();
    by_time.sort_by(|a, b| b.timing.total_s.total_cmp(&a.timing.total_s));
    let slowest: Vec<String> = by_time
        .iter()
        .take(SLOWEST_REPORTED)
        .map(|r| format!("{}={:.2}s", r.job.id, r.timing.total_s))
        .collect();
    if !slowest.is_empty() {
        log_info!("calendar perf slowest items=[{}]", slowest.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_markers() {
        assert_eq!(
            blocked_marker("<p>Your access was detected as abnormal.</p>"),
            Some("detected as abnormal")
        );
        assert_eq!(blocked_marker("<p>calendar</p>"), None);
    }
}
