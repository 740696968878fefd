use super::surface::{frame_for_iframe, FrameInfo, IframeElement, Surface, Target};
use crate::calendar::ScrapeReason;
use crate::utils::text::truncate_chars;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

pub const RESERVE_FRAME_NAME: &str = "pcreserveiframe";
pub const VENDOR_HOST: &str = "yoyaku.cityheaven.net";

pub const RESERVE_IFRAME_SELECTOR: &str = "iframe[name='pcreserveiframe'], iframe#pcreserveiframe";
pub const VENDOR_IFRAME_SELECTOR: &str = "iframe[name='pcreserveiframe'], iframe#pcreserveiframe, \
     iframe[src*='yoyaku.cityheaven.net'], iframe[src*='A6ShopReservation']";
const SCAN_IFRAME_SELECTOR: &str = "iframe[name='pcreserveiframe'], iframe#pcreserveiframe, \
     iframe[src*='yoyaku.cityheaven.net'], iframe[src*='A6ShopReservation'], \
     iframe[src*='ShopReservation']";

const ERROR_MSG_SELECTOR: &str = "div.error-msg";
const NOT_RESERVABLE_TEXT: &str = "予約できません";

/// The vendor's own error page (host error path or error code).
pub fn is_vendor_error_url(url: &str) -> bool {
    url.contains("yoyaku.cityheaven.net/error") || url.contains("EFRESV")
}

/// Any error path, including relative `/error/` routes.
pub fn is_error_url(url: &str) -> bool {
    is_vendor_error_url(url) || url.contains("/error/")
}

fn is_calendar_iframe(el: &IframeElement) -> bool {
    let hay = format!("{} {} {}", el.src, el.name, el.id);
    hay.contains(VENDOR_HOST)
        || hay.contains("ShopReservation")
        || (el.src.contains("calendar") && el.src.contains("cityheaven"))
}

/// Calendar over error page over anything else.
fn vendor_frame_rank(url: &str) -> u8 {
    if url.contains("yoyaku.cityheaven.net/calendar") {
        0
    } else if url.contains("yoyaku.cityheaven.net/error") {
        1
    } else {
        2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Discovery {
    Found(FrameInfo),
    /// Stop polling: the page will never produce a calendar.
    Terminal {
        reason: ScrapeReason,
        frame_url: Option<String>,
    },
    NotFound,
}

impl Discovery {
    fn terminal(reason: ScrapeReason, frame_url: Option<String>) -> Self {
        Discovery::Terminal { reason, frame_url }
    }
}

/// Finds the calendar frame: by its well-known name, then through iframe
/// elements in every document, then by frame URL. `waited_ms` is the time
/// already spent polling, used for the empty-src grace period.
pub async fn discover_frame(
    surface: &dyn Surface,
    waited_ms: u64,
    max_wait_ms: u64,
    no_src_grace_ms: u64,
) -> Discovery {
    let frames = surface.frames().await.unwrap_or_default();

    if let Some(named) = frames.iter().find(|f| f.name == RESERVE_FRAME_NAME) {
        if is_error_url(&named.url) {
            return Discovery::terminal(
                ScrapeReason::NotReservable(Some("frame_url_error".into())),
                Some(named.url.clone()),
            );
        }
        let msg = surface
            .inner_text(&Target::frame(named), ERROR_MSG_SELECTOR)
            .await
            .unwrap_or_default();
        if msg.trim().contains(NOT_RESERVABLE_TEXT) {
            return Discovery::terminal(
                ScrapeReason::NotReservable(Some("error_msg_in_frame".into())),
                Some(named.url.clone()),
            );
        }
        return Discovery::Found(named.clone());
    }

    let hosts = std::iter::once(Target::Page).chain(frames.iter().map(Target::frame));
    for host in hosts {
        let iframes = surface
            .iframes(&host, SCAN_IFRAME_SELECTOR)
            .await
            .unwrap_or_default();
        for el in iframes {
            if is_error_url(&el.src) {
                return Discovery::terminal(
                    ScrapeReason::NotReservable(Some("iframe_src_error".into())),
                    Some(el.src),
                );
            }
            if is_calendar_iframe(&el) {
                if let Some(frame) = frame_for_iframe(&frames, &el) {
                    return Discovery::Found(frame.clone());
                }
            }
        }
    }

    let vendor_frame = frames
        .iter()
        .filter(|f| f.url.contains("yoyaku.cityheaven.net/"))
        .min_by_key(|f| vendor_frame_rank(&f.url));
    if let Some(frame) = vendor_frame {
        return Discovery::Found(frame.clone());
    }

    log_debug!(
        "calendar iframe probe names={:?} urls={:?}",
        frame_names(&frames),
        frame_urls(&frames)
    );

    let reserve_el = surface
        .iframes(&Target::Page, RESERVE_IFRAME_SELECTOR)
        .await
        .unwrap_or_default()
        .into_iter()
        .next();
    if let Some(el) = reserve_el {
        let src = el.src.trim();
        if is_error_url(src) {
            return Discovery::terminal(
                ScrapeReason::NotReservable(Some("iframe_src_error".into())),
                Some(src.to_string()),
            );
        }
        let grace = no_src_grace_ms.min(max_wait_ms);
        if src.is_empty() && waited_ms >= grace {
            return Discovery::terminal(
                ScrapeReason::CalendarNotPresent(Some("iframe_no_src".into())),
                None,
            );
        }
    }

    Discovery::NotFound
}

/// First 20 frame names, for timeout diagnostics.
pub fn frame_names(frames: &[FrameInfo]) -> Vec<String> {
    frames.iter().take(20).map(|f| f.name.clone()).collect()
}

/// First 20 non-empty frame URLs, each cut to 200 chars.
pub fn frame_urls(frames: &[FrameInfo]) -> Vec<String> {
    frames
        .iter()
        .filter(|f| !f.url.is_empty())
        .take(20)
        .map(|f| truncate_chars(&f.url, 200).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_urls() {
        assert!(is_vendor_error_url("https://yoyaku.cityheaven.net/error/index"));
        assert!(is_vendor_error_url("https://x.example/p?code=EFRESV01"));
        assert!(!is_vendor_error_url("https://x.example/error/"));
        assert!(is_error_url("https://x.example/error/"));
    }

    #[test]
    fn calendar_iframe_matching() {
        let el = |src: &str, name: &str| IframeElement {
            src: src.into(),
            name: name.into(),
            ..IframeElement::default()
        };
        assert!(is_calendar_iframe(&el("https://yoyaku.cityheaven.net/calendar/1", "")));
        assert!(is_calendar_iframe(&el("/A6ShopReservation/?girl=1", "")));
        assert!(is_calendar_iframe(&el("https://www.cityheaven.net/calendar/", "")));
        assert!(!is_calendar_iframe(&el("https://ads.example/frame", "banner")));
    }

    #[test]
    fn ranking_prefers_calendar() {
        assert!(
            vendor_frame_rank("https://yoyaku.cityheaven.net/calendar/x")
                < vendor_frame_rank("https://yoyaku.cityheaven.net/error/x")
        );
        assert_eq!(vendor_frame_rank("https://yoyaku.cityheaven.net/top"), 2);
    }
}
