//! Cheap checks on the reservation page before (and between) calendar
//! polls: explicit "cannot be reserved" messages and the evidence that a
//! calendar should exist at all.

use scraper::{Html, Selector};
use std::sync::LazyLock;

use super::frames::{
    is_vendor_error_url, RESERVE_FRAME_NAME, RESERVE_IFRAME_SELECTOR, VENDOR_HOST,
    VENDOR_IFRAME_SELECTOR,
};
use super::surface::{frame_for_iframe, FrameInfo, Surface, Target};
use crate::calendar::has_calendar_table;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

const NOT_RESERVABLE_PHRASES: [&str; 3] = ["予約できません", "予約できない", "予約不可"];
const HELPER_PHRASES: [&str; 3] = ["別の女の子", "お手数ですが", "該当の女の子"];

const BLOCK_TEXTS: [&str; 7] = [
    "予約できません",
    "予約できない",
    "予約不可",
    "指名できません",
    "別の女の子",
    "お手数ですが",
    "お店の空き状況を見る",
];

const LOGIN_KEYWORDS: [&str; 3] = [
    "ReservationLogin",
    "ShareToReservationLogin",
    "S6ShareToReservationLogin",
];
const LOGIN_IFRAME_MAX_HEIGHT: f64 = 300.0;

const LINK_HREF_TOKENS: [&str; 5] = ["A6ShopReservation", "Reservation", "reserve", "calendar", "yoyaku"];
const LINK_TEXT_TOKEN: &str = "予約";

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("static selector"));

fn is_relevant_frame(frame: &FrameInfo) -> bool {
    let url = frame.url.as_str();
    let by_url = !url.is_empty()
        && (url.contains(VENDOR_HOST)
            || url.contains("/A6ShopReservation")
            || url.contains("/calendar/")
            || url.contains("/error/")
            || url.contains("EFRESV"));
    by_url || frame.name.contains(RESERVE_FRAME_NAME)
}

async fn has_reserve_ui(surface: &dyn Surface) -> bool {
    for selector in ["#shop-reservation", RESERVE_IFRAME_SELECTOR] {
        if surface.query_exists(&Target::Page, selector).await.unwrap_or(false) {
            return true;
        }
    }
    false
}

async fn check_target(
    surface: &dyn Surface,
    target: &Target,
    url: &str,
    label: &str,
    require_reserve_ui: bool,
) -> Option<String> {
    if is_vendor_error_url(url) {
        return Some(format!("{label}:url_error"));
    }

    let msg = surface
        .inner_text(target, "div.error-msg")
        .await
        .unwrap_or_default();
    let text = if msg.trim().is_empty() {
        surface.inner_text(target, "body").await.unwrap_or_default()
    } else {
        msg
    };
    let text = text.trim();
    if text.is_empty() || !NOT_RESERVABLE_PHRASES.iter().any(|p| text.contains(*p)) {
        return None;
    }
    if require_reserve_ui && !has_reserve_ui(surface).await {
        return None;
    }

    let helpers: Vec<&str> = HELPER_PHRASES
        .into_iter()
        .filter(|p| text.contains(*p))
        .collect();
    let mut reason = format!("{label}:予約できません");
    if !helpers.is_empty() {
        reason.push('/');
        reason.push_str(&helpers.join(","));
    }
    Some(reason)
}

/// Detail of an explicit "cannot be reserved" signal on the page or a
/// reservation frame, e.g. `page:url_error` or
/// `frame[pcreserveiframe]:予約できません/別の女の子`.
pub async fn check_not_reservable(surface: &dyn Surface) -> Option<String> {
    let page_url = surface.url().await.unwrap_or_default();
    if let Some(reason) = check_target(surface, &Target::Page, &page_url, "page", true).await {
        log_debug!("skip not-reservable reason={} url={}", reason, page_url);
        return Some(reason);
    }

    let frames = surface.frames().await.unwrap_or_default();
    for frame in frames.iter().filter(|f| is_relevant_frame(f)) {
        let name = if frame.name.is_empty() { "noname" } else { frame.name.as_str() };
        let label = format!("frame[{name}]");
        if let Some(reason) =
            check_target(surface, &Target::frame(frame), &frame.url, &label, false).await
        {
            log_debug!(
                "skip not-reservable(in-frame) reason={} url={} frame_url={}",
                reason,
                page_url,
                frame.url
            );
            return Some(reason);
        }
    }
    None
}

/// Anchors pointing at a reservation flow, by href or by link text.
pub fn has_reservation_link(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let found = doc.select(&ANCHOR).any(|a| {
        let href = a.value().attr("href").unwrap_or("");
        LINK_HREF_TOKENS.iter().any(|t| href.contains(*t))
            || a.text().collect::<String>().contains(LINK_TEXT_TOKEN)
    });
    found
}

/// What the reservation page shows before any calendar polling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationProbe {
    pub iframe: bool,
    pub link: bool,
    /// Markup mentions the reserve iframe although no element matched
    pub iframe_hint: bool,
    pub text_hit: bool,
    pub error_page: bool,
    pub not_reservable: bool,
    pub has_calendar_table: bool,
    /// A small login iframe sits where the calendar should be
    pub login_like: bool,
    pub iframe_src: String,
    pub iframe_height: f64,
    pub iframe_frame_url: String,
}

impl ReservationProbe {
    /// A block phrase without a calendar may just be rendering late.
    pub fn should_reprobe_text_hit(&self) -> bool {
        self.text_hit && !self.has_calendar_table && !self.error_page && !self.login_like
    }

    pub fn should_skip_login_like(&self) -> bool {
        self.login_like
            && !self.has_calendar_table
            && LOGIN_KEYWORDS.iter().any(|k| self.iframe_frame_url.contains(*k))
    }

    /// `not_reservable`, except that a login iframe alone does not count.
    pub fn effective_not_reservable(&self) -> bool {
        if self.login_like {
            (self.text_hit && !self.has_calendar_table) || self.error_page
        } else {
            self.not_reservable
        }
    }

    /// Any sign that a calendar is (or will be) on this page.
    pub fn has_calendar_evidence(&self) -> bool {
        self.iframe || self.link || self.iframe_hint || self.has_calendar_table
    }
}

pub async fn probe_reservation_page(surface: &dyn Surface) -> ReservationProbe {
    let mut probe = ReservationProbe::default();

    let page_url = surface.url().await.unwrap_or_default();
    probe.error_page = page_url.contains("yoyaku.cityheaven.net/error");

    probe.iframe = surface
        .query_exists(&Target::Page, VENDOR_IFRAME_SELECTOR)
        .await
        .unwrap_or(false);

    let frames = surface.frames().await.unwrap_or_default();
    let first_iframe = surface
        .iframes(&Target::Page, VENDOR_IFRAME_SELECTOR)
        .await
        .unwrap_or_default()
        .into_iter()
        .next();
    if let Some(el) = &first_iframe {
        probe.iframe_src = el.src.clone();
        probe.iframe_height = el.height;
        if let Some(frame) = frame_for_iframe(&frames, el) {
            probe.iframe_frame_url = frame.url.clone();
        }
        probe.login_like = !el.src.is_empty()
            && LOGIN_KEYWORDS.iter().any(|k| el.src.contains(*k))
            && el.height <= LOGIN_IFRAME_MAX_HEIGHT;
    }

    let page_html = surface.content(&Target::Page).await.unwrap_or_default();
    probe.link = has_reservation_link(&page_html);
    if !probe.iframe && !probe.link {
        probe.iframe_hint = page_html.contains(RESERVE_FRAME_NAME);
    }

    let body = surface
        .inner_text(&Target::Page, "body")
        .await
        .unwrap_or_default();
    probe.text_hit = BLOCK_TEXTS.iter().any(|t| body.contains(*t));

    if probe.iframe {
        let reserve_frame = match frames.iter().find(|f| f.name == RESERVE_FRAME_NAME) {
            Some(frame) => Some(frame),
            None => surface
                .iframes(&Target::Page, RESERVE_IFRAME_SELECTOR)
                .await
                .unwrap_or_default()
                .first()
                .and_then(|el| frame_for_iframe(&frames, el)),
        };
        if let Some(frame) = reserve_frame {
            let html = surface
                .content(&Target::frame(frame))
                .await
                .unwrap_or_default();
            probe.has_calendar_table = has_calendar_table(&html);
            if !frame.url.is_empty() {
                probe.iframe_frame_url = frame.url.clone();
            }
            if is_vendor_error_url(&probe.iframe_frame_url) {
                probe.error_page = true;
            }
        }
    }
    if !probe.has_calendar_table {
        probe.has_calendar_table = has_calendar_table(&page_html);
    }

    probe.not_reservable =
        (probe.text_hit && !probe.has_calendar_table) || probe.error_page || probe.login_like;
    probe
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::surface::FrameId;

    #[test]
    fn reservation_links() {
        assert!(has_reservation_link("<a href='/A6ShopReservation/?g=1'>x</a>"));
        assert!(has_reservation_link("<a href='/top'>ネット予約はこちら</a>"));
        assert!(!has_reservation_link("<a href='/top'>トップ</a><p>予約</p>"));
    }

    #[test]
    fn login_like_rules() {
        let probe = ReservationProbe {
            login_like: true,
            not_reservable: true,
            iframe_frame_url: "https://yoyaku.example/S6ShareToReservationLogin/".into(),
            ..ReservationProbe::default()
        };
        assert!(probe.should_skip_login_like());
        assert!(!probe.effective_not_reservable());

        let with_table = ReservationProbe {
            has_calendar_table: true,
            ..probe.clone()
        };
        assert!(!with_table.should_skip_login_like());

        let error = ReservationProbe {
            error_page: true,
            ..probe
        };
        assert!(error.effective_not_reservable());
    }

    #[test]
    fn text_hit_reprobe() {
        let probe = ReservationProbe {
            text_hit: true,
            ..ReservationProbe::default()
        };
        assert!(probe.should_reprobe_text_hit());
        let settled = ReservationProbe {
            has_calendar_table: true,
            ..probe
        };
        assert!(!settled.should_reprobe_text_hit());
    }

    #[test]
    fn relevant_frames() {
        let frame = |name: &str, url: &str| FrameInfo {
            id: FrameId("f".into()),
            name: name.into(),
            url: url.into(),
        };
        assert!(is_relevant_frame(&frame("", "https://yoyaku.cityheaven.net/calendar/1")));
        assert!(is_relevant_frame(&frame("pcreserveiframe", "about:blank")));
        assert!(!is_relevant_frame(&frame("ads", "https://ads.example/")));
    }
}
