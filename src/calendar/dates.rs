use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

static YEAR_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})\s*[年/.]\s*(\d{1,2})\s*月").expect("static regex"));
static MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*月").expect("static regex"));
static SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})[/.](\d{1,2})").expect("static regex"));
static KANJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})月(\d{1,2})").expect("static regex"));
static WEEKDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\([月火水木金土日]\)").expect("static regex"));
static DAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,2})日").expect("static regex"));

/// Year and month that header dates without an explicit month belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseMonth {
    pub year: i32,
    pub month: u32,
}

impl BaseMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Looks for `YYYY年M月` in the page text, then a bare `M月`, else `today`.
    pub fn from_page_text(text: &str, today: NaiveDate) -> Self {
        let mut base = Self::of(today);
        if let Some(caps) = YEAR_MONTH_RE.captures(text) {
            if let Some(year) = caps[1].parse::<i32>().ok().filter(|y| *y > 0) {
                base.year = year;
            }
            if let Some(month) = caps[2].parse::<u32>().ok().filter(|m| *m > 0) {
                base.month = month;
            }
            return base;
        }
        if let Some(caps) = MONTH_RE.captures(text) {
            if let Some(month) = caps[1].parse::<u32>().ok().filter(|m| *m > 0) {
                base.month = month;
            }
        }
        base
    }
}

fn num(s: &str) -> Option<u32> {
    s.parse().ok()
}

/// Resolves a header cell such as `10/19(日)`, `10月19日`, `19(日)` or
/// `19日` to a calendar date relative to `base`.
pub fn parse_header_date(text: &str, base: BaseMonth) -> Option<NaiveDate> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if clean.is_empty() {
        return None;
    }

    let (month, day) = if let Some(caps) = SLASH_RE.captures(&clean) {
        (num(&caps[1]), num(&caps[2]))
    } else if let Some(caps) = KANJI_RE.captures(&clean) {
        (num(&caps[1]), num(&caps[2]))
    } else if let Some(caps) = WEEKDAY_RE.captures(&clean) {
        (None, num(&caps[1]))
    } else if let Some(caps) = DAY_RE.captures(&clean) {
        (None, num(&caps[1]))
    } else {
        return None;
    };

    let day = day.filter(|d| (1..=31).contains(d))?;
    let month = month
        .filter(|m| (1..=12).contains(m))
        .unwrap_or(base.month);

    let mut year = base.year;
    if base.month == 12 && month == 1 {
        year += 1;
    }
    if base.month == 1 && month == 12 {
        year -= 1;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn base_month_prefers_full_year_month() {
        let today = ymd(2026, 10, 19);
        assert_eq!(
            BaseMonth::from_page_text("2025年 12月の予約", today),
            BaseMonth { year: 2025, month: 12 }
        );
        assert_eq!(
            BaseMonth::from_page_text("11月 カレンダー", today),
            BaseMonth { year: 2026, month: 11 }
        );
        assert_eq!(BaseMonth::from_page_text("no hints", today), BaseMonth::of(today));
    }

    #[test]
    fn header_formats() {
        let base = BaseMonth { year: 2026, month: 10 };
        assert_eq!(parse_header_date("10/19(日)", base), Some(ymd(2026, 10, 19)));
        assert_eq!(parse_header_date("10.20", base), Some(ymd(2026, 10, 20)));
        assert_eq!(parse_header_date("10 月 21 日", base), Some(ymd(2026, 10, 21)));
        assert_eq!(parse_header_date("22(水)", base), Some(ymd(2026, 10, 22)));
        assert_eq!(parse_header_date("23日", base), Some(ymd(2026, 10, 23)));
        assert_eq!(parse_header_date("時間", base), None);
        assert_eq!(parse_header_date("", base), None);
    }

    #[test]
    fn year_rolls_over_at_december() {
        let december = BaseMonth { year: 2026, month: 12 };
        assert_eq!(parse_header_date("1/2(土)", december), Some(ymd(2027, 1, 2)));
        let january = BaseMonth { year: 2027, month: 1 };
        assert_eq!(parse_header_date("12/31", january), Some(ymd(2026, 12, 31)));
    }

    #[test]
    fn out_of_range_values() {
        let base = BaseMonth { year: 2026, month: 2 };
        assert_eq!(parse_header_date("45日", base), None);
        // invalid month falls back to the base month
        assert_eq!(parse_header_date("13/5", base), Some(ymd(2026, 2, 5)));
        // February 30th does not exist
        assert_eq!(parse_header_date("30日", base), None);
    }
}
