use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

use super::model::SlotKind;

const CALL_NOTICE: &str = "お電話にてお問い合わせください";
const DASH_TEXTS: [&str; 6] = ["―", "‐", "-", "–", "—", "ー"];
const CROSS_TEXTS: [&str; 3] = ["×", "✕", "✖"];

static MARU_SPAN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span[data-mark='○']").expect("static selector"));
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").expect("static selector"));

/// Attributes of the first `<img>` inside a cell, lowercased.
#[derive(Debug, Clone, Default)]
pub struct ImgAttrs {
    pub alt: String,
    pub title: String,
    pub aria: String,
    pub src: String,
    pub class: String,
    pub data_name: String,
}

impl ImgAttrs {
    fn mentions(&self, needle: &str) -> bool {
        [
            &self.alt,
            &self.title,
            &self.aria,
            &self.src,
            &self.class,
            &self.data_name,
        ]
        .iter()
        .any(|v| v.contains(needle))
    }
}

/// Everything the classifier looks at for one cell. Upper-cased fields
/// compare against upper-case tokens.
#[derive(Debug, Clone, Default)]
pub struct CellInfo {
    pub text: String,
    pub message: String,
    pub data_name: String,
    pub data_mark: String,
    pub data_status: String,
    pub aria: String,
    pub title: String,
    pub class: String,
    /// Lowercased background-image from the inline style
    pub background: String,
    pub has_maru_span: bool,
    pub img: Option<ImgAttrs>,
}

impl CellInfo {
    pub fn from_element(td: &ElementRef<'_>) -> Self {
        let attr = |name: &str| td.value().attr(name).unwrap_or("").trim().to_string();
        let upper = |name: &str| attr(name).to_uppercase();

        let img = td.select(&IMG).next().map(|img| {
            let a = |name: &str| img.value().attr(name).unwrap_or("").to_lowercase();
            ImgAttrs {
                alt: a("alt"),
                title: a("title"),
                aria: a("aria-label"),
                src: a("src"),
                class: a("class"),
                data_name: a("data-name"),
            }
        });

        Self {
            text: element_text(td),
            message: attr("data-name_message"),
            data_name: upper("data-name"),
            data_mark: upper("data-mark"),
            data_status: upper("data-status"),
            aria: upper("aria-label"),
            title: upper("title"),
            class: upper("class"),
            background: inline_background(td.value().attr("style").unwrap_or("")),
            has_maru_span: td.select(&MARU_SPAN).next().is_some(),
            img,
        }
    }
}

/// Trimmed text content of an element, with runs of whitespace collapsed.
pub fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn inline_background(style: &str) -> String {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(prop, _)| {
            let prop = prop.trim().to_lowercase();
            prop == "background-image" || prop == "background"
        })
        .map(|(_, value)| value.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered classification. The first matching rule wins.
pub fn classify_cell(cell: &CellInfo) -> SlotKind {
    let text = cell.text.as_str();
    let class = cell.class.as_str();

    if text.contains(CALL_NOTICE) || cell.message.contains(CALL_NOTICE) {
        return SlotKind::Excluded;
    }

    if cell.data_name == "TEL"
        || cell.data_status.contains("TEL")
        || text.to_uppercase() == "TEL"
        || cell.aria.contains("TEL")
        || cell.title.contains("TEL")
        || class.contains("TEL")
        || class.contains("PHONE")
    {
        return SlotKind::Tel;
    }

    if CROSS_TEXTS.contains(&text)
        || text.contains("不可")
        || cell.aria.contains('×')
        || cell.title.contains('×')
        || class.contains("NG")
    {
        return SlotKind::Bell;
    }

    // advance-booking circle
    if text.contains("〇先行") || text.contains("○先行") {
        return SlotKind::Maru;
    }

    if cell.data_mark == "○"
        || cell.data_mark == "MARU"
        || cell.has_maru_span
        || text == "○"
        || text == "〇"
        || class.contains("MARU")
        || class.contains("CIRCLE")
        || class.contains("OK")
        || cell.aria.contains('○')
    {
        return SlotKind::Maru;
    }

    if class.contains("BELL") || class.contains("CROSS") || cell.data_status.contains("NG") {
        return SlotKind::Bell;
    }

    let bg = cell.background.as_str();
    if bg.contains("bell") || bg.contains("cross") || bg.contains("ng") {
        return SlotKind::Bell;
    }

    if let Some(img) = &cell.img {
        if img.mentions("bell") || img.mentions("cross") {
            return SlotKind::Bell;
        }
        if img.mentions("tel") {
            return SlotKind::Tel;
        }
    }

    if DASH_TEXTS.contains(&text) {
        return SlotKind::Dash;
    }

    SlotKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn classify_html(td: &str) -> SlotKind {
        let html = Html::parse_fragment(&format!("<table><tr>{td}</tr></table>"));
        let sel = Selector::parse("td").unwrap();
        let el = html.select(&sel).next().unwrap();
        classify_cell(&CellInfo::from_element(&el))
    }

    #[test]
    fn notice_beats_everything() {
        assert_eq!(
            classify_html("<td class='tel'>お電話にてお問い合わせください</td>"),
            SlotKind::Excluded
        );
        assert_eq!(
            classify_html("<td data-name_message='お電話にてお問い合わせください'>×</td>"),
            SlotKind::Excluded
        );
    }

    #[test]
    fn tel_markers() {
        assert_eq!(classify_html("<td>TEL</td>"), SlotKind::Tel);
        assert_eq!(classify_html("<td data-name='tel'>x</td>"), SlotKind::Tel);
        assert_eq!(classify_html("<td class='phone-only'></td>"), SlotKind::Tel);
        assert_eq!(classify_html("<td><img src='/img/icon_tel.png'></td>"), SlotKind::Tel);
    }

    #[test]
    fn bell_markers() {
        assert_eq!(classify_html("<td>×</td>"), SlotKind::Bell);
        assert_eq!(classify_html("<td>予約不可</td>"), SlotKind::Bell);
        assert_eq!(classify_html("<td data-status='ng'></td>"), SlotKind::Bell);
        assert_eq!(
            classify_html("<td style=\"background-image:url('/img/bell.png')\"></td>"),
            SlotKind::Bell
        );
        assert_eq!(classify_html("<td><img alt='Bell'></td>"), SlotKind::Bell);
        assert_eq!(classify_html("<td><img src='/cross.gif'></td>"), SlotKind::Bell);
    }

    #[test]
    fn maru_markers() {
        assert_eq!(classify_html("<td>○</td>"), SlotKind::Maru);
        assert_eq!(classify_html("<td>〇先行</td>"), SlotKind::Maru);
        assert_eq!(classify_html("<td><span data-mark='○'></span></td>"), SlotKind::Maru);
        assert_eq!(classify_html("<td data-mark='maru'></td>"), SlotKind::Maru);
    }

    #[test]
    fn dash_and_other() {
        for dash in DASH_TEXTS {
            assert_eq!(classify_html(&format!("<td>{dash}</td>")), SlotKind::Dash);
        }
        assert_eq!(classify_html("<td>?</td>"), SlotKind::Other);
        assert_eq!(classify_html("<td></td>"), SlotKind::Other);
    }
}
