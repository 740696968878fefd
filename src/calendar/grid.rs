//! Slot-grid extraction from reservation-frame markup.
//!
//! The frame renders one table: a time-of-day column on the left, one
//! column per service date, cells spanning rows or columns. Extraction
//! expands every span into a `time_rows x max_cols` grid so each slot is
//! counted exactly once.

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::classify::{classify_cell, element_text, CellInfo};
use super::dates::{parse_header_date, BaseMonth};
use super::model::{LightSignature, SlotKind, SlotSummary};

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,2}:\d{2}").expect("static regex"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("static selector"));
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td, th").expect("static selector"));
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("static selector"));

/// Script evaluated in the frame for the light probe. Returns
/// `{ok, time_rows, td_count, max_cols}` or `{ok:false, reason}`, the same
/// shape as [`light_signature`].
pub const LIGHT_PROBE_SCRIPT: &str = r#"(() => {
  const timeRe = /^\s*\d{1,2}:\d{2}/;
  const tables = Array.from(document.querySelectorAll("table"));
  if (!tables.length) return { ok:false, reason:"no table" };
  let table = null;
  for (const t of tables) {
    const rows = Array.from(t.querySelectorAll("tr"));
    if (rows.some(r => timeRe.test((r.querySelector("td,th")?.innerText || "").trim()))) { table = t; break; }
  }
  table = table || tables[0];
  const rows = Array.from(table.querySelectorAll("tr"));
  const dataRows = rows.filter(r => {
    const first = r.querySelector("td,th");
    return !!first && timeRe.test(first.innerText.trim());
  });
  if (!dataRows.length) return { ok:false, reason:"no time rows" };
  let maxCols = 0;
  let tdCount = 0;
  for (const r of dataRows) {
    const tds = Array.from(r.children).filter(el => el.tagName === "TD" || el.tagName === "TH").slice(1);
    let cols = 0;
    tdCount += tds.length;
    for (const td of tds) {
      const cs = parseInt(td.getAttribute("colspan") || "1", 10) || 1;
      cols += cs;
    }
    if (cols > maxCols) maxCols = cols;
  }
  if (maxCols <= 0) return { ok:false, reason:"no cols" };
  return { ok:true, time_rows:dataRows.length, td_count:tdCount, max_cols:maxCols };
})()"#;

fn is_time_row(row: &ElementRef<'_>) -> bool {
    row.select(&CELL)
        .next()
        .map(|first| TIME_RE.is_match(&element_text(&first)))
        .unwrap_or(false)
}

/// TD/TH children of a row after the leading time cell.
fn data_cells<'a>(row: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .skip(1)
        .collect()
}

fn span_attr(el: &ElementRef<'_>, name: &str) -> usize {
    let raw = el.value().attr(name).unwrap_or("1").trim();
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => 1,
    }
}

struct CalendarTable<'a> {
    rows: Vec<ElementRef<'a>>,
    data_rows: Vec<usize>,
    max_cols: usize,
    td_count: usize,
}

fn locate_table<'a>(doc: &'a Html) -> Result<CalendarTable<'a>, &'static str> {
    let tables: Vec<ElementRef<'a>> = doc.select(&TABLE).collect();
    if tables.is_empty() {
        return Err("no table");
    }

    let table = tables
        .iter()
        .find(|t| t.select(&TR).any(|r| is_time_row(&r)))
        .unwrap_or(&tables[0]);

    let rows: Vec<ElementRef<'a>> = table.select(&TR).collect();
    let data_rows: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| is_time_row(r))
        .map(|(idx, _)| idx)
        .collect();
    if data_rows.is_empty() {
        return Err("no time rows");
    }

    let mut max_cols = 0;
    let mut td_count = 0;
    for &idx in &data_rows {
        let cells = data_cells(&rows[idx]);
        td_count += cells.len();
        let cols: usize = cells.iter().map(|td| span_attr(td, "colspan")).sum();
        max_cols = max_cols.max(cols);
    }
    if max_cols == 0 {
        return Err("no cols");
    }

    Ok(CalendarTable {
        rows,
        data_rows,
        max_cols,
        td_count,
    })
}

/// Rust counterpart of [`LIGHT_PROBE_SCRIPT`].
pub fn light_signature(html: &str) -> Result<LightSignature, &'static str> {
    let doc = Html::parse_document(html);
    let table = locate_table(&doc)?;
    Ok(LightSignature {
        td_count: table.td_count as u32,
        time_rows: table.data_rows.len() as u32,
        max_cols: table.max_cols as u32,
    })
}

/// True when any table in the markup has a row starting with a time of day.
pub fn has_calendar_table(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let found = doc
        .select(&TABLE)
        .any(|t| t.select(&TR).any(|r| is_time_row(&r)));
    found
}

/// Column index to service date, taken from the header row with the most
/// recognizable dates above the first time row.
fn column_dates(
    table: &CalendarTable<'_>,
    base: BaseMonth,
) -> Vec<Option<NaiveDate>> {
    let mut columns = vec![None; table.max_cols];
    let first_data = table.data_rows[0];

    let mut best: Option<(usize, usize)> = None;
    for (idx, row) in table.rows[..first_data].iter().enumerate() {
        let hits = data_cells(row)
            .iter()
            .filter(|td| parse_header_date(&element_text(td), base).is_some())
            .count();
        if hits > best.map(|(_, h)| h).unwrap_or(0) {
            best = Some((idx, hits));
        }
    }

    let Some((header_idx, _)) = best else {
        return columns;
    };

    let mut col = 0;
    for td in data_cells(&table.rows[header_idx]) {
        let span = span_attr(&td, "colspan");
        if let Some(date) = parse_header_date(&element_text(&td), base) {
            for slot in columns.iter_mut().skip(col).take(span) {
                *slot = Some(date);
            }
        }
        col += span;
        if col >= table.max_cols {
            break;
        }
    }
    columns
}

fn count_slot(out: &mut SlotSummary, kind: SlotKind, date: Option<NaiveDate>) {
    match kind {
        SlotKind::Excluded => out.excluded += 1,
        SlotKind::Bell => out.bell += 1,
        SlotKind::Maru => out.maru += 1,
        SlotKind::Tel => out.tel += 1,
        SlotKind::Dash => out.dash += 1,
        SlotKind::Other => out.other += 1,
    }
    if kind != SlotKind::Excluded {
        out.total += 1;
        if kind.is_bookable() {
            out.bookable += 1;
        }
    }

    let Some(date) = date else {
        return;
    };
    let day = out.by_date.entry(date).or_default();
    match kind {
        SlotKind::Bell => day.bell += 1,
        SlotKind::Maru => day.maru += 1,
        SlotKind::Tel => day.tel += 1,
        _ => day.other += 1,
    }
}

/// Full evaluation of the frame markup. `today` anchors the base month when
/// the page names none.
pub fn extract_summary(html: &str, today: NaiveDate) -> SlotSummary {
    let doc = Html::parse_document(html);
    let table = match locate_table(&doc) {
        Ok(table) => table,
        Err(reason) => return SlotSummary::failed(reason),
    };

    let body_text = doc
        .select(&BODY)
        .next()
        .map(|b| element_text(&b))
        .unwrap_or_default();
    let base = BaseMonth::from_page_text(&body_text, today);
    let columns = column_dates(&table, base);
    let header_dates = columns.iter().flatten().collect::<BTreeSet<_>>().len();

    let row_count = table.data_rows.len();
    let max_cols = table.max_cols;
    let mut grid: Vec<Vec<Option<SlotKind>>> = vec![vec![None; max_cols]; row_count];
    let mut out = SlotSummary {
        ok: true,
        time_rows: row_count as u32,
        max_cols: max_cols as u32,
        header_dates: header_dates as u32,
        ..SlotSummary::default()
    };
    let mut symbols: BTreeMap<String, u32> = BTreeMap::new();

    for (r, &row_idx) in table.data_rows.iter().enumerate() {
        let mut col = 0;
        for td in data_cells(&table.rows[row_idx]) {
            out.td_count += 1;
            while col < max_cols && grid[r][col].is_some() {
                col += 1;
            }
            if col >= max_cols {
                break;
            }

            let info = CellInfo::from_element(&td);
            let kind = classify_cell(&info);
            let row_span = span_attr(&td, "rowspan");
            let col_span = span_attr(&td, "colspan");
            let r_limit = row_count.min(r + row_span);
            let c_limit = max_cols.min(col + col_span);

            for rr in r..r_limit {
                for cc in col..c_limit {
                    if grid[rr][cc].is_none() {
                        grid[rr][cc] = Some(kind);
                        count_slot(&mut out, kind, columns[cc]);
                    }
                }
            }

            let key = if info.text.is_empty() {
                kind.as_str().to_string()
            } else {
                info.text.clone()
            };
            *symbols.entry(key).or_insert(0) += ((r_limit - r) * (c_limit - col)) as u32;

            col += col_span;
        }
    }

    out.slots_unique = grid
        .iter()
        .flatten()
        .filter(|cell| matches!(cell, Some(kind) if *kind != SlotKind::Excluded))
        .count() as u32;
    out.symbols = symbols;
    if out.total > 0 {
        out.other_ratio = Some(out.other as f64 / out.total as f64);
        out.bell_rate_total = Some(out.bell as f64 / out.total as f64);
    }
    if out.bookable > 0 {
        out.bell_rate_bookable = Some(out.bell as f64 / out.bookable as f64);
    }
    out
}
