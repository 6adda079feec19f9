//! Match fragment parsing
//!
//! Each `match{i}-top.html` page carries one table: a header row naming the
//! two participants with their match percentages, then one row per matched
//! region with a line range on each side. Structural surprises surface as
//! `UnparseableMatch`, which the fetcher may skip but never papers over.

use crate::error::MossError;
use crate::types::{LinePair, LineRange, MatchRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static NAME_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S+)\s+\((\d+)%\)").expect("hard-coded pattern"));
static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("hard-coded selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("hard-coded selector"));
static HEADER_CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th").expect("hard-coded selector"));
static DATA_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("hard-coded selector"));

/// Parse one match fragment into a [`MatchRecord`]
pub fn parse_match(html: &str) -> Result<MatchRecord, MossError> {
    let document = Html::parse_document(html);

    let table = document
        .select(&TABLE)
        .next()
        .ok_or_else(|| unparseable("missing match table"))?;
    let mut rows = table.select(&ROW);

    // Header row: participant cells sit at positions 0 and 2, separated by
    // bar-graph cells.
    let header = rows.next().ok_or_else(|| unparseable("missing header row"))?;
    let headers: Vec<_> = header.select(&HEADER_CELL).collect();
    if headers.len() < 3 {
        return Err(unparseable("missing participant headers"));
    }
    let (first_name, first_percent) = parse_name_percentage(&cell_text(&headers[0]))?;
    let (second_name, second_percent) = parse_name_percentage(&cell_text(&headers[2]))?;

    let mut line_matches = Vec::new();
    let mut lines_matched = 0u32;
    for row in rows {
        let cells: Vec<_> = row.select(&DATA_CELL).collect();
        if cells.len() < 3 {
            return Err(unparseable("malformed match row"));
        }
        let first = parse_range(&cell_text(&cells[0]))?;
        let second = parse_range(&cell_text(&cells[2]))?;
        lines_matched += LinePair { first, second }.line_count();
        line_matches.push(LinePair { first, second });
    }

    Ok(MatchRecord {
        first_name,
        first_percent,
        second_name,
        second_percent,
        line_matches,
        lines_matched,
    })
}

fn unparseable(reason: &str) -> MossError {
    MossError::UnparseableMatch(reason.to_string())
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Extract `name (NN%)` from a participant header cell
fn parse_name_percentage(text: &str) -> Result<(String, u32), MossError> {
    let captures = NAME_PERCENT
        .captures(text)
        .ok_or_else(|| unparseable(&format!("missing name/percentage in \"{text}\"")))?;
    let name = captures[1].to_string();
    let percent = captures[2]
        .parse::<u32>()
        .map_err(|_| unparseable(&format!("non-numeric percentage in \"{text}\"")))?;
    Ok((name, percent))
}

/// Parse a `from-to` line range, enforcing `from <= to`
fn parse_range(text: &str) -> Result<LineRange, MossError> {
    let (from, to) = text
        .split_once('-')
        .ok_or_else(|| unparseable(&format!("missing line range in \"{text}\"")))?;
    let from = from
        .trim()
        .parse::<u32>()
        .map_err(|_| unparseable(&format!("non-numeric line range in \"{text}\"")))?;
    let to = to
        .trim()
        .parse::<u32>()
        .map_err(|_| unparseable(&format!("non-numeric line range in \"{text}\"")))?;
    if from > to {
        return Err(unparseable(&format!("inverted line range in \"{text}\"")));
    }
    Ok(LineRange { from, to })
}
