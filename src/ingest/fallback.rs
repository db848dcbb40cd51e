use super::{AttendanceEvent, IngestError};
use crate::calendar;
use chrono::{Duration, NaiveDate};
use std::collections::HashSet;

/// The alternate export layout states its date range once near the top.
const DATE_SCAN_ROWS: usize = 10;
/// The user table header sits within a few decorative rows of the banner.
const HEADER_SCAN_ROWS: usize = 30;
/// Rows whose id cell has fewer digits than this are totals/footers.
const MIN_ID_DIGITS: usize = 6;

/// Recover events from the statistical-table layout: a `Date: <start> ~ <end>`
/// banner, then a user table. Every listed identity is enumerated against
/// every day in the inclusive range.
pub fn parse(rows: &[Vec<String>]) -> Result<Vec<AttendanceEvent>, IngestError> {
    let (banner_row, start, end) = find_date_range(rows)?;
    let (header_row, id_col, name_col) = find_user_table_header(rows, banner_row)?;
    let identities = collect_identities(rows, header_row, id_col, name_col);

    let mut events = Vec::new();
    for (external_id, name) in identities {
        let mut day = start;
        while day <= end {
            events.push(AttendanceEvent {
                external_id: external_id.clone(),
                date_raw: day.format("%Y-%m-%d").to_string(),
                time: None,
                name: name.clone(),
            });
            day += Duration::days(1);
        }
    }
    Ok(events)
}

fn find_date_range(rows: &[Vec<String>]) -> Result<(usize, NaiveDate, NaiveDate), IngestError> {
    for (i, row) in rows.iter().take(DATE_SCAN_ROWS).enumerate() {
        let joined = row.join(" ");
        let lower = joined.to_ascii_lowercase();
        let Some(pos) = lower.find("date:") else {
            continue;
        };
        let rest = joined[pos + "date:".len()..].trim();
        if rest.is_empty() {
            continue;
        }
        let (start_raw, end_raw) = split_range(rest);
        let start = calendar::parse_date(start_raw).ok_or_else(|| {
            IngestError::DateRange(format!(
                "cannot parse date range start {:?}; expected e.g. 2025-08-15",
                start_raw
            ))
        })?;
        let end = calendar::parse_date(end_raw).ok_or_else(|| {
            IngestError::DateRange(format!(
                "cannot parse date range end {:?}; expected e.g. 2025-08-28",
                end_raw
            ))
        })?;
        if end < start {
            return Err(IngestError::DateRange(format!(
                "date range end {} precedes start {}",
                end, start
            )));
        }
        return Ok((i, start, end));
    }
    Err(IngestError::DateRange(
        "no 'Date:' range banner in the leading rows; export with a per-row date column \
         or the date-range report layout"
            .to_string(),
    ))
}

/// Split the banner remainder into range bounds. Spaced separators are tried
/// first so the dashes inside ISO dates survive; a single date means
/// start == end.
fn split_range(rest: &str) -> (&str, &str) {
    for sep in [" ~ ", " - ", " * ", " \u{2013} ", " to ", "~", "*", "\u{2013}"] {
        if let Some((a, b)) = rest.split_once(sep) {
            let (a, b) = (a.trim(), b.trim());
            if !a.is_empty() && !b.is_empty() {
                return (a, b);
            }
        }
    }
    // A bare hyphen only splits when it is the sole hyphen in the banner,
    // so slash or dot dates pair up while ISO bounds stay whole.
    let parts: Vec<&str> = rest.split('-').map(str::trim).collect();
    if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
        return (parts[0], parts[1]);
    }
    (rest, rest)
}

fn squash(cell: &str) -> String {
    cell.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn find_user_table_header(
    rows: &[Vec<String>],
    banner_row: usize,
) -> Result<(usize, usize, Option<usize>), IngestError> {
    let from = banner_row + 1;
    for (i, row) in rows
        .iter()
        .enumerate()
        .skip(from)
        .take(HEADER_SCAN_ROWS)
    {
        let Some(id_col) = row.iter().position(|c| squash(c).contains("userid")) else {
            continue;
        };
        let name_col = row
            .iter()
            .position(|c| squash(c).contains("name"))
            .filter(|col| *col != id_col);
        return Ok((i, id_col, name_col));
    }
    Err(IngestError::Structural(
        "no 'User ID' header row found below the date-range banner".to_string(),
    ))
}

fn collect_identities(
    rows: &[Vec<String>],
    header_row: usize,
    id_col: usize,
    name_col: Option<usize>,
) -> Vec<(String, Option<String>)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows.iter().skip(header_row + 1) {
        let id = row.get(id_col).map(|s| s.trim()).unwrap_or("");
        let digits = id.chars().filter(|c| c.is_ascii_digit()).count();
        // Summary/total rows are not identities; stop at the first one.
        if id.is_empty() || digits < MIN_ID_DIGITS {
            break;
        }
        if !seen.insert(id.to_string()) {
            continue;
        }
        let name = name_col
            .and_then(|col| row.get(col))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        out.push((id.to_string(), name));
    }
    out
}
