pub mod detect;
pub mod fallback;
pub mod sheet;

use std::path::Path;

/// One presence observation lifted out of an upload. Exists only for the
/// duration of a single import; the date stays raw until the temporal
/// mapper has a go at it.
#[derive(Debug, Clone)]
pub struct AttendanceEvent {
    pub external_id: String,
    pub date_raw: String,
    pub time: Option<String>,
    /// Display name, only populated by the fallback table layout.
    pub name: Option<String>,
}

/// Whole-file failures. Row-level problems never take this shape; they are
/// collected into the import result instead.
#[derive(Debug)]
pub enum IngestError {
    /// Unreadable container, no rows, or no identifiable header anywhere.
    Structural(String),
    /// The fallback layout's date-range banner is missing or unparseable.
    DateRange(String),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Structural(_) => "structural_parse",
            IngestError::DateRange(_) => "date_range",
        }
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Structural(m) | IngestError::DateRange(m) => f.write_str(m),
        }
    }
}

impl std::error::Error for IngestError {}

/// Read an upload into rows of cell strings. Spreadsheet binaries go through
/// calamine; anything else is treated as delimited text with a sniffed
/// delimiter.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, IngestError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "xlsx" || ext == "xls" {
        return sheet::read_sheet_rows(path);
    }

    let bytes = std::fs::read(path).map_err(|e| {
        IngestError::Structural(format!("cannot read {}: {}", path.display(), e))
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let delimiter = detect::sniff_delimiter(&text);
    let rows: Vec<Vec<String>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| detect::split_record(l, delimiter))
        .collect();
    Ok(rows)
}

/// Turn raw rows into attendance events: the mapped-header path when the
/// first record names an id and date column, the statistical-table fallback
/// otherwise.
pub fn extract_events(rows: &[Vec<String>]) -> Result<Vec<AttendanceEvent>, IngestError> {
    let Some(header) = rows.first() else {
        return Err(IngestError::Structural(
            "file has no rows; re-export the attendance report".to_string(),
        ));
    };

    let Some(map) = detect::map_columns(header) else {
        return fallback::parse(rows);
    };

    let mut events = Vec::new();
    for row in &rows[1..] {
        let external_id = row.get(map.external_id).map(|s| s.trim()).unwrap_or("");
        let date_raw = row.get(map.date).map(|s| s.trim()).unwrap_or("");
        if external_id.is_empty() && date_raw.is_empty() {
            continue;
        }
        let time = map
            .time
            .and_then(|i| row.get(i))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        events.push(AttendanceEvent {
            external_id: external_id.to_string(),
            date_raw: date_raw.to_string(),
            time,
            name: None,
        });
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(text: &str) -> Vec<Vec<String>> {
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| detect::split_record(l, ','))
            .collect()
    }

    #[test]
    fn mapped_header_yields_one_event_per_row() {
        let rows = rows("userid,date,time\n23012345,2025-08-15,07:58\n23012345,2025-08-22,");
        let events = extract_events(&rows).expect("events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].external_id, "23012345");
        assert_eq!(events[0].time.as_deref(), Some("07:58"));
        assert!(events[1].time.is_none());
        assert!(events[0].name.is_none());
    }

    #[test]
    fn empty_file_is_structural() {
        let err = extract_events(&[]).unwrap_err();
        assert_eq!(err.code(), "structural_parse");
    }
}
