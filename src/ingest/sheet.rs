use super::IngestError;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::Timelike;
use std::path::Path;

/// Flatten the first worksheet of an .xlsx/.xls upload into rows of
/// formatted cell strings so the same column mapping applies as for
/// delimited text.
pub fn read_sheet_rows(path: &Path) -> Result<Vec<Vec<String>>, IngestError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        IngestError::Structural(format!(
            "unreadable spreadsheet {}: {}; re-save the export and retry",
            path.display(),
            e
        ))
    })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::Structural("spreadsheet has no worksheets".to_string()))?
        .map_err(|e| IngestError::Structural(format!("cannot read first worksheet: {}", e)))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(format_cell).collect::<Vec<String>>())
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();
    Ok(rows)
}

fn format_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Scanner ids and counts come through as floats; render whole
            // numbers without the trailing ".0".
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(d) if d.time().num_seconds_from_midnight() == 0 => {
                d.date().format("%Y-%m-%d").to_string()
            }
            Some(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => String::new(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}
