/// Sniffing window: the shape of a scanner export is settled well inside
/// the first couple of kilobytes.
const SNIFF_WINDOW: usize = 2048;

const ID_SYNONYMS: &[&str] = &["userid", "user_id", "id", "employee_id", "emp_id"];
const DATE_SYNONYMS: &[&str] = &["date", "attendance_date", "check_date", "scan_date", "timestamp"];
const TIME_SYNONYMS: &[&str] = &["time", "check_time", "scan_time", "clock_time"];

/// Pick the field delimiter by raw character frequency over the sniffing
/// window. Tab wins ties against both others; semicolon only wins when it
/// strictly dominates both; comma is the default.
pub fn sniff_delimiter(sample: &str) -> char {
    let window: &str = &sample[..sample
        .char_indices()
        .nth(SNIFF_WINDOW)
        .map(|(i, _)| i)
        .unwrap_or(sample.len())];
    let commas = window.matches(',').count();
    let tabs = window.matches('\t').count();
    let semis = window.matches(';').count();
    if tabs >= commas && tabs >= semis {
        '\t'
    } else if semis > commas && semis > tabs {
        ';'
    } else {
        ','
    }
}

/// Quote-aware record splitter for any single-character delimiter.
pub fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == delimiter && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub external_id: usize,
    pub date: usize,
    pub time: Option<usize>,
}

fn find_column(header: &[String], synonyms: &[&str]) -> Option<usize> {
    header.iter().position(|cell| {
        let t = cell.trim().to_ascii_lowercase();
        synonyms.contains(&t.as_str())
    })
}

/// Map a candidate header row to the three logical columns. `time` is
/// always optional; missing `external_id` or `date` means the layout is
/// unmapped and the fallback parser gets a turn.
pub fn map_columns(header: &[String]) -> Option<ColumnMap> {
    let external_id = find_column(header, ID_SYNONYMS)?;
    let date = find_column(header, DATE_SYNONYMS)?;
    let time = find_column(header, TIME_SYNONYMS);
    Some(ColumnMap {
        external_id,
        date,
        time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sniff_prefers_tab_on_ties() {
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(sniff_delimiter("a,b\tc,d\te"), '\t');
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3"), ',');
    }

    #[test]
    fn sniff_takes_semicolon_only_when_dominant() {
        assert_eq!(sniff_delimiter("a;b;c;d\n1;2;3;4"), ';');
        // Two semicolons, two commas: semicolon does not dominate, comma wins.
        assert_eq!(sniff_delimiter("a;b,c;d,e"), ',');
    }

    #[test]
    fn split_handles_quotes_and_delimiters() {
        assert_eq!(
            split_record("a,\"b,c\",d", ','),
            vec!["a", "b,c", "d"]
        );
        assert_eq!(
            split_record("a\t\"say \"\"hi\"\"\"\tb", '\t'),
            vec!["a", "say \"hi\"", "b"]
        );
        assert_eq!(split_record("x;y;;z", ';'), vec!["x", "y", "", "z"]);
    }

    #[test]
    fn maps_synonym_headers() {
        let map = map_columns(&cells(&["Emp_ID", "Check_Date", "Scan_Time"])).expect("mapped");
        assert_eq!(map.external_id, 0);
        assert_eq!(map.date, 1);
        assert_eq!(map.time, Some(2));

        let map = map_columns(&cells(&["date", "userid"])).expect("mapped");
        assert_eq!(map.external_id, 1);
        assert_eq!(map.date, 0);
        assert_eq!(map.time, None);
    }

    #[test]
    fn unmapped_without_id_and_date_pair() {
        assert!(map_columns(&cells(&["name", "date"])).is_none());
        assert!(map_columns(&cells(&["userid", "name"])).is_none());
        assert!(map_columns(&cells(&["Attendance Record Report"])).is_none());
    }
}
