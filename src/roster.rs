use rusqlite::Connection;

/// Scanners truncate the 10-digit institutional number to its last 8 digits,
/// and some drop leading zeros on top of that.
const TRUNCATED_LEN: usize = 8;
const FULL_NO_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct RosterCadet {
    pub id: String,
    pub cadet_no: String,
    pub last_name: String,
    pub first_name: String,
}

/// Non-staff cadets only; staff accounts are never resolution targets.
pub fn load_roster(conn: &Connection) -> rusqlite::Result<Vec<RosterCadet>> {
    let mut stmt = conn.prepare(
        "SELECT id, cadet_no, last_name, first_name
         FROM cadets
         WHERE is_staff = 0
         ORDER BY sort_order",
    )?;
    stmt.query_map([], |r| {
        Ok(RosterCadet {
            id: r.get(0)?,
            cadet_no: r.get(1)?,
            last_name: r.get(2)?,
            first_name: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

fn truncated_match<'a>(roster: &'a [RosterCadet], candidate: &str) -> Option<&'a RosterCadet> {
    if candidate.len() != TRUNCATED_LEN {
        return None;
    }
    roster.iter().find(|c| {
        c.cadet_no.len() == FULL_NO_LEN && c.cadet_no[FULL_NO_LEN - TRUNCATED_LEN..] == *candidate
    })
}

fn name_prefix_match<'a>(roster: &'a [RosterCadet], name: &str) -> Option<&'a RosterCadet> {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    let first = tokens.first()?.to_lowercase();
    let last = tokens.last()?.to_lowercase();
    let mut hit: Option<&RosterCadet> = None;
    for c in roster {
        if c.first_name.to_lowercase().starts_with(&first)
            && c.last_name.to_lowercase().starts_with(&last)
        {
            if hit.is_some() {
                // Ambiguous; refuse to guess.
                return None;
            }
            hit = Some(c);
        }
    }
    hit
}

/// Resolve a scanner external id (plus an optional display name from the
/// fallback table layout) to exactly one cadet. Resolution order: exact
/// institutional-number/internal-id match, last-8 truncation, zero-padded
/// truncation, then unique first/last name prefix.
pub fn resolve<'a>(
    roster: &'a [RosterCadet],
    external_id: &str,
    name: Option<&str>,
) -> Option<&'a RosterCadet> {
    let ext = external_id.trim();
    if !ext.is_empty() {
        if let Some(c) = roster.iter().find(|c| c.cadet_no == ext || c.id == ext) {
            return Some(c);
        }
        if let Some(c) = truncated_match(roster, ext) {
            return Some(c);
        }
        if ext.len() < TRUNCATED_LEN {
            let padded = format!("{:0>width$}", ext, width = TRUNCATED_LEN);
            if let Some(c) = truncated_match(roster, &padded) {
                return Some(c);
            }
        }
    }
    name.and_then(|n| name_prefix_match(roster, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cadet(id: &str, no: &str, last: &str, first: &str) -> RosterCadet {
        RosterCadet {
            id: id.to_string(),
            cadet_no: no.to_string(),
            last_name: last.to_string(),
            first_name: first.to_string(),
        }
    }

    fn sample() -> Vec<RosterCadet> {
        vec![
            cadet("c1", "2023012345", "Reyes", "Ana"),
            cadet("c2", "2003012345", "Cruz", "Benjo"),
            cadet("c3", "2023099999", "Reyes", "Andres"),
        ]
    }

    #[test]
    fn exact_match_wins() {
        let roster = sample();
        assert_eq!(resolve(&roster, "2023012345", None).unwrap().id, "c1");
        assert_eq!(resolve(&roster, "c2", None).unwrap().id, "c2");
    }

    #[test]
    fn truncation_match() {
        // "2023012345" stored on the scanner as its last 8 digits.
        let roster = sample();
        assert_eq!(resolve(&roster, "23012345", None).unwrap().id, "c1");
    }

    #[test]
    fn padding_match() {
        // 7-digit scanner id zero-pads to "03012345", the tail of "2003012345".
        let roster = sample();
        assert_eq!(resolve(&roster, "3012345", None).unwrap().id, "c2");
    }

    #[test]
    fn name_fallback_requires_uniqueness() {
        let roster = sample();
        assert_eq!(
            resolve(&roster, "0", Some("Benjo Cruz")).unwrap().id,
            "c2"
        );
        // "An Reyes" prefixes both Ana and Andres Reyes.
        assert!(resolve(&roster, "0", Some("An Reyes")).is_none());
        assert_eq!(
            resolve(&roster, "0", Some("Andres Reyes")).unwrap().id,
            "c3"
        );
    }

    #[test]
    fn unresolved_yields_none() {
        let roster = sample();
        assert!(resolve(&roster, "99999999", None).is_none());
        assert!(resolve(&roster, "", None).is_none());
    }
}
