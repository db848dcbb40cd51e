use crate::db::Semester;
use crate::grade;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

/// A presence observation after identity and week resolution.
#[derive(Debug, Clone)]
pub struct ResolvedPresence {
    pub cadet_id: String,
    pub week: i64,
}

/// Result accumulator for one import batch. Faults inside a single cadet's
/// upsert land in `errors` and `skipped_cadets`; they never unwind the loop.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub imported: i64,
    pub updated: i64,
    pub skipped_cadets: i64,
    pub errors: Vec<serde_json::Value>,
    pub affected_cadets: Vec<String>,
    pub affected_weeks: Vec<i64>,
}

/// Lazily create the full week range for a cadet/semester pair, all absent.
pub fn ensure_week_rows(
    conn: &Connection,
    cadet_id: &str,
    semester_id: &str,
    week_count: i64,
) -> rusqlite::Result<()> {
    for week in 1..=week_count {
        conn.execute(
            "INSERT OR IGNORE INTO attendance_weeks(cadet_id, semester_id, week, present)
             VALUES(?, ?, ?, 0)",
            (cadet_id, semester_id, week),
        )?;
    }
    Ok(())
}

/// Set one week's presence flag. Returns whether the flag actually changed.
pub fn set_week(
    conn: &Connection,
    cadet_id: &str,
    semester: &Semester,
    week: i64,
    present: bool,
    actor: &str,
) -> rusqlite::Result<bool> {
    ensure_week_rows(conn, cadet_id, &semester.id, semester.week_count)?;
    let current: Option<i64> = conn
        .query_row(
            "SELECT present FROM attendance_weeks
             WHERE cadet_id = ? AND semester_id = ? AND week = ?",
            (cadet_id, &semester.id, week),
            |r| r.get(0),
        )
        .optional()?;
    let target = if present { 1_i64 } else { 0 };
    if current == Some(target) {
        return Ok(false);
    }
    conn.execute(
        "UPDATE attendance_weeks SET present = ?, updated_by = ?
         WHERE cadet_id = ? AND semester_id = ? AND week = ?",
        (target, actor, cadet_id, &semester.id, week),
    )?;
    Ok(true)
}

/// Recompute the derived presence count and the scaled 30-point score for
/// one cadet/semester pair.
pub fn recompute_totals(
    conn: &Connection,
    cadet_id: &str,
    semester: &Semester,
) -> rusqlite::Result<(i64, i64)> {
    let weeks_present: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance_weeks
         WHERE cadet_id = ? AND semester_id = ? AND present = 1 AND week BETWEEN 1 AND ?",
        (cadet_id, &semester.id, semester.week_count),
        |r| r.get(0),
    )?;
    let score = grade::attendance_score(weeks_present, semester.week_count);
    conn.execute(
        "INSERT INTO attendance_totals(cadet_id, semester_id, weeks_present, score)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(cadet_id, semester_id) DO UPDATE SET
           weeks_present = excluded.weeks_present,
           score = excluded.score",
        (cadet_id, &semester.id, weeks_present, score),
    )?;
    Ok((weeks_present, score))
}

/// Merge a batch of resolved presences into the ledger. Import only ever
/// sets weeks to present; a week marked absent by a manual edit stays
/// absent unless the file claims it again. The caller owns the surrounding
/// transaction; this function owns the per-cadet fault isolation.
pub fn apply_presence(
    conn: &Connection,
    semester: &Semester,
    presences: &[ResolvedPresence],
    actor: &str,
) -> ApplyOutcome {
    let mut by_cadet: BTreeMap<&str, BTreeSet<i64>> = BTreeMap::new();
    for p in presences {
        by_cadet.entry(&p.cadet_id).or_default().insert(p.week);
    }

    let mut outcome = ApplyOutcome::default();
    let mut affected_weeks: BTreeSet<i64> = BTreeSet::new();

    for (cadet_id, weeks) in by_cadet {
        let upsert = || -> rusqlite::Result<(i64, i64)> {
            let mut imported = 0_i64;
            let mut updated = 0_i64;
            ensure_week_rows(conn, cadet_id, &semester.id, semester.week_count)?;
            for week in &weeks {
                if set_week(conn, cadet_id, semester, *week, true, actor)? {
                    imported += 1;
                } else {
                    updated += 1;
                }
            }
            recompute_totals(conn, cadet_id, semester)?;
            Ok((imported, updated))
        };
        match upsert() {
            Ok((imported, updated)) => {
                outcome.imported += imported;
                outcome.updated += updated;
                outcome.affected_cadets.push(cadet_id.to_string());
                affected_weeks.extend(weeks.iter().copied());
            }
            Err(e) => {
                tracing::warn!(cadet_id, error = %e, "skipping cadet in attendance batch");
                outcome.skipped_cadets += 1;
                outcome.errors.push(json!({
                    "code": "cadet_upsert_failed",
                    "cadetId": cadet_id,
                    "message": e.to_string(),
                }));
            }
        }
    }

    outcome.affected_weeks = affected_weeks.into_iter().collect();
    outcome
}
