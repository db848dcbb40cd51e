use crate::db::Semester;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CONDUCT_WEIGHT: i64 = 30;
pub const ATTENDANCE_WEIGHT: i64 = 30;
pub const EXAM_WEIGHT: i64 = 40;

/// Weekly merit/demerit cap: a single week can cost at most 10 points.
pub const WEEK_POINTS: i64 = 10;

/// Equivalence cutoffs, evaluated top-down, first match wins. Anything
/// below 75.0 is a failing 5.00.
const EQUIVALENCE_TABLE: &[(f64, f64)] = &[
    (96.5, 1.00),
    (93.5, 1.25),
    (90.5, 1.50),
    (87.5, 1.75),
    (84.5, 2.00),
    (81.5, 2.25),
    (78.5, 2.50),
    (75.5, 2.75),
    (75.0, 3.00),
];

/// Conduct component (30 pts). Each week's net demerit is clamped to
/// [0, WEEK_POINTS] before summing, so merits can offset that week's
/// demerits but never bank surplus across weeks.
pub fn conduct_score<I>(week_count: i64, weekly: I) -> i64
where
    I: IntoIterator<Item = (i64, i64)>,
{
    if week_count <= 0 {
        return 0;
    }
    let max_possible = week_count * WEEK_POINTS;
    let total_demerits: i64 = weekly
        .into_iter()
        .map(|(merits, demerits)| (demerits - merits).clamp(0, WEEK_POINTS))
        .sum();
    let score = ((max_possible - total_demerits) as f64 / max_possible as f64
        * CONDUCT_WEIGHT as f64)
        .round() as i64;
    score.clamp(0, CONDUCT_WEIGHT)
}

/// Attendance component (30 pts).
pub fn attendance_score(weeks_present: i64, week_count: i64) -> i64 {
    if week_count <= 0 {
        return 0;
    }
    let score =
        (weeks_present as f64 / week_count as f64 * ATTENDANCE_WEIGHT as f64).round() as i64;
    score.clamp(0, ATTENDANCE_WEIGHT)
}

/// Examination component (40 pts). Dual-exam terms average the midterm and
/// final ratios; single-final terms use the final alone.
pub fn exam_score(final_score: f64, max_final: f64, midterm: Option<(f64, f64)>) -> i64 {
    if max_final <= 0.0 {
        return 0;
    }
    let ratio = match midterm {
        Some((mid, max_mid)) if max_mid > 0.0 => {
            (final_score / max_final + mid / max_mid) / 2.0
        }
        _ => final_score / max_final,
    };
    let score = (ratio * 100.0 * 0.40).round() as i64;
    score.clamp(0, EXAM_WEIGHT)
}

pub fn equivalence(percent: f64) -> f64 {
    for (cutoff, eq) in EQUIVALENCE_TABLE {
        if percent >= *cutoff {
            return *eq;
        }
    }
    5.00
}

/// 4.00 ("Incomplete") is never produced by the cutoff table; it is a
/// manual-override sentinel and only this function gives it meaning.
pub fn remark_for(equivalence: f64) -> &'static str {
    if (equivalence - 4.00).abs() < 1e-9 {
        "Incomplete"
    } else if equivalence > 4.00 {
        "Failed"
    } else {
        "Passed"
    }
}

/// Published final grade for the two-term program: term one averages the
/// common-module grade with the here-computed percentage; term two publishes
/// the computed percentage unmodified.
pub fn published_final(term_no: i64, final_percent: i64, common_module: Option<f64>) -> Option<i64> {
    if term_no == 1 {
        let common = common_module?;
        Some(((common + final_percent as f64) / 2.0).round() as i64)
    } else {
        Some(final_percent)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeError {
    pub code: String,
    pub message: String,
}

impl GradeError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub cadet_id: String,
    pub semester_id: String,
    pub semester_name: String,
    pub conduct_score: i64,
    pub attendance_score: i64,
    pub exam_score: i64,
    pub final_percent: i64,
    pub equivalence: f64,
    pub remark: String,
}

/// Drop the cached summary. Callers invalidate whenever any contributing
/// record changes; the next recompute writes a fresh row.
pub fn invalidate(conn: &Connection, cadet_id: &str, semester_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM grade_summaries WHERE cadet_id = ? AND semester_id = ?",
        (cadet_id, semester_id),
    )?;
    Ok(())
}

/// Recompute the full summary from the three component records and write it
/// through to the cache. Missing component records count as zero.
pub fn recompute(
    conn: &Connection,
    cadet_id: &str,
    semester: &Semester,
) -> Result<GradeSummary, GradeError> {
    let mut stmt = conn
        .prepare(
            "SELECT merits, demerits FROM conduct_weeks
             WHERE cadet_id = ? AND semester_id = ? AND week BETWEEN 1 AND ?",
        )
        .map_err(|e| GradeError::new("db_query_failed", e.to_string()))?;
    let weekly: Vec<(i64, i64)> = stmt
        .query_map((cadet_id, &semester.id, semester.week_count), |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| GradeError::new("db_query_failed", e.to_string()))?;

    let weeks_present: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM attendance_weeks
             WHERE cadet_id = ? AND semester_id = ? AND present = 1 AND week BETWEEN 1 AND ?",
            (cadet_id, &semester.id, semester.week_count),
            |r| r.get(0),
        )
        .map_err(|e| GradeError::new("db_query_failed", e.to_string()))?;

    let exam_row: Option<(Option<f64>, Option<f64>)> = conn
        .query_row(
            "SELECT midterm, final_score FROM exam_records
             WHERE cadet_id = ? AND semester_id = ?",
            (cadet_id, &semester.id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| GradeError::new("db_query_failed", e.to_string()))?;

    let conduct = conduct_score(semester.week_count, weekly);
    let attendance = attendance_score(weeks_present, semester.week_count);
    let exam = match exam_row {
        Some((midterm, final_score)) => {
            let final_score = final_score.unwrap_or(0.0);
            let midterm = if semester.has_midterm {
                Some((midterm.unwrap_or(0.0), semester.max_midterm))
            } else {
                None
            };
            exam_score(final_score, semester.max_final, midterm)
        }
        None => 0,
    };

    let final_percent = conduct + attendance + exam;
    let eq = equivalence(final_percent as f64);
    let remark = remark_for(eq).to_string();

    let updated_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string();
    invalidate(conn, cadet_id, &semester.id)
        .map_err(|e| GradeError::new("db_update_failed", e.to_string()))?;
    conn.execute(
        "INSERT INTO grade_summaries(cadet_id, semester_id, conduct_score, attendance_score,
                                     exam_score, final_percent, equivalence, remark, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            cadet_id,
            &semester.id,
            conduct,
            attendance,
            exam,
            final_percent,
            eq,
            &remark,
            &updated_at,
        ),
    )
    .map_err(|e| GradeError::new("db_update_failed", e.to_string()))?;

    Ok(GradeSummary {
        cadet_id: cadet_id.to_string(),
        semester_id: semester.id.clone(),
        semester_name: semester.name.clone(),
        conduct_score: conduct,
        attendance_score: attendance,
        exam_score: exam,
        final_percent,
        equivalence: eq,
        remark,
    })
}
