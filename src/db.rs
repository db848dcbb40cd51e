use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "cadet.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cadets(
            id TEXT PRIMARY KEY,
            cadet_no TEXT NOT NULL UNIQUE,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            unit TEXT,
            is_staff INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cadets_cadet_no ON cadets(cadet_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            start_date TEXT NOT NULL,
            week_count INTEGER NOT NULL,
            term_no INTEGER NOT NULL DEFAULT 1,
            has_midterm INTEGER NOT NULL DEFAULT 0,
            max_final REAL NOT NULL DEFAULT 100,
            max_midterm REAL NOT NULL DEFAULT 100
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_weeks(
            cadet_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            week INTEGER NOT NULL,
            present INTEGER NOT NULL DEFAULT 0,
            updated_by TEXT,
            PRIMARY KEY(cadet_id, semester_id, week),
            FOREIGN KEY(cadet_id) REFERENCES cadets(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_weeks_semester ON attendance_weeks(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_totals(
            cadet_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            weeks_present INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(cadet_id, semester_id),
            FOREIGN KEY(cadet_id) REFERENCES cadets(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conduct_weeks(
            cadet_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            week INTEGER NOT NULL,
            merits INTEGER NOT NULL DEFAULT 0,
            demerits INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(cadet_id, semester_id, week),
            FOREIGN KEY(cadet_id) REFERENCES cadets(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_conduct_weeks_semester ON conduct_weeks(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_records(
            cadet_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            midterm REAL,
            final_score REAL,
            PRIMARY KEY(cadet_id, semester_id),
            FOREIGN KEY(cadet_id) REFERENCES cadets(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_summaries(
            cadet_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            conduct_score INTEGER NOT NULL,
            attendance_score INTEGER NOT NULL,
            exam_score INTEGER NOT NULL,
            final_percent INTEGER NOT NULL,
            equivalence REAL NOT NULL,
            remark TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(cadet_id, semester_id),
            FOREIGN KEY(cadet_id) REFERENCES cadets(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;

    Ok(conn)
}

#[derive(Debug, Clone)]
pub struct Semester {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub week_count: i64,
    pub term_no: i64,
    pub has_midterm: bool,
    pub max_final: f64,
    pub max_midterm: f64,
}

pub fn find_semester_by_name(conn: &Connection, name: &str) -> anyhow::Result<Option<Semester>> {
    let row = conn
        .query_row(
            "SELECT id, name, start_date, week_count, term_no, has_midterm, max_final, max_midterm
             FROM semesters
             WHERE name = ?",
            [name],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)?,
                    r.get::<_, f64>(6)?,
                    r.get::<_, f64>(7)?,
                ))
            },
        )
        .optional()?;
    let Some((id, name, start_raw, week_count, term_no, has_midterm, max_final, max_midterm)) = row
    else {
        return Ok(None);
    };
    let start_date = NaiveDate::parse_from_str(&start_raw, "%Y-%m-%d").map_err(|e| {
        anyhow::anyhow!("semester {} has a bad start date {:?}: {}", name, start_raw, e)
    })?;
    Ok(Some(Semester {
        id,
        name,
        start_date,
        week_count,
        term_no,
        has_midterm: has_midterm != 0,
        max_final,
        max_midterm,
    }))
}

pub fn cadet_exists(conn: &Connection, cadet_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM cadets WHERE id = ?", [cadet_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}
