use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::{db, grade};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn get_required_u64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as i64)
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("{} must be a non-negative integer", key),
            details: None,
        })
}

fn load_context(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(String, db::Semester), HandlerErr> {
    let cadet_id = get_required_str(params, "cadetId")?;
    let semester_name = get_required_str(params, "semesterName")?;
    if !db::cadet_exists(conn, &cadet_id).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })? {
        return Err(HandlerErr {
            code: "not_found",
            message: "cadet not found".to_string(),
            details: None,
        });
    }
    let semester = db::find_semester_by_name(conn, &semester_name)
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?
        .ok_or_else(|| HandlerErr {
            code: "not_found",
            message: format!("semester {} is not defined", semester_name),
            details: None,
        })?;
    Ok((cadet_id, semester))
}

fn conduct_set_week(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;
    let week = get_required_u64(params, "week")?;
    let merits = get_required_u64(params, "merits")?;
    let demerits = get_required_u64(params, "demerits")?;
    if !(1..=semester.week_count).contains(&week) {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("week must be within 1..={}", semester.week_count),
            details: None,
        });
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute(
        "INSERT INTO conduct_weeks(cadet_id, semester_id, week, merits, demerits)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(cadet_id, semester_id, week) DO UPDATE SET
           merits = excluded.merits,
           demerits = excluded.demerits",
        (&cadet_id, &semester.id, week, merits, demerits),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "conduct_weeks" })),
    })?;
    let summary = grade::recompute(&tx, &cadet_id, &semester).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.message,
        details: None,
    })?;
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "conductScore": summary.conduct_score }))
}

fn conduct_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;

    let mut stmt = conn
        .prepare(
            "SELECT week, merits, demerits FROM conduct_weeks
             WHERE cadet_id = ? AND semester_id = ? AND week BETWEEN 1 AND ?",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let stored: HashMap<i64, (i64, i64)> = stmt
        .query_map((&cadet_id, &semester.id, semester.week_count), |r| {
            Ok((r.get::<_, i64>(0)?, (r.get::<_, i64>(1)?, r.get::<_, i64>(2)?)))
        })
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    let weekly: Vec<(i64, i64)> = (1..=semester.week_count)
        .map(|w| stored.get(&w).copied().unwrap_or((0, 0)))
        .collect();
    let score = grade::conduct_score(semester.week_count, weekly.iter().copied());

    let weeks: Vec<serde_json::Value> = (1..=semester.week_count)
        .map(|w| {
            let (merits, demerits) = stored.get(&w).copied().unwrap_or((0, 0));
            json!({ "week": w, "merits": merits, "demerits": demerits })
        })
        .collect();

    Ok(json!({
        "cadetId": cadet_id,
        "semesterName": semester.name,
        "weeks": weeks,
        "conductScore": score,
    }))
}

fn handle_conduct_set_week(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match conduct_set_week(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_conduct_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match conduct_open(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "conduct.setWeek" => Some(handle_conduct_set_week(state, req)),
        "conduct.open" => Some(handle_conduct_open(state, req)),
        _ => None,
    }
}
