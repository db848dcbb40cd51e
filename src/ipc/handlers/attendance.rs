use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::{db, grade, ledger};
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

fn attendance_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;

    let mut stmt = conn
        .prepare(
            "SELECT week, present FROM attendance_weeks
             WHERE cadet_id = ? AND semester_id = ? AND week BETWEEN 1 AND ?",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let stored: HashMap<i64, bool> = stmt
        .query_map((&cadet_id, &semester.id, semester.week_count), |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)? != 0))
        })
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    // Untouched pairs read as a full run of absences.
    let weeks: Vec<serde_json::Value> = (1..=semester.week_count)
        .map(|w| {
            json!({
                "week": w,
                "present": stored.get(&w).copied().unwrap_or(false),
            })
        })
        .collect();
    let weeks_present = stored.values().filter(|p| **p).count() as i64;

    Ok(json!({
        "cadetId": cadet_id,
        "semesterName": semester.name,
        "weekCount": semester.week_count,
        "weeks": weeks,
        "weeksPresent": weeks_present,
        "score": grade::attendance_score(weeks_present, semester.week_count),
    }))
}

fn attendance_set_week(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;
    let week = params
        .get("week")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing week".to_string(),
            details: None,
        })?;
    let present = params
        .get("present")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing present".to_string(),
            details: None,
        })?;
    let actor = params
        .get("actor")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("system")
        .to_string();
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
    ledger::set_week(&tx, &cadet_id, &semester, week, present, &actor).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance_weeks" })),
    })?;
    let (weeks_present, score) =
        ledger::recompute_totals(&tx, &cadet_id, &semester).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance_totals" })),
        })?;
    grade::recompute(&tx, &cadet_id, &semester).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.message,
        details: None,
    })?;
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({
        "weeksPresent": weeks_present,
        "score": score,
    }))
}

fn handle_attendance_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_open(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_set_week(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_set_week(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.open" => Some(handle_attendance_open(state, req)),
        "attendance.setWeek" => Some(handle_attendance_set_week(state, req)),
        _ => None,
    }
}
