use crate::calendar;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

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

fn semesters_define(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let start_raw = get_required_str(params, "startDate")?;
    let week_count = params
        .get("weekCount")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing weekCount".to_string(),
            details: None,
        })?;
    let term_no = params.get("termNo").and_then(|v| v.as_i64()).unwrap_or(1);
    // Dual-exam defaults to term 2 unless stated.
    let has_midterm = params
        .get("hasMidterm")
        .and_then(|v| v.as_bool())
        .unwrap_or(term_no == 2);
    let max_final = params
        .get("maxFinal")
        .and_then(|v| v.as_f64())
        .unwrap_or(100.0);
    let max_midterm = params
        .get("maxMidterm")
        .and_then(|v| v.as_f64())
        .unwrap_or(100.0);

    if week_count != 10 && week_count != 15 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "weekCount must be 10 or 15".to_string(),
            details: None,
        });
    }
    if max_final <= 0.0 || max_midterm <= 0.0 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "exam maxima must be positive".to_string(),
            details: None,
        });
    }
    let Some(start_date) = calendar::parse_date(&start_raw) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("unparseable startDate {:?}", start_raw),
            details: None,
        });
    };

    // Semesters are immutable once defined.
    let existing: Option<String> = conn
        .query_row("SELECT id FROM semesters WHERE name = ?", [&name], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    if existing.is_some() {
        return Err(HandlerErr {
            code: "duplicate",
            message: format!("semester {} is already defined", name),
            details: None,
        });
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO semesters(id, name, start_date, week_count, term_no, has_midterm, max_final, max_midterm)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &name,
            start_date.format("%Y-%m-%d").to_string(),
            week_count,
            term_no,
            has_midterm as i64,
            max_final,
            max_midterm,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "semesters" })),
    })?;

    Ok(json!({ "id": id }))
}

fn semesters_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, start_date, week_count, term_no, has_midterm, max_final, max_midterm
             FROM semesters
             ORDER BY start_date",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let semesters: Vec<serde_json::Value> = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "startDate": r.get::<_, String>(2)?,
                "weekCount": r.get::<_, i64>(3)?,
                "termNo": r.get::<_, i64>(4)?,
                "hasMidterm": r.get::<_, i64>(5)? != 0,
                "maxFinal": r.get::<_, f64>(6)?,
                "maxMidterm": r.get::<_, f64>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "semesters": semesters }))
}

fn handle_semesters_define(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match semesters_define(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_semesters_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match semesters_list(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "semesters.define" => Some(handle_semesters_define(state, req)),
        "semesters.list" => Some(handle_semesters_list(state, req)),
        _ => None,
    }
}
