use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::{db, grade};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

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

fn get_optional_score(
    params: &serde_json::Value,
    key: &str,
    max: f64,
) -> Result<Option<f64>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let Some(score) = v.as_f64() else {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("{} must be a number", key),
            details: None,
        });
    };
    if !(0.0..=max).contains(&score) {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("{} must be within 0..={}", key, max),
            details: None,
        });
    }
    Ok(Some(score))
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

fn exams_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;
    let final_score = get_optional_score(params, "final", semester.max_final)?;
    let midterm = get_optional_score(params, "midterm", semester.max_midterm)?;

    if midterm.is_some() && !semester.has_midterm {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("semester {} has no midterm examination", semester.name),
            details: None,
        });
    }
    if final_score.is_none() && midterm.is_none() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "provide final and/or midterm".to_string(),
            details: None,
        });
    }

    let existing: Option<(Option<f64>, Option<f64>)> = conn
        .query_row(
            "SELECT midterm, final_score FROM exam_records
             WHERE cadet_id = ? AND semester_id = ?",
            (&cadet_id, &semester.id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let (prev_midterm, prev_final) = existing.unwrap_or((None, None));
    let midterm = midterm.or(prev_midterm);
    let final_score = final_score.or(prev_final);

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute(
        "INSERT INTO exam_records(cadet_id, semester_id, midterm, final_score)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(cadet_id, semester_id) DO UPDATE SET
           midterm = excluded.midterm,
           final_score = excluded.final_score",
        (&cadet_id, &semester.id, midterm, final_score),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "exam_records" })),
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

    Ok(json!({ "examScore": summary.exam_score }))
}

fn exams_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;
    let row: Option<(Option<f64>, Option<f64>)> = conn
        .query_row(
            "SELECT midterm, final_score FROM exam_records
             WHERE cadet_id = ? AND semester_id = ?",
            (&cadet_id, &semester.id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let (midterm, final_score) = row.unwrap_or((None, None));

    Ok(json!({
        "cadetId": cadet_id,
        "semesterName": semester.name,
        "hasMidterm": semester.has_midterm,
        "midterm": midterm,
        "final": final_score,
        "maxFinal": semester.max_final,
        "maxMidterm": semester.max_midterm,
    }))
}

fn handle_exams_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match exams_set(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_exams_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match exams_open(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.set" => Some(handle_exams_set(state, req)),
        "exams.open" => Some(handle_exams_open(state, req)),
        _ => None,
    }
}
