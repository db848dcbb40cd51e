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

fn recompute_to_json(
    conn: &Connection,
    cadet_id: &str,
    semester: &db::Semester,
) -> Result<serde_json::Value, HandlerErr> {
    let summary = grade::recompute(conn, cadet_id, semester).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.message,
        details: None,
    })?;
    serde_json::to_value(&summary).map_err(|e| HandlerErr {
        code: "serialize_failed",
        message: e.to_string(),
        details: None,
    })
}

fn grades_recompute(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;
    recompute_to_json(conn, &cadet_id, &semester)
}

fn grades_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;

    let cached: Option<(i64, i64, i64, i64, f64, String)> = conn
        .query_row(
            "SELECT conduct_score, attendance_score, exam_score, final_percent, equivalence, remark
             FROM grade_summaries
             WHERE cadet_id = ? AND semester_id = ?",
            (&cadet_id, &semester.id),
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    match cached {
        Some((conduct, attendance, exam, final_percent, equivalence, remark)) => Ok(json!({
            "cadetId": cadet_id,
            "semesterId": semester.id,
            "semesterName": semester.name,
            "conductScore": conduct,
            "attendanceScore": attendance,
            "examScore": exam,
            "finalPercent": final_percent,
            "equivalence": equivalence,
            "remark": remark,
        })),
        // Cache miss after invalidation: recompute and fill.
        None => recompute_to_json(conn, &cadet_id, &semester),
    }
}

fn grades_publish_final(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (cadet_id, semester) = load_context(conn, params)?;
    let common_module = params.get("commonModuleGrade").and_then(|v| v.as_f64());

    let summary = grade::recompute(conn, &cadet_id, &semester).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.message,
        details: None,
    })?;
    let Some(published) =
        grade::published_final(semester.term_no, summary.final_percent, common_module)
    else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "term one requires commonModuleGrade to publish".to_string(),
            details: None,
        });
    };

    Ok(json!({
        "cadetId": cadet_id,
        "semesterName": semester.name,
        "termNo": semester.term_no,
        "rotcPercent": summary.final_percent,
        "publishedFinal": published,
        "equivalence": summary.equivalence,
        "remark": summary.remark,
    }))
}

fn handle_grades_recompute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match grades_recompute(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match grades_open(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_publish_final(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match grades_publish_final(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.recompute" => Some(handle_grades_recompute(state, req)),
        "grades.open" => Some(handle_grades_open(state, req)),
        "grades.publishFinal" => Some(handle_grades_publish_final(state, req)),
        _ => None,
    }
}
