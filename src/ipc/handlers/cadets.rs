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

fn cadets_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let cadet_no = get_required_str(params, "cadetNo")?;
    let last_name = get_required_str(params, "lastName")?;
    let first_name = get_required_str(params, "firstName")?;
    let unit = params
        .get("unit")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let is_staff = params
        .get("isStaff")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if !cadet_no.chars().all(|c| c.is_ascii_digit()) {
        return Err(HandlerErr {
            code: "bad_params",
            message: "cadetNo must be numeric".to_string(),
            details: None,
        });
    }

    let duplicate: Option<String> = conn
        .query_row(
            "SELECT id FROM cadets WHERE cadet_no = ?",
            [&cadet_no],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    if duplicate.is_some() {
        return Err(HandlerErr {
            code: "duplicate",
            message: format!("cadet number {} already on the roster", cadet_no),
            details: None,
        });
    }

    let sort_order: i64 = conn
        .query_row("SELECT COUNT(*) FROM cadets", [], |r| r.get(0))
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO cadets(id, cadet_no, last_name, first_name, unit, is_staff, active, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &id,
            &cadet_no,
            &last_name,
            &first_name,
            &unit,
            is_staff as i64,
            sort_order,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "cadets" })),
    })?;

    Ok(json!({ "id": id }))
}

fn cadets_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, cadet_no, last_name, first_name, unit, is_staff, active
             FROM cadets
             ORDER BY sort_order",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let cadets: Vec<serde_json::Value> = stmt
        .query_map([], |r| {
            let last: String = r.get(2)?;
            let first: String = r.get(3)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "cadetNo": r.get::<_, String>(1)?,
                "displayName": format!("{}, {}", last, first),
                "lastName": last,
                "firstName": first,
                "unit": r.get::<_, Option<String>>(4)?,
                "isStaff": r.get::<_, i64>(5)? != 0,
                "active": r.get::<_, i64>(6)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "cadets": cadets }))
}

fn handle_cadets_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match cadets_add(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_cadets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match cadets_list(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "cadets.add" => Some(handle_cadets_add(state, req)),
        "cadets.list" => Some(handle_cadets_list(state, req)),
        _ => None,
    }
}
