use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::{calendar, db, grade, ingest, ledger, roster};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;

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

fn ingest_err(e: ingest::IngestError) -> HandlerErr {
    HandlerErr {
        code: match e.code() {
            "date_range" => "date_range",
            _ => "structural_parse",
        },
        message: e.to_string(),
        details: None,
    }
}

fn import_attendance_file(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path_raw = get_required_str(params, "path")?;
    let semester_name = get_required_str(params, "semesterName")?;
    let actor = params
        .get("actor")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("system")
        .to_string();

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

    let path = Path::new(&path_raw);
    let rows = ingest::read_rows(path).map_err(ingest_err)?;
    let events = ingest::extract_events(&rows).map_err(ingest_err)?;

    let cadets = roster::load_roster(conn).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;

    // Row-level problems are collected, never raised: the batch keeps going.
    let mut errors: Vec<serde_json::Value> = Vec::new();
    let mut skipped = 0_i64;
    let mut presences: Vec<ledger::ResolvedPresence> = Vec::new();
    let mut seen: HashSet<(String, i64)> = HashSet::new();

    for event in &events {
        let Some(cadet) = roster::resolve(&cadets, &event.external_id, event.name.as_deref())
        else {
            tracing::warn!(
                external_id = %event.external_id,
                "skipping row with unresolvable scanner id"
            );
            skipped += 1;
            errors.push(json!({
                "code": "unresolved_id",
                "externalId": event.external_id,
            }));
            continue;
        };
        let Some(date) = calendar::parse_date(&event.date_raw) else {
            tracing::warn!(
                external_id = %event.external_id,
                raw_date = %event.date_raw,
                "skipping row with unparseable date"
            );
            skipped += 1;
            errors.push(json!({
                "code": "bad_date",
                "externalId": event.external_id,
                "rawDate": event.date_raw,
            }));
            continue;
        };
        let week = match calendar::week_index(semester.start_date, date) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(
                    external_id = %event.external_id,
                    raw_date = %event.date_raw,
                    "skipping row: {}", e
                );
                skipped += 1;
                errors.push(json!({
                    "code": e.code(),
                    "externalId": event.external_id,
                    "rawDate": event.date_raw,
                    "message": e.to_string(),
                }));
                continue;
            }
        };
        // The mapper only enforces the global ceiling; clamp to this term.
        if week > semester.week_count {
            tracing::warn!(
                external_id = %event.external_id,
                raw_date = %event.date_raw,
                week,
                "skipping row beyond the semester's week count"
            );
            skipped += 1;
            errors.push(json!({
                "code": "week_out_of_range",
                "externalId": event.external_id,
                "rawDate": event.date_raw,
                "week": week,
            }));
            continue;
        }
        if seen.insert((cadet.id.clone(), week)) {
            presences.push(ledger::ResolvedPresence {
                cadet_id: cadet.id.clone(),
                week,
            });
        }
    }

    // Whole-file transaction: a persistence failure leaves no partial
    // ledger state. Per-cadet faults inside stay inside the outcome.
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let mut outcome = ledger::apply_presence(&tx, &semester, &presences, &actor);
    for cadet_id in &outcome.affected_cadets {
        grade::recompute(&tx, cadet_id, &semester).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.message,
            details: Some(json!({ "cadetId": cadet_id })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    skipped += outcome.skipped_cadets;
    errors.append(&mut outcome.errors);

    Ok(json!({
        "importedCount": outcome.imported,
        "updatedCount": outcome.updated,
        "skippedCount": skipped,
        "errors": errors,
        "affectedCadetIds": outcome.affected_cadets,
        "affectedWeeks": outcome.affected_weeks,
    }))
}

fn handle_import_attendance_file(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match import_attendance_file(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "imports.attendanceFile" => Some(handle_import_attendance_file(state, req)),
        _ => None,
    }
}
