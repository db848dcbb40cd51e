use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_cadetd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn cadetd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn result_of(value: &serde_json::Value, method: &str) -> serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result payload")
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn toggling_a_week_updates_totals_and_the_cached_summary() {
    let workspace = temp_dir("cadet-manual-edit");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let added = request(
        &mut stdin,
        &mut reader,
        "2",
        "cadets.add",
        json!({ "cadetNo": "2023012345", "lastName": "Reyes", "firstName": "Ana" }),
    );
    let cadet = result_of(&added, "cadets.add")
        .get("id")
        .and_then(|v| v.as_str())
        .expect("cadet id")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "semesters.define",
        json!({ "name": "2025-1", "startDate": "2025-08-15", "weekCount": 10 }),
    );

    let set = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "4",
            "attendance.setWeek",
            json!({
                "cadetId": cadet,
                "semesterName": "2025-1",
                "week": 3,
                "present": true,
                "actor": "registrar"
            }),
        ),
        "attendance.setWeek",
    );
    assert_eq!(set.get("weeksPresent").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(set.get("score").and_then(|v| v.as_i64()), Some(3));

    let summary = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "5",
            "grades.open",
            json!({ "cadetId": cadet, "semesterName": "2025-1" }),
        ),
        "grades.open",
    );
    assert_eq!(
        summary.get("attendanceScore").and_then(|v| v.as_i64()),
        Some(3)
    );

    // Flip it back; the summary cache must follow, not go stale.
    let set = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "6",
            "attendance.setWeek",
            json!({
                "cadetId": cadet,
                "semesterName": "2025-1",
                "week": 3,
                "present": false,
                "actor": "registrar"
            }),
        ),
        "attendance.setWeek",
    );
    assert_eq!(set.get("weeksPresent").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(set.get("score").and_then(|v| v.as_i64()), Some(0));

    let summary = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "7",
            "grades.open",
            json!({ "cadetId": cadet, "semesterName": "2025-1" }),
        ),
        "grades.open",
    );
    assert_eq!(
        summary.get("attendanceScore").and_then(|v| v.as_i64()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn out_of_range_weeks_and_unknown_cadets_are_rejected() {
    let workspace = temp_dir("cadet-manual-reject");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let added = request(
        &mut stdin,
        &mut reader,
        "2",
        "cadets.add",
        json!({ "cadetNo": "2023012345", "lastName": "Reyes", "firstName": "Ana" }),
    );
    let cadet = result_of(&added, "cadets.add")
        .get("id")
        .and_then(|v| v.as_str())
        .expect("cadet id")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "semesters.define",
        json!({ "name": "2025-1", "startDate": "2025-08-15", "weekCount": 10 }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.setWeek",
        json!({
            "cadetId": cadet,
            "semesterName": "2025-1",
            "week": 11,
            "present": true
        }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.setWeek",
        json!({
            "cadetId": "no-such-cadet",
            "semesterName": "2025-1",
            "week": 1,
            "present": true
        }),
    );
    assert_eq!(error_code(&resp), "not_found");

    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "conduct.setWeek",
        json!({
            "cadetId": cadet,
            "semesterName": "2025-1",
            "week": 0,
            "merits": 0,
            "demerits": 1
        }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
