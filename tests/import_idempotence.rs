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

#[test]
fn reimporting_the_same_file_changes_nothing() {
    let workspace = temp_dir("cadet-import-idem");
    let scan_file = workspace.join("scans.csv");
    std::fs::write(
        &scan_file,
        "UserID,Date\n\
         23012345,2025-08-15\n\
         23012345,2025-08-22\n\
         23012345,2025-08-23\n",
    )
    .expect("write scan fixture");

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
    let cadet_id = result_of(&added, "cadets.add")
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

    let import_params = json!({
        "path": scan_file.to_string_lossy(),
        "semesterName": "2025-1"
    });
    let first = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "4",
            "imports.attendanceFile",
            import_params.clone(),
        ),
        "first import",
    );
    // Three scans collapse to weeks 1 and 2 (the 22nd and 23rd share week 2).
    assert_eq!(first.get("importedCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(first.get("updatedCount").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(first.get("skippedCount").and_then(|v| v.as_i64()), Some(0));

    let second = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "5",
            "imports.attendanceFile",
            import_params,
        ),
        "second import",
    );
    assert_eq!(second.get("importedCount").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(second.get("updatedCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(second.get("skippedCount").and_then(|v| v.as_i64()), Some(0));

    let opened = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "6",
            "attendance.open",
            json!({ "cadetId": cadet_id, "semesterName": "2025-1" }),
        ),
        "attendance.open",
    );
    assert_eq!(opened.get("weeksPresent").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(opened.get("score").and_then(|v| v.as_i64()), Some(6));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn manual_absence_survives_until_the_file_claims_the_week_again() {
    let workspace = temp_dir("cadet-import-absence");
    let scan_file = workspace.join("scans.csv");
    std::fs::write(&scan_file, "UserID,Date\n23012345,2025-08-15\n").expect("write fixture");

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
    let cadet_id = result_of(&added, "cadets.add")
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

    let import_params = json!({
        "path": scan_file.to_string_lossy(),
        "semesterName": "2025-1"
    });
    let first = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "4",
            "imports.attendanceFile",
            import_params.clone(),
        ),
        "first import",
    );
    assert_eq!(first.get("importedCount").and_then(|v| v.as_i64()), Some(1));

    // Manually mark the week absent; the next identical import re-claims it.
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.setWeek",
        json!({
            "cadetId": cadet_id,
            "semesterName": "2025-1",
            "week": 1,
            "present": false,
            "actor": "registrar"
        }),
    );
    let second = result_of(
        &request(
            &mut stdin,
            &mut reader,
            "6",
            "imports.attendanceFile",
            import_params,
        ),
        "second import",
    );
    assert_eq!(second.get("importedCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(second.get("updatedCount").and_then(|v| v.as_i64()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
