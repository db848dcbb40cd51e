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

struct Session {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u32,
}

impl Session {
    fn open(workspace: &PathBuf) -> Self {
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Session {
            child,
            stdin,
            reader,
            next_id: 0,
        };
        let _ = s.call("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        s
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn expect(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let resp = self.call(method, params);
        result_of(&resp, method)
    }

    fn close(mut self, workspace: PathBuf) {
        drop(self.stdin);
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(workspace);
    }
}

fn seed_cadet(s: &mut Session) -> String {
    let added = s.expect(
        "cadets.add",
        json!({ "cadetNo": "2023012345", "lastName": "Reyes", "firstName": "Ana" }),
    );
    added
        .get("id")
        .and_then(|v| v.as_str())
        .expect("cadet id")
        .to_string()
}

#[test]
fn full_pipeline_composes_the_three_components() {
    let workspace = temp_dir("cadet-grade-pipeline");
    let mut s = Session::open(&workspace);
    let cadet = seed_cadet(&mut s);
    let _ = s.expect(
        "semesters.define",
        json!({
            "name": "2025-2",
            "startDate": "2026-01-12",
            "weekCount": 10,
            "termNo": 2,
            "hasMidterm": true
        }),
    );

    for week in 1..=10 {
        let set = s.expect(
            "attendance.setWeek",
            json!({
                "cadetId": cadet,
                "semesterName": "2025-2",
                "week": week,
                "present": true
            }),
        );
        assert_eq!(
            set.get("weeksPresent").and_then(|v| v.as_i64()),
            Some(week)
        );
    }

    // 20 demerits over the term: round((100-20)/100*30) = 24.
    let set = s.expect(
        "conduct.setWeek",
        json!({
            "cadetId": cadet,
            "semesterName": "2025-2",
            "week": 1,
            "merits": 0,
            "demerits": 10
        }),
    );
    assert_eq!(set.get("conductScore").and_then(|v| v.as_i64()), Some(27));
    let set = s.expect(
        "conduct.setWeek",
        json!({
            "cadetId": cadet,
            "semesterName": "2025-2",
            "week": 2,
            "merits": 0,
            "demerits": 10
        }),
    );
    assert_eq!(set.get("conductScore").and_then(|v| v.as_i64()), Some(24));

    // Dual-exam term averages the two ratios: (0.80 + 0.90)/2 * 40 = 34.
    let set = s.expect(
        "exams.set",
        json!({
            "cadetId": cadet,
            "semesterName": "2025-2",
            "midterm": 90,
            "final": 80
        }),
    );
    assert_eq!(set.get("examScore").and_then(|v| v.as_i64()), Some(34));

    let summary = s.expect(
        "grades.recompute",
        json!({ "cadetId": cadet, "semesterName": "2025-2" }),
    );
    assert_eq!(summary.get("conductScore").and_then(|v| v.as_i64()), Some(24));
    assert_eq!(
        summary.get("attendanceScore").and_then(|v| v.as_i64()),
        Some(30)
    );
    assert_eq!(summary.get("examScore").and_then(|v| v.as_i64()), Some(34));
    assert_eq!(summary.get("finalPercent").and_then(|v| v.as_i64()), Some(88));
    assert_eq!(summary.get("equivalence").and_then(|v| v.as_f64()), Some(1.75));
    assert_eq!(summary.get("remark").and_then(|v| v.as_str()), Some("Passed"));

    // Term two publishes the computed percentage unmodified.
    let published = s.expect(
        "grades.publishFinal",
        json!({ "cadetId": cadet, "semesterName": "2025-2" }),
    );
    assert_eq!(
        published.get("publishedFinal").and_then(|v| v.as_i64()),
        Some(88)
    );
    assert_eq!(
        published.get("rotcPercent").and_then(|v| v.as_i64()),
        Some(88)
    );

    s.close(workspace);
}

#[test]
fn term_one_publication_averages_the_common_module_grade() {
    let workspace = temp_dir("cadet-grade-term1");
    let mut s = Session::open(&workspace);
    let cadet = seed_cadet(&mut s);
    let _ = s.expect(
        "semesters.define",
        json!({
            "name": "2025-1",
            "startDate": "2025-08-15",
            "weekCount": 10,
            "termNo": 1
        }),
    );
    let _ = s.expect(
        "exams.set",
        json!({
            "cadetId": cadet,
            "semesterName": "2025-1",
            "final": 100
        }),
    );
    // No attendance: conduct 30 + attendance 0 + exam 40 = 70.
    let summary = s.expect(
        "grades.recompute",
        json!({ "cadetId": cadet, "semesterName": "2025-1" }),
    );
    assert_eq!(summary.get("finalPercent").and_then(|v| v.as_i64()), Some(70));

    // Term one requires the common-module grade for publication.
    let resp = s.call(
        "grades.publishFinal",
        json!({ "cadetId": cadet, "semesterName": "2025-1" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let published = s.expect(
        "grades.publishFinal",
        json!({
            "cadetId": cadet,
            "semesterName": "2025-1",
            "commonModuleGrade": 90
        }),
    );
    // round((90 + 70) / 2) = 80.
    assert_eq!(
        published.get("publishedFinal").and_then(|v| v.as_i64()),
        Some(80)
    );

    s.close(workspace);
}

#[test]
fn midterms_are_rejected_on_single_final_terms() {
    let workspace = temp_dir("cadet-grade-nomid");
    let mut s = Session::open(&workspace);
    let cadet = seed_cadet(&mut s);
    let _ = s.expect(
        "semesters.define",
        json!({
            "name": "2025-1",
            "startDate": "2025-08-15",
            "weekCount": 10,
            "termNo": 1
        }),
    );
    let resp = s.call(
        "exams.set",
        json!({
            "cadetId": cadet,
            "semesterName": "2025-1",
            "midterm": 85
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    s.close(workspace);
}
