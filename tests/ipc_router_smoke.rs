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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
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
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn result_str(resp: &serde_json::Value, key: &str) -> String {
    resp.get("result")
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing result.{}", key))
        .to_string()
}

#[test]
fn garbage_lines_and_unknown_methods_get_error_envelopes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // An unparseable line can't echo an id but must still answer.
    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let resp: serde_json::Value =
        serde_json::from_str(line.trim()).expect("parse error envelope");
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_json")
    );

    // A well-formed request for a method nobody handles.
    writeln!(
        stdin,
        "{}",
        json!({ "id": "u1", "method": "no.such.method", "params": {} })
    )
    .expect("write unknown method");
    stdin.flush().expect("flush unknown method");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let resp: serde_json::Value =
        serde_json::from_str(line.trim()).expect("parse error envelope");
    assert_eq!(resp.get("id").and_then(|v| v.as_str()), Some("u1"));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    // The loop survives both and keeps serving.
    let resp = request(&mut stdin, &mut reader, "u2", "health", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn department_counts_track_programs_and_courses() {
    let workspace = temp_dir("campusd-dept-counts");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        json!({
            "email": "counts@example.test",
            "password": "pw",
            "displayName": "Counter"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "session.login",
        json!({ "email": "counts@example.test", "password": "pw" }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "4",
        "departments.create",
        json!({ "name": "Sciences" }),
    );
    let sciences_id = result_str(&created, "departmentId");
    let created = request(
        &mut stdin,
        &mut reader,
        "5",
        "departments.create",
        json!({ "name": "Humanities" }),
    );
    let humanities_id = result_str(&created, "departmentId");

    for (id, name) in [("6", "BS Physics"), ("7", "BS Chemistry")] {
        let _ = request(
            &mut stdin,
            &mut reader,
            id,
            "programs.create",
            json!({ "name": name, "durationYears": 4, "departmentId": sciences_id }),
        );
    }
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "courses.create",
        json!({ "code": "PHY-101", "title": "Mechanics", "departmentId": sciences_id }),
    );

    let listed = request(&mut stdin, &mut reader, "9", "departments.list", json!({}));
    let rows = listed
        .get("result")
        .and_then(|r| r.get("rows"))
        .and_then(|v| v.as_array())
        .expect("rows");
    assert_eq!(rows.len(), 2);

    let sciences = rows
        .iter()
        .find(|r| r["id"] == sciences_id.as_str())
        .expect("sciences row");
    assert_eq!(sciences["programCount"], 2);
    assert_eq!(sciences["courseCount"], 1);

    let humanities = rows
        .iter()
        .find(|r| r["id"] == humanities_id.as_str())
        .expect("humanities row");
    assert_eq!(humanities["programCount"], 0);
    assert_eq!(humanities["courseCount"], 0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("campusd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "users.create",
        json!({
            "email": "admin@example.test",
            "password": "smoke-pass",
            "displayName": "Smoke Admin"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "session.login",
        json!({ "email": "admin@example.test", "password": "smoke-pass" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "campus.set",
        json!({ "name": "Smoke Campus" }),
    );
    let _ = request(&mut stdin, &mut reader, "6", "campus.get", json!({}));

    let created = request(
        &mut stdin,
        &mut reader,
        "7",
        "departments.create",
        json!({ "name": "Smoke Department", "head": "D. Head" }),
    );
    let department_id = result_str(&created, "departmentId");
    let _ = request(&mut stdin, &mut reader, "8", "departments.list", json!({}));

    let created = request(
        &mut stdin,
        &mut reader,
        "9",
        "programs.create",
        json!({ "name": "Smoke Program", "durationYears": 4, "departmentId": department_id }),
    );
    let program_id = result_str(&created, "programId");
    let _ = request(&mut stdin, &mut reader, "10", "programs.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "10b",
        "programs.update",
        json!({ "programId": program_id, "patch": { "durationYears": 3 } }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "11",
        "courses.create",
        json!({
            "code": "SMK-101",
            "title": "Intro to Smoke",
            "creditHours": 3,
            "departmentId": department_id
        }),
    );
    let course_id = result_str(&created, "courseId");
    let _ = request(&mut stdin, &mut reader, "12", "courses.list", json!({}));

    let created = request(
        &mut stdin,
        &mut reader,
        "13",
        "students.create",
        json!({ "name": "Smoke Student", "className": "10th", "section": "A" }),
    );
    let student_id = result_str(&created, "studentId");
    let _ = request(&mut stdin, &mut reader, "14", "students.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "14b",
        "students.update",
        json!({ "studentId": student_id, "patch": { "section": "B" } }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "15",
        "fees.create",
        json!({ "studentId": student_id, "amount": 500, "month": "2026-01" }),
    );
    let fee_id = result_str(&created, "feeId");
    let _ = request(&mut stdin, &mut reader, "16", "fees.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "16b",
        "fees.update",
        json!({ "feeId": fee_id, "patch": { "status": "paid" } }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "exams.create",
        json!({ "title": "Smoke Midterm", "subject": "Physics", "totalMarks": 100 }),
    );
    let _ = request(&mut stdin, &mut reader, "18", "exams.list", json!({}));

    let created = request(
        &mut stdin,
        &mut reader,
        "19",
        "staff.create",
        json!({
            "staffName": "Smoke Teacher",
            "role": "lecturer",
            "departmentId": department_id,
            "courseId": course_id
        }),
    );
    let assignment_id = result_str(&created, "assignmentId");
    let _ = request(&mut stdin, &mut reader, "20", "staff.list", json!({}));

    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "records.import",
        json!({
            "entity": "exams",
            "payload": { "data": [{ "title": "Imported Final" }] }
        }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "22",
        "staff.delete",
        json!({ "assignmentId": assignment_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "23",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "24",
        "departments.delete",
        json!({ "departmentId": department_id }),
    );
    let _ = request(&mut stdin, &mut reader, "25", "session.current", json!({}));
    let _ = request(&mut stdin, &mut reader, "26", "session.logout", json!({}));

    let unknown = request(&mut stdin, &mut reader, "27", "session.current", json!({}));
    assert_eq!(
        unknown
            .get("result")
            .and_then(|r| r.get("loggedIn"))
            .and_then(|v| v.as_bool()),
        Some(false)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
