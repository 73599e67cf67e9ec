use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    apply_patch, db_conn, filtered_rows, optional_f64, optional_str, require_session, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

const SEARCH_FIELDS: &[&str] = &["title", "className", "subject", "examDate", "totalMarks"];

const PATCH_COLUMNS: &[(&str, &str)] = &[
    ("title", "title"),
    ("className", "class_name"),
    ("subject", "subject"),
    ("examDate", "exam_date"),
    ("totalMarks", "total_marks"),
];

fn load_rows(conn: &rusqlite::Connection) -> Result<Vec<Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, title, class_name, subject, exam_date, total_marks
         FROM exams
         ORDER BY rowid",
    )?;
    stmt.query_map([], |row| {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "title": row.get::<_, String>(1)?,
            "className": row.get::<_, Option<String>>(2)?,
            "subject": row.get::<_, Option<String>>(3)?,
            "examDate": row.get::<_, Option<String>>(4)?,
            "totalMarks": row.get::<_, Option<f64>>(5)?,
        }))
    })
    .and_then(|it| it.collect())
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = match load_rows(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let (result, _) = filtered_rows(req, rows, SEARCH_FIELDS);
    ok(&req.id, Value::Object(result))
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exam_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO exams(id, title, class_name, subject, exam_date, total_marks)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &exam_id,
            &title,
            optional_str(req, "className"),
            optional_str(req, "subject"),
            optional_str(req, "examDate"),
            optional_f64(req, "totalMarks"),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "exams" })),
        );
    }

    ok(&req.id, json!({ "examId": exam_id, "title": title }))
}

fn handle_exams_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = req.params.get("patch").cloned().unwrap_or(Value::Null);

    match apply_patch(conn, req, "exams", &exam_id, PATCH_COLUMNS, &patch) {
        Ok(0) => err(&req.id, "not_found", "exam not found", None),
        Ok(_) => ok(&req.id, json!({ "examId": exam_id })),
        Err(e) => e,
    }
}

fn handle_exams_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute("DELETE FROM exams WHERE id = ?", [&exam_id]) {
        Ok(0) => err(&req.id, "not_found", "exam not found", None),
        Ok(_) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.create" => Some(handle_exams_create(state, req)),
        "exams.update" => Some(handle_exams_update(state, req)),
        "exams.delete" => Some(handle_exams_delete(state, req)),
        _ => None,
    }
}
