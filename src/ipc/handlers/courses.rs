use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    apply_patch, db_conn, filtered_rows, optional_i64, optional_str, require_session, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

const SEARCH_FIELDS: &[&str] = &["code", "title", "departmentName", "creditHours"];

const PATCH_COLUMNS: &[(&str, &str)] = &[
    ("code", "code"),
    ("title", "title"),
    ("creditHours", "credit_hours"),
    ("departmentId", "department_id"),
];

fn load_rows(conn: &rusqlite::Connection) -> Result<Vec<Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.code, c.title, c.credit_hours, c.department_id, d.name
         FROM courses c
         LEFT JOIN departments d ON d.id = c.department_id
         ORDER BY c.rowid",
    )?;
    stmt.query_map([], |row| {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "code": row.get::<_, String>(1)?,
            "title": row.get::<_, String>(2)?,
            "creditHours": row.get::<_, Option<i64>>(3)?,
            "departmentId": row.get::<_, Option<String>>(4)?,
            "departmentName": row.get::<_, Option<String>>(5)?,
        }))
    })
    .and_then(|it| it.collect())
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, code, title, credit_hours, department_id)
         VALUES(?, ?, ?, ?, ?)",
        (
            &course_id,
            &code,
            &title,
            optional_i64(req, "creditHours"),
            optional_str(req, "departmentId"),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    ok(&req.id, json!({ "courseId": course_id, "code": code }))
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = req.params.get("patch").cloned().unwrap_or(Value::Null);

    match apply_patch(conn, req, "courses", &course_id, PATCH_COLUMNS, &patch) {
        Ok(0) => err(&req.id, "not_found", "course not found", None),
        Ok(_) => ok(&req.id, json!({ "courseId": course_id })),
        Err(e) => e,
    }
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Staff rows keep their department link; only the course link is cleared.
    if let Err(e) = tx.execute(
        "UPDATE staff_assignments SET course_id = NULL WHERE course_id = ?",
        [&course_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "staff_assignments" })),
        );
    }

    let deleted = match tx.execute("DELETE FROM courses WHERE id = ?", [&course_id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return err(&req.id, "not_found", "course not found", None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.update" => Some(handle_courses_update(state, req)),
        "courses.delete" => Some(handle_courses_delete(state, req)),
        _ => None,
    }
}
