use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    apply_patch, db_conn, filtered_rows, optional_str, require_session, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

const SEARCH_FIELDS: &[&str] = &["staffName", "role", "departmentName", "courseTitle"];

const PATCH_COLUMNS: &[(&str, &str)] = &[
    ("staffName", "staff_name"),
    ("role", "role"),
    ("departmentId", "department_id"),
    ("courseId", "course_id"),
];

fn load_rows(conn: &rusqlite::Connection) -> Result<Vec<Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.staff_name, a.role, a.department_id, d.name, a.course_id, c.title
         FROM staff_assignments a
         LEFT JOIN departments d ON d.id = a.department_id
         LEFT JOIN courses c ON c.id = a.course_id
         ORDER BY a.rowid",
    )?;
    stmt.query_map([], |row| {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "staffName": row.get::<_, String>(1)?,
            "role": row.get::<_, String>(2)?,
            "departmentId": row.get::<_, Option<String>>(3)?,
            "departmentName": row.get::<_, Option<String>>(4)?,
            "courseId": row.get::<_, Option<String>>(5)?,
            "courseTitle": row.get::<_, Option<String>>(6)?,
        }))
    })
    .and_then(|it| it.collect())
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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

fn handle_staff_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let staff_name = match required_str(req, "staffName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role = match required_str(req, "role") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let assignment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO staff_assignments(id, staff_name, role, department_id, course_id)
         VALUES(?, ?, ?, ?, ?)",
        (
            &assignment_id,
            &staff_name,
            &role,
            optional_str(req, "departmentId"),
            optional_str(req, "courseId"),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "staff_assignments" })),
        );
    }

    ok(
        &req.id,
        json!({ "assignmentId": assignment_id, "staffName": staff_name }),
    )
}

fn handle_staff_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = req.params.get("patch").cloned().unwrap_or(Value::Null);

    match apply_patch(
        conn,
        req,
        "staff_assignments",
        &assignment_id,
        PATCH_COLUMNS,
        &patch,
    ) {
        Ok(0) => err(&req.id, "not_found", "assignment not found", None),
        Ok(_) => ok(&req.id, json!({ "assignmentId": assignment_id })),
        Err(e) => e,
    }
}

fn handle_staff_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute(
        "DELETE FROM staff_assignments WHERE id = ?",
        [&assignment_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "assignment not found", None),
        Ok(_) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.list" => Some(handle_staff_list(state, req)),
        "staff.create" => Some(handle_staff_create(state, req)),
        "staff.update" => Some(handle_staff_update(state, req)),
        "staff.delete" => Some(handle_staff_delete(state, req)),
        _ => None,
    }
}
