use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    apply_patch, db_conn, filtered_rows, optional_i64, optional_str, require_session, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

const SEARCH_FIELDS: &[&str] = &["name", "departmentName", "durationYears"];

const PATCH_COLUMNS: &[(&str, &str)] = &[
    ("name", "name"),
    ("durationYears", "duration_years"),
    ("departmentId", "department_id"),
];

fn load_rows(conn: &rusqlite::Connection) -> Result<Vec<Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.duration_years, p.department_id, d.name
         FROM programs p
         LEFT JOIN departments d ON d.id = p.department_id
         ORDER BY p.rowid",
    )?;
    stmt.query_map([], |row| {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "name": row.get::<_, String>(1)?,
            "durationYears": row.get::<_, Option<i64>>(2)?,
            "departmentId": row.get::<_, Option<String>>(3)?,
            "departmentName": row.get::<_, Option<String>>(4)?,
        }))
    })
    .and_then(|it| it.collect())
}

fn handle_programs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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

fn handle_programs_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let program_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO programs(id, name, duration_years, department_id)
         VALUES(?, ?, ?, ?)",
        (
            &program_id,
            &name,
            optional_i64(req, "durationYears"),
            optional_str(req, "departmentId"),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "programs" })),
        );
    }

    ok(&req.id, json!({ "programId": program_id, "name": name }))
}

fn handle_programs_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let program_id = match required_str(req, "programId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = req.params.get("patch").cloned().unwrap_or(Value::Null);

    match apply_patch(conn, req, "programs", &program_id, PATCH_COLUMNS, &patch) {
        Ok(0) => err(&req.id, "not_found", "program not found", None),
        Ok(_) => ok(&req.id, json!({ "programId": program_id })),
        Err(e) => e,
    }
}

fn handle_programs_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let program_id = match required_str(req, "programId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute("DELETE FROM programs WHERE id = ?", [&program_id]) {
        Ok(0) => err(&req.id, "not_found", "program not found", None),
        Ok(_) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "programs.list" => Some(handle_programs_list(state, req)),
        "programs.create" => Some(handle_programs_create(state, req)),
        "programs.update" => Some(handle_programs_update(state, req)),
        "programs.delete" => Some(handle_programs_delete(state, req)),
        _ => None,
    }
}
