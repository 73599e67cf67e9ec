use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, filtered_rows, optional_str, require_session, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

const SEARCH_FIELDS: &[&str] = &["name", "head"];

fn load_rows(conn: &rusqlite::Connection) -> Result<Vec<Value>, rusqlite::Error> {
    // Correlated subqueries keep the counts join-free.
    let mut stmt = conn.prepare(
        "SELECT
           d.id,
           d.name,
           d.head,
           (SELECT COUNT(*) FROM programs p WHERE p.department_id = d.id) AS program_count,
           (SELECT COUNT(*) FROM courses c WHERE c.department_id = d.id) AS course_count
         FROM departments d
         ORDER BY d.rowid",
    )?;
    stmt.query_map([], |row| {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "name": row.get::<_, String>(1)?,
            "head": row.get::<_, Option<String>>(2)?,
            "programCount": row.get::<_, i64>(3)?,
            "courseCount": row.get::<_, i64>(4)?,
        }))
    })
    .and_then(|it| it.collect())
}

fn handle_departments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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

fn handle_departments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let department_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO departments(id, name, head) VALUES(?, ?, ?)",
        (&department_id, &name, optional_str(req, "head")),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        );
    }

    ok(
        &req.id,
        json!({ "departmentId": department_id, "name": name }),
    )
}

fn handle_departments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let department_id = match required_str(req, "departmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM departments WHERE id = ?",
            [&department_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "department not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Dependents lose their department link rather than disappearing.
    for table in ["programs", "courses", "staff_assignments"] {
        let sql = format!(
            "UPDATE {} SET department_id = NULL WHERE department_id = ?",
            table
        );
        if let Err(e) = tx.execute(&sql, [&department_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.execute("DELETE FROM departments WHERE id = ?", [&department_id]) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.list" => Some(handle_departments_list(state, req)),
        "departments.create" => Some(handle_departments_create(state, req)),
        "departments.delete" => Some(handle_departments_delete(state, req)),
        _ => None,
    }
}
