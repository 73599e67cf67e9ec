use crate::db;
use crate::filter;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    apply_patch, db_conn, filtered_rows, require_session, required_str,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

/// "amount" is searchable so a column query like `amount contains "30"`
/// works against the number's decimal form.
const SEARCH_FIELDS: &[&str] = &[
    "studentName",
    "className",
    "month",
    "status",
    "recordedBy",
    "amount",
];

const PATCH_COLUMNS: &[(&str, &str)] = &[
    ("amount", "amount"),
    ("month", "month"),
    ("status", "status"),
];

fn load_rows(conn: &rusqlite::Connection) -> Result<Vec<Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.student_id, s.name, s.class_name, f.amount, f.month,
                f.status, f.campus, f.recorded_by, f.created_at
         FROM fees f
         JOIN students s ON s.id = f.student_id
         ORDER BY f.rowid",
    )?;
    stmt.query_map([], |row| {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "studentId": row.get::<_, String>(1)?,
            "studentName": row.get::<_, String>(2)?,
            "className": row.get::<_, Option<String>>(3)?,
            "amount": row.get::<_, f64>(4)?,
            "month": row.get::<_, String>(5)?,
            "status": row.get::<_, String>(6)?,
            "campus": row.get::<_, Option<String>>(7)?,
            "recordedBy": row.get::<_, Option<String>>(8)?,
            "createdAt": row.get::<_, String>(9)?,
        }))
    })
    .and_then(|it| it.collect())
}

fn handle_fees_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = match load_rows(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // The running total covers every matched row, not just the visible page.
    let (mut result, matched) = filtered_rows(req, rows, SEARCH_FIELDS);
    let total = filter::aggregate(&matched, |r| filter::numeric_field(r, "amount"));
    result.insert("totalAmount".into(), json!(total));

    ok(&req.id, Value::Object(result))
}

fn handle_fees_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let recorded_by = match require_session(state, req) {
        Ok(s) => s.display_name.clone(),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let month = match required_str(req, "month") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(amount) = req.params.get("amount").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing amount", None);
    };
    if amount < 0.0 {
        return err(&req.id, "bad_params", "amount must not be negative", None);
    }

    let student_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if student_exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let status = req
        .params
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unpaid")
        .to_string();

    // Campus comes from workspace settings, never from the request payload.
    let campus = match db::settings_get_json(conn, "campus.profile") {
        Ok(v) => v.and_then(|p| p.get("name").and_then(|n| n.as_str()).map(String::from)),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    let fee_id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO fees(id, student_id, amount, month, status, campus, recorded_by, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &fee_id,
            &student_id,
            amount,
            &month,
            &status,
            &campus,
            &recorded_by,
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "fees" })),
        );
    }

    ok(
        &req.id,
        json!({ "feeId": fee_id, "recordedBy": recorded_by, "campus": campus }),
    )
}

fn handle_fees_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let fee_id = match required_str(req, "feeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = req.params.get("patch").cloned().unwrap_or(Value::Null);

    match apply_patch(conn, req, "fees", &fee_id, PATCH_COLUMNS, &patch) {
        Ok(0) => err(&req.id, "not_found", "fee entry not found", None),
        Ok(_) => ok(&req.id, json!({ "feeId": fee_id })),
        Err(e) => e,
    }
}

fn handle_fees_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let fee_id = match required_str(req, "feeId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute("DELETE FROM fees WHERE id = ?", [&fee_id]) {
        Ok(0) => err(&req.id, "not_found", "fee entry not found", None),
        Ok(_) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.list" => Some(handle_fees_list(state, req)),
        "fees.create" => Some(handle_fees_create(state, req)),
        "fees.update" => Some(handle_fees_update(state, req)),
        "fees.delete" => Some(handle_fees_delete(state, req)),
        _ => None,
    }
}
