use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, require_session, required_str};
use crate::ipc::types::{AppState, Request};
use crate::shape;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

/// Bulk ingest of payloads exported from the old REST backend. The body can
/// be a bare array or wrapped under `data`/`items`/the entity name; rows
/// missing required fields are counted as skipped, never a hard failure.
struct ImportCounts {
    imported: usize,
    skipped: usize,
}

fn numeric(record: &Value, field: &str) -> Option<f64> {
    match record.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn import_students(conn: &Connection, rows: &[Value]) -> anyhow::Result<ImportCounts> {
    let mut counts = ImportCounts {
        imported: 0,
        skipped: 0,
    };
    let created_at = chrono::Utc::now().to_rfc3339();
    for row in rows {
        let Some(name) = shape::required_text(row, "name") else {
            counts.skipped += 1;
            continue;
        };
        let active = row.get("active").and_then(|v| v.as_bool()).unwrap_or(true);
        conn.execute(
            "INSERT INTO students(id, name, father_name, class_name, section, roll_no,
                                  phone, admission_date, active, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &name,
                shape::optional_text(row, "fatherName"),
                shape::optional_text(row, "className"),
                shape::optional_text(row, "section"),
                shape::optional_text(row, "rollNo"),
                shape::optional_text(row, "phone"),
                shape::optional_text(row, "admissionDate"),
                active as i64,
                &created_at,
            ),
        )?;
        counts.imported += 1;
    }
    Ok(counts)
}

fn import_fees(conn: &Connection, rows: &[Value], recorded_by: &str) -> anyhow::Result<ImportCounts> {
    let mut counts = ImportCounts {
        imported: 0,
        skipped: 0,
    };
    let created_at = chrono::Utc::now().to_rfc3339();
    for row in rows {
        let (Some(student_id), Some(month), Some(amount)) = (
            shape::required_text(row, "studentId"),
            shape::required_text(row, "month"),
            numeric(row, "amount"),
        ) else {
            counts.skipped += 1;
            continue;
        };
        let known: Option<i64> = conn
            .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
                r.get(0)
            })
            .optional()?;
        if known.is_none() {
            counts.skipped += 1;
            continue;
        }
        let status = shape::optional_text(row, "status").unwrap_or_else(|| "unpaid".to_string());
        conn.execute(
            "INSERT INTO fees(id, student_id, amount, month, status, campus, recorded_by, created_at)
             VALUES(?, ?, ?, ?, ?, NULL, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &student_id,
                amount,
                &month,
                &status,
                recorded_by,
                &created_at,
            ),
        )?;
        counts.imported += 1;
    }
    Ok(counts)
}

fn import_exams(conn: &Connection, rows: &[Value]) -> anyhow::Result<ImportCounts> {
    let mut counts = ImportCounts {
        imported: 0,
        skipped: 0,
    };
    for row in rows {
        let Some(title) = shape::required_text(row, "title") else {
            counts.skipped += 1;
            continue;
        };
        conn.execute(
            "INSERT INTO exams(id, title, class_name, subject, exam_date, total_marks)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &title,
                shape::optional_text(row, "className"),
                shape::optional_text(row, "subject"),
                shape::optional_text(row, "examDate"),
                numeric(row, "totalMarks"),
            ),
        )?;
        counts.imported += 1;
    }
    Ok(counts)
}

fn import_courses(conn: &Connection, rows: &[Value]) -> anyhow::Result<ImportCounts> {
    let mut counts = ImportCounts {
        imported: 0,
        skipped: 0,
    };
    for row in rows {
        let (Some(code), Some(title)) = (
            shape::required_text(row, "code"),
            shape::required_text(row, "title"),
        ) else {
            counts.skipped += 1;
            continue;
        };
        conn.execute(
            "INSERT INTO courses(id, code, title, credit_hours, department_id)
             VALUES(?, ?, ?, ?, NULL)",
            (
                Uuid::new_v4().to_string(),
                &code,
                &title,
                numeric(row, "creditHours").map(|v| v as i64),
            ),
        )?;
        counts.imported += 1;
    }
    Ok(counts)
}

fn import_programs(conn: &Connection, rows: &[Value]) -> anyhow::Result<ImportCounts> {
    let mut counts = ImportCounts {
        imported: 0,
        skipped: 0,
    };
    for row in rows {
        let Some(name) = shape::required_text(row, "name") else {
            counts.skipped += 1;
            continue;
        };
        conn.execute(
            "INSERT INTO programs(id, name, duration_years, department_id)
             VALUES(?, ?, ?, NULL)",
            (
                Uuid::new_v4().to_string(),
                &name,
                numeric(row, "durationYears").map(|v| v as i64),
            ),
        )?;
        counts.imported += 1;
    }
    Ok(counts)
}

fn import_departments(conn: &Connection, rows: &[Value]) -> anyhow::Result<ImportCounts> {
    let mut counts = ImportCounts {
        imported: 0,
        skipped: 0,
    };
    for row in rows {
        let Some(name) = shape::required_text(row, "name") else {
            counts.skipped += 1;
            continue;
        };
        // Department names are unique; duplicates in the payload are skips.
        let changed = conn.execute(
            "INSERT OR IGNORE INTO departments(id, name, head) VALUES(?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &name,
                shape::optional_text(row, "head"),
            ),
        )?;
        if changed == 0 {
            counts.skipped += 1;
        } else {
            counts.imported += 1;
        }
    }
    Ok(counts)
}

fn import_staff(conn: &Connection, rows: &[Value]) -> anyhow::Result<ImportCounts> {
    let mut counts = ImportCounts {
        imported: 0,
        skipped: 0,
    };
    for row in rows {
        let (Some(staff_name), Some(role)) = (
            shape::required_text(row, "staffName"),
            shape::required_text(row, "role"),
        ) else {
            counts.skipped += 1;
            continue;
        };
        conn.execute(
            "INSERT INTO staff_assignments(id, staff_name, role, department_id, course_id)
             VALUES(?, ?, ?, NULL, NULL)",
            (Uuid::new_v4().to_string(), &staff_name, &role),
        )?;
        counts.imported += 1;
    }
    Ok(counts)
}

fn handle_records_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let recorded_by = match require_session(state, req) {
        Ok(s) => s.display_name.clone(),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entity = match required_str(req, "entity") {
        Ok(v) => v.to_lowercase(),
        Err(e) => return e,
    };
    let Some(payload) = req.params.get("payload") else {
        return err(&req.id, "bad_params", "missing payload", None);
    };

    let rows = shape::extract_records(payload, &[&entity]);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let counts = match entity.as_str() {
        "students" => import_students(&tx, &rows),
        "fees" => import_fees(&tx, &rows, &recorded_by),
        "exams" => import_exams(&tx, &rows),
        "courses" => import_courses(&tx, &rows),
        "programs" => import_programs(&tx, &rows),
        "departments" => import_departments(&tx, &rows),
        "staff" => import_staff(&tx, &rows),
        other => {
            let _ = tx.rollback();
            return err(
                &req.id,
                "bad_params",
                format!("unknown entity: {}", other),
                None,
            );
        }
    };

    match counts {
        Ok(counts) => {
            if let Err(e) = tx.commit() {
                return err(&req.id, "db_commit_failed", e.to_string(), None);
            }
            ok(
                &req.id,
                json!({ "imported": counts.imported, "skipped": counts.skipped }),
            )
        }
        Err(e) => {
            let _ = tx.rollback();
            err(&req.id, "db_insert_failed", format!("{e:?}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.import" => Some(handle_records_import(state, req)),
        _ => None,
    }
}
