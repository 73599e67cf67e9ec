use crate::filter;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request, Session};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde_json::{json, Map, Value};

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn optional_f64(req: &Request, key: &str) -> Option<f64> {
    req.params.get(key).and_then(|v| v.as_f64())
}

pub fn optional_i64(req: &Request, key: &str) -> Option<i64> {
    req.params.get(key).and_then(|v| v.as_i64())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Mutating methods run under an explicit session; there is no ambient
/// identity to fall back on.
pub fn require_session<'a>(state: &'a AppState, req: &Request) -> Result<&'a Session, Value> {
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_session", "log in first", None))
}

/// Run the shared list pipeline: filter by the request's query/column against
/// the family's search-field whitelist, paginate when asked, echo `seq`.
/// Returns the result object plus the full matched set so callers can add
/// aggregates computed over all matches, not just the visible page.
pub fn filtered_rows(
    req: &Request,
    rows: Vec<Value>,
    search_fields: &[&str],
) -> (Map<String, Value>, Vec<Value>) {
    let config = filter::parse_filter_config(&req.params);
    let filtered = filter::filter(&rows, &config, search_fields);

    let mut result = Map::new();
    result.insert("totalInput".into(), json!(filtered.total_input));
    result.insert("totalMatched".into(), json!(filtered.total_matched));

    match filter::parse_page_config(&req.params) {
        Some(page_config) => {
            let page = filter::paginate(&filtered.matched, &page_config);
            result.insert("rows".into(), Value::Array(page.slice));
            result.insert("pageIndex".into(), json!(page.page_index));
            result.insert("pageCount".into(), json!(page.page_count));
        }
        None => {
            result.insert("rows".into(), Value::Array(filtered.matched.clone()));
        }
    }

    if let Some(seq) = req.params.get("seq").and_then(|v| v.as_i64()) {
        result.insert("seq".into(), json!(seq));
    }

    (result, filtered.matched)
}

/// Apply a `patch` object to one row. `allowed` maps JSON keys to columns;
/// unknown keys are ignored so a stale client can't write arbitrary columns.
/// Returns the number of rows updated (0 means the id didn't exist).
pub fn apply_patch(
    conn: &Connection,
    req: &Request,
    table: &str,
    row_id: &str,
    allowed: &[(&str, &str)],
    patch: &Value,
) -> Result<usize, Value> {
    let Some(patch) = patch.as_object() else {
        return Err(err(&req.id, "bad_params", "patch must be an object", None));
    };

    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    for (key, column) in allowed {
        let Some(v) = patch.get(*key) else { continue };
        let sql_value = match v {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(*b as i64),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("patch.{} must be a scalar", key),
                    None,
                ));
            }
        };
        sets.push(format!("{} = ?", column));
        values.push(sql_value);
    }

    if sets.is_empty() {
        return Err(err(&req.id, "bad_params", "empty patch", None));
    }

    values.push(SqlValue::Text(row_id.to_string()));
    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, sets.join(", "));
    conn.execute(&sql, params_from_iter(values))
        .map_err(|e| err(&req.id, "db_update_failed", e.to_string(), None))
}
