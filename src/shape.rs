use serde_json::Value;

/// Wrapper keys the old backend used interchangeably around row arrays.
const COMMON_WRAPPER_KEYS: &[&str] = &["data", "items"];

/// Unwrap an upstream JSON body into its row array. Accepts a bare array or
/// an object wrapping one under `data`, `items`, or a caller-supplied
/// domain key (`students`, `fees`, ...). Only object elements survive;
/// anything unrecognizable degrades to an empty vec, never an error.
pub fn extract_records(payload: &Value, domain_keys: &[&str]) -> Vec<Value> {
    let array = match payload {
        Value::Array(rows) => Some(rows),
        Value::Object(map) => COMMON_WRAPPER_KEYS
            .iter()
            .chain(domain_keys.iter())
            .find_map(|key| map.get(*key).and_then(|v| v.as_array())),
        _ => None,
    };

    match array {
        Some(rows) => rows.iter().filter(|r| r.is_object()).cloned().collect(),
        None => Vec::new(),
    }
}

/// A trimmed, non-empty string field, or None. Import rows missing one of
/// their required fields are skipped rather than inserted half-formed.
pub fn required_text(record: &Value, field: &str) -> Option<String> {
    let s = record.get(field)?.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    Some(s.to_string())
}

/// Optional string field; absent, null, and blank all collapse to None.
pub fn optional_text(record: &Value, field: &str) -> Option<String> {
    required_text(record, field)
}
