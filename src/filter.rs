use serde_json::Value;

/// Which column a list query targets. `All` consults only the caller's
/// search-field whitelist, never every key on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelect {
    All,
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub query: String,
    pub column: ColumnSelect,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            query: String::new(),
            column: ColumnSelect::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    page_size: usize,
    pub page_index: usize,
}

impl PageConfig {
    /// `page_size` must be positive; a zero size has no meaningful page grid.
    pub fn new(page_size: usize, page_index: usize) -> Option<Self> {
        if page_size == 0 {
            return None;
        }
        Some(PageConfig {
            page_size,
            page_index,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    /// Matching records in their original relative order.
    pub matched: Vec<Value>,
    pub total_input: usize,
    pub total_matched: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub slice: Vec<Value>,
    pub page_index: usize,
    pub page_count: usize,
}

/// Parse `{ query, column }` out of request params. Absent params mean
/// "no filtering"; the literal `"all"` (any case) selects the whitelist.
pub fn parse_filter_config(params: &Value) -> FilterConfig {
    let query = params
        .get("query")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let column = match params.get("column").and_then(|v| v.as_str()) {
        None => ColumnSelect::All,
        Some(c) if c.eq_ignore_ascii_case("all") => ColumnSelect::All,
        Some(c) => ColumnSelect::Field(c.to_string()),
    };
    FilterConfig { query, column }
}

/// Parse `{ pageSize, pageIndex }` out of request params. A missing or
/// non-positive pageSize means the caller wants the whole result set.
pub fn parse_page_config(params: &Value) -> Option<PageConfig> {
    let size = params.get("pageSize").and_then(|v| v.as_u64())?;
    let index = params
        .get("pageIndex")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    PageConfig::new(size as usize, index as usize)
}

/// The text a field contributes to substring search, or None when the value
/// does not participate (booleans and nested structures are not searchable).
/// Null and missing fields degrade to the empty string so a record with a
/// hole in it is a non-match rather than an error.
fn searchable_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(_)) | Some(Value::Array(_)) | Some(Value::Object(_)) => None,
    }
}

fn field_matches(record: &Value, field: &str, needle_lower: &str) -> bool {
    match searchable_text(record.get(field)) {
        Some(text) => text.to_lowercase().contains(needle_lower),
        None => false,
    }
}

/// Filter `records` per `config`. Pure: same inputs, same output; input order
/// preserved; never errors. Records are JSON objects; anything else simply
/// has no fields and cannot match a non-empty query.
pub fn filter(records: &[Value], config: &FilterConfig, search_fields: &[&str]) -> FilterResult {
    let total_input = records.len();

    if config.query.is_empty() {
        return FilterResult {
            matched: records.to_vec(),
            total_input,
            total_matched: total_input,
        };
    }

    let needle = config.query.to_lowercase();
    let matched: Vec<Value> = records
        .iter()
        .filter(|record| match &config.column {
            ColumnSelect::All => search_fields
                .iter()
                .any(|f| field_matches(record, f, &needle)),
            ColumnSelect::Field(name) => field_matches(record, name, &needle),
        })
        .cloned()
        .collect();

    let total_matched = matched.len();
    FilterResult {
        matched,
        total_input,
        total_matched,
    }
}

/// Slice a matched set into one page. Out-of-range indexes clamp to the last
/// valid page; an empty set yields pageCount 0 and an empty slice.
pub fn paginate(matched: &[Value], page: &PageConfig) -> Page {
    let total = matched.len();
    let size = page.page_size();
    let page_count = total.div_ceil(size);
    let page_index = page.page_index.min(page_count.saturating_sub(1));

    let start = page_index * size;
    let end = (start + size).min(total);
    let slice = if start < end {
        matched[start..end].to_vec()
    } else {
        Vec::new()
    };

    Page {
        slice,
        page_index,
        page_count,
    }
}

/// Sum `selector` over the matched set. `aggregate(&[], f) == 0.0`.
pub fn aggregate<F>(matched: &[Value], selector: F) -> f64
where
    F: Fn(&Value) -> f64,
{
    matched.iter().map(selector).sum()
}

/// Selector for numeric columns: JSON numbers as-is, numeric strings parsed
/// (the upstream app stored amounts both ways), everything else 0.
pub fn numeric_field(record: &Value, field: &str) -> f64 {
    match record.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}
