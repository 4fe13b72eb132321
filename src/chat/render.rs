//! Turns the `result` field of a question response into a typed
//! reply for the selected response mode.
//!
//! Everything here is pure: the dispatcher validates the payload
//! with these functions before anything reaches a surface, so a
//! surface never has to deal with loosely typed JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::ChatError;
use super::models::ResponseMode;

/// Id the backend gives the chart container in every chart fragment
pub const CHART_PLACEHOLDER_ID: &str = "chart_div";

static CONTAINER_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"(?i)\bid\s*=\s*["']{}["']"#, CHART_PLACEHOLDER_ID)).unwrap()
});
static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap());
static SRC_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Table(Table),
    Chart(ChartFragment),
    /// The backend answered but had nothing to show
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Display headers, one per key
    pub headers: Vec<String>,
    /// Record keys in the order of the first record
    pub keys: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartFragment {
    /// Unique id the container was rewritten to
    pub container_id: String,
    /// Chart markup with scripts stripped out
    pub markup: String,
    /// Scripts in document order, already pointing at `container_id`
    pub scripts: Vec<ChartScript>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartScript {
    External { src: String },
    Inline { source: String },
}

/// Classify a successful response body for `mode`.
pub fn parse_reply(mode: ResponseMode, body: &Value) -> Result<Reply, ChatError> {
    let result = match body.get("result") {
        Some(result) if has_content(result) => result,
        _ => return Ok(Reply::Empty),
    };

    match mode {
        ResponseMode::Text => Ok(Reply::Text(render_text(result))),
        ResponseMode::Table => render_table(result).map(Reply::Table),
        ResponseMode::Chart => render_chart(result).map(Reply::Chart),
    }
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

pub fn render_text(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a table from a list of uniform records. Columns come from
/// the first record; values missing from later records render as
/// empty cells.
pub fn render_table(result: &Value) -> Result<Table, ChatError> {
    // Some backends send the records as a JSON encoded string
    let decoded;
    let result = if let Value::String(s) = result {
        decoded = serde_json::from_str::<Value>(s).map_err(|e| {
            ChatError::MalformedResponse(format!("Table result is not JSON: {}", e))
        })?;
        &decoded
    } else {
        result
    };

    let records = result
        .as_array()
        .ok_or_else(|| ChatError::MalformedResponse("Expected a list of records".to_string()))?;

    let Some(first) = records.first() else {
        return Ok(Table::default());
    };
    let keys: Vec<String> = as_record(first)?.keys().cloned().collect();
    let headers = keys.iter().map(|k| format_header(k.as_str())).collect();

    let rows = records
        .iter()
        .map(|record| {
            let record = as_record(record)?;
            Ok(keys.iter().map(|k| format_cell(record.get(k))).collect())
        })
        .collect::<Result<Vec<Vec<String>>, ChatError>>()?;

    Ok(Table {
        headers,
        keys,
        rows,
    })
}

fn as_record(value: &Value) -> Result<&Map<String, Value>, ChatError> {
    value
        .as_object()
        .ok_or_else(|| ChatError::MalformedResponse(format!("Expected a record, got: {}", value)))
}

/// `order_total` -> `Order total`
pub fn format_header(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Rewrite a chart fragment so its container and scripts use a
/// freshly generated id. Two charts on the same page never share a
/// container id.
pub fn render_chart(result: &Value) -> Result<ChartFragment, ChatError> {
    let html = result
        .as_str()
        .ok_or_else(|| ChatError::MalformedResponse("Chart result is not markup".to_string()))?;

    if !CONTAINER_ID_RE.is_match(html) {
        return Err(ChatError::MalformedResponse(format!(
            "Chart markup has no `{}` container",
            CHART_PLACEHOLDER_ID
        )));
    }

    let container_id = format!("chart_{}", Uuid::new_v4().simple());
    let replacement = format!(r#"id="{}""#, container_id);
    let html = CONTAINER_ID_RE.replace(html, replacement.as_str());

    let scripts = SCRIPT_RE
        .captures_iter(&html)
        .map(|caps| {
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            match SRC_ATTR_RE.captures(attrs).and_then(|c| c.get(1)) {
                Some(src) => ChartScript::External {
                    src: src.as_str().to_string(),
                },
                None => ChartScript::Inline {
                    source: caps
                        .get(2)
                        .map_or("", |m| m.as_str())
                        .replace(CHART_PLACEHOLDER_ID, &container_id),
                },
            }
        })
        .collect();

    let markup = SCRIPT_RE.replace_all(&html, "").trim().to_string();

    Ok(ChartFragment {
        container_id,
        markup,
        scripts,
    })
}
