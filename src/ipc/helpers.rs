use crate::grid::GridError;
use crate::ipc::error::err;
use serde_json::json;
use uuid::Uuid;

/// Handler-level failure carried up to the wire error object.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn db_query(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<GridError> for HandlerErr {
    fn from(e: GridError) -> Self {
        let code = match e.code.as_str() {
            "overlap" => "overlap",
            "invalid_split" => "invalid_split",
            "no_selection" => "no_selection",
            "occupied" => "occupied",
            "not_found" => "not_found",
            _ => "bad_params",
        };
        HandlerErr {
            code,
            message: e.message,
            details: e.details,
        }
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Accepts a JSON number or a numeric string; anything else is a
/// user-visible validation error.
pub fn required_number(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    if let Some(n) = v.as_f64() {
        return Ok(n);
    }
    if let Some(s) = v.as_str() {
        if let Ok(n) = s.trim().parse::<f64>() {
            return Ok(n);
        }
    }
    Err(HandlerErr::bad_params(format!("{} must be numeric", key)).with_key(key))
}

impl HandlerErr {
    fn with_key(mut self, key: &str) -> Self {
        self.details = Some(json!({ "field": key }));
        self
    }
}

pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// The sheet date: an explicit `date` param, or the current local date.
pub fn param_date(params: &serde_json::Value) -> String {
    optional_str(params, "date").unwrap_or_else(today)
}

pub fn now_ts() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Rejects empty, placeholder (":sectionId") and non-uuid identifiers
/// before any data fetch is attempted.
pub fn validate_id_param(value: &str, what: &str) -> Result<(), HandlerErr> {
    if value.is_empty() || value.starts_with(':') || Uuid::parse_str(value).is_err() {
        return Err(HandlerErr::bad_params(format!("invalid {} id", what)));
    }
    Ok(())
}
