//! Response normalizer
//!
//! The backend's result envelope is not contractually fixed. This is the one
//! place that decides how a payload maps onto a [`DisplayResponse`]:
//!
//! 1. Payload has a truthy `type` → it is the canonical response
//! 2. Else truthy `answer` → normalize that sub-value
//! 3. Else truthy `response` → normalize that sub-value
//! 4. Else → text response holding the JSON serialization of the payload
//!
//! Truthy means anything but `null`, `false`, `0` and `""`; objects and
//! arrays are truthy even when empty. First match wins. The function is
//! total: every payload yields a response.

use crate::models::DisplayResponse;
use serde_json::Value;

/// Map an arbitrarily-shaped payload onto the canonical display model
pub fn normalize(payload: &Value) -> DisplayResponse {
    if truthy_field(payload, "type").is_some() {
        return DisplayResponse::from_canonical(payload);
    }
    if let Some(inner) = truthy_field(payload, "answer") {
        return normalize(inner);
    }
    if let Some(inner) = truthy_field(payload, "response") {
        return normalize(inner);
    }
    DisplayResponse::text(payload.to_string())
}

fn truthy_field<'a>(payload: &'a Value, field: &str) -> Option<&'a Value> {
    payload.get(field).filter(|v| is_truthy(v))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
