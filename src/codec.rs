//! Numeric/array coercion for engine wire text
//!
//! Engine replies carry values as plain text. [`decode`] turns that text into
//! a typed [`Value`]: a `;` anywhere splits the text into a sequence whose
//! elements are decoded recursively, otherwise the text becomes an integer,
//! a float, or stays as it is. Decoding never fails.
//!
//! Data-comm telemetry uses a narrower rule ([`decode_datacomm_field`]):
//! a `;` splits the field into a flat sequence, and each scalar is a float
//! when numeric and text otherwise. Integers never appear in data-comm.

use crate::types::Value;

/// Decode wire text into a scalar or nested sequence
pub fn decode(text: &str) -> Value {
    if text.is_empty() {
        return Value::Text(String::new());
    }

    if text.contains(';') {
        return Value::Seq(text.split(';').map(decode).collect());
    }

    let trimmed = text.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        Value::Int(v)
    } else if let Ok(v) = trimmed.parse::<f64>() {
        Value::Float(v)
    } else {
        Value::Text(text.to_string())
    }
}

/// Decode optional wire text, treating absence as empty text
pub fn decode_opt(text: Option<&str>) -> Value {
    text.map(decode).unwrap_or_default()
}

/// Decode one data-comm field
///
/// `1;2.5;x` becomes a sequence of float-or-text elements; a field without
/// `;` is a single float-or-text scalar.
pub fn decode_datacomm_field(text: &str) -> Value {
    if text.contains(';') {
        return Value::Seq(text.split(';').map(datacomm_scalar).collect());
    }
    datacomm_scalar(text)
}

fn datacomm_scalar(text: &str) -> Value {
    match text.trim().parse::<f64>() {
        Ok(v) => Value::Float(v),
        Err(_) => Value::Text(text.to_string()),
    }
}

/// Wire spelling of a value, as used in write requests
pub fn encode(value: &Value) -> String {
    value.to_string()
}
