use serde::Serialize;
use serde_json::{Number, Value};

use crate::filter::error::FilterError;

/// Binding kind of a placeholder, as the query layer should declare it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

/// A value bound to one placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundParam {
    pub value: ParamValue,
    #[serde(rename = "type")]
    pub kind: ParamKind,
}

impl BoundParam {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: ParamValue::Str(value.into()),
            kind: ParamKind::String,
        }
    }

    pub fn integer(value: i64) -> Self {
        Self {
            value: ParamValue::Int(value),
            kind: ParamKind::Integer,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            value: ParamValue::Bool(value),
            kind: ParamKind::Boolean,
        }
    }

    pub fn null() -> Self {
        Self {
            value: ParamValue::Null,
            kind: ParamKind::Null,
        }
    }

    /// Rebinds the value as a LIKE pattern: stringified, `*` rewritten to `%`.
    pub fn into_pattern(self) -> Self {
        let text = match self.value {
            ParamValue::Str(text) => text,
            ParamValue::Int(number) => number.to_string(),
            ParamValue::Bool(true) => "1".to_string(),
            ParamValue::Bool(false) | ParamValue::Null => String::new(),
        };
        Self::string(text.replace('*', "%"))
    }
}

/// Declared type of a condition value. Unknown names fall back to `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Null,
}

impl ValueType {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "interger" => ValueType::Integer,
            "float" | "double" | "real" => ValueType::Float,
            "bool" | "boolean" => ValueType::Boolean,
            "null" | "nil" => ValueType::Null,
            _ => ValueType::String,
        }
    }
}

/// Converts a raw condition value to the declared type.
///
/// Floats are bound as their string form so the database, not this process,
/// decides precision.
pub fn coerce(field: &str, value: &Value, ty: ValueType) -> Result<BoundParam, FilterError> {
    if ty == ValueType::Null {
        return Ok(BoundParam::null());
    }
    if matches!(value, Value::Array(_) | Value::Object(_)) {
        return Err(FilterError::UnsupportedValue(field.to_string()));
    }

    let param = match ty {
        ValueType::String | ValueType::Float => BoundParam::string(to_text(value)),
        ValueType::Integer => BoundParam::integer(to_integer(value)),
        ValueType::Boolean => BoundParam::boolean(to_boolean(value)),
        ValueType::Null => BoundParam::null(),
    };
    Ok(param)
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number_text(number),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) | Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn number_text(number: &Number) -> String {
    match number.as_f64() {
        Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e15 => {
            format!("{}", float as i64)
        }
        _ => number.to_string(),
    }
}

fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(saturating_trunc))
            .unwrap_or(0),
        Value::String(text) => parse_integer_prefix(text),
        Value::Bool(flag) => i64::from(*flag),
        _ => 0,
    }
}

fn saturating_trunc(float: f64) -> i64 {
    if float.is_nan() { 0 } else { float.trunc() as i64 }
}

/// Numeric strings convert whole (`"2.9"` is 2, `"1e3"` is 1000); otherwise
/// the leading integer is taken (`"12abc"` is 12) and anything else is 0.
fn parse_integer_prefix(text: &str) -> i64 {
    let text = text.trim_start();
    if let Ok(number) = text.trim_end().parse::<i64>() {
        return number;
    }
    if let Ok(float) = text.trim_end().parse::<f64>() {
        if float.is_finite() {
            return saturating_trunc(float);
        }
    }

    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return 0;
    }
    text[..end].parse::<i64>().unwrap_or_else(|_| {
        if text.starts_with('-') { i64::MIN } else { i64::MAX }
    })
}

fn to_boolean(value: &Value) -> bool {
    match value {
        Value::String(text) => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" | "y" | "t" => true,
            "false" | "0" | "off" | "no" | "n" | "f" | "" => false,
            _ => true,
        },
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|float| float != 0.0),
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
