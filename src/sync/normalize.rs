//! Payload normalization
//!
//! The Control API encodes the same logical value in more than one way
//! depending on the endpoint and API version: a bare scalar (`true`, `42`)
//! or an object wrapper (`{"value": 42}`). Range parameters expose their
//! bounds as `_min`/`_max`/`_step` or as `min`/`max`/`step`.
//!
//! Everything here is pure and fails closed: anything outside the accepted
//! encodings yields `None` and the caller drops it.

use serde_json::{Map, Number, Value};

/// Expected kind of a mirrored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Number,
    Text,
    /// Raw mirror, any non-null payload is forwarded unchanged
    Any,
}

/// A normalized scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    Text(String),
    Raw(Value),
}

impl Scalar {
    /// Convert back into a JSON value for the variable store
    pub fn into_value(self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Number(n) => Value::Number(n),
            Scalar::Text(s) => Value::String(s),
            Scalar::Raw(v) => v,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Bounded numeric parameter (gain, pot)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeParam {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Normalize a payload to a scalar of the expected kind
///
/// Accepts the bare scalar or an object whose only field is `value`.
pub fn normalize_scalar(payload: &Value, kind: ValueKind) -> Option<Scalar> {
    if kind == ValueKind::Any {
        return match payload {
            Value::Null => None,
            other => Some(Scalar::Raw(other.clone())),
        };
    }

    if let Some(scalar) = scalar_of_kind(payload, kind) {
        return Some(scalar);
    }

    match payload {
        Value::Object(map) if map.len() == 1 => {
            map.get("value").and_then(|inner| scalar_of_kind(inner, kind))
        }
        _ => None,
    }
}

fn scalar_of_kind(value: &Value, kind: ValueKind) -> Option<Scalar> {
    match (kind, value) {
        (ValueKind::Boolean, Value::Bool(b)) => Some(Scalar::Bool(*b)),
        (ValueKind::Number, Value::Number(n)) => Some(Scalar::Number(n.clone())),
        (ValueKind::Text, Value::String(s)) => Some(Scalar::Text(s.clone())),
        _ => None,
    }
}

/// Normalize a bounded numeric parameter
///
/// All four fields must be present and numeric. Bounds may use either the
/// underscore or the bare naming; the underscore form wins when both exist.
pub fn normalize_range(payload: &Value) -> Option<RangeParam> {
    let map = payload.as_object()?;

    Some(RangeParam {
        value: map.get("value")?.as_f64()?,
        min: field_either(map, "_min", "min")?,
        max: field_either(map, "_max", "max")?,
        step: field_either(map, "_step", "step")?,
    })
}

fn field_either(map: &Map<String, Value>, prefixed: &str, bare: &str) -> Option<f64> {
    map.get(prefixed)
        .or_else(|| map.get(bare))
        .and_then(Value::as_f64)
}

/// Coerce a user-typed value before sending it to the device
///
/// Numbers first (integers stay integral), then `true`/`false`, else text.
pub fn coerce_input(raw: &str) -> Value {
    let trimmed = raw.trim();

    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            if let Some(n) = Number::from_f64(float) {
                return Value::Number(n);
            }
        }
    }

    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
