//! Pots (rotary parameters under `/audio/pots`)

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};

use super::actions::Direction;
use super::Schema;
use crate::sync::{normalize_scalar, Binding, SessionContext, SyncError, ValueKind};

pub const POTS_PATH: &str = "/audio/pots";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pot {
    #[serde(rename = "_name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: f64,
    #[serde(rename = "_min")]
    pub min: f64,
    #[serde(rename = "_max")]
    pub max: f64,
}

impl Pot {
    /// Ordered bounds; devices may report `_min > _max`
    pub fn bounds(&self) -> (f64, f64) {
        (self.min.min(self.max), self.min.max(self.max))
    }

    pub fn clamp(&self, value: f64) -> f64 {
        let (low, high) = self.bounds();
        value.clamp(low, high)
    }
}

pub fn value_path(pot: &str) -> String {
    format!("{}/{}/value", POTS_PATH, pot)
}

pub fn variable(pot: &str) -> String {
    format!("pot_value_{}", pot)
}

/// Extract supported pots from either `{pots: {..}}` or the bare record
///
/// Entries without numeric `value`, `_min` and `_max` are skipped.
pub fn parse_catalog(payload: &Value) -> BTreeMap<String, Pot> {
    let empty = Map::new();
    let record = match payload.get("pots") {
        Some(Value::Object(nested)) => nested,
        _ => payload.as_object().unwrap_or(&empty),
    };

    record
        .iter()
        .filter_map(|(id, candidate)| {
            Pot::deserialize(candidate)
                .ok()
                .map(|pot| (id.clone(), pot))
        })
        .collect()
}

pub async fn fetch(cx: &SessionContext) -> Result<BTreeMap<String, Pot>, SyncError> {
    let payload = cx.get(POTS_PATH).await?;
    Ok(parse_catalog(&payload))
}

pub async fn install(
    cx: &SessionContext,
    pots: &BTreeMap<String, Pot>,
    schema: &mut Schema,
) -> Result<(), SyncError> {
    for (id, pot) in pots {
        schema.variable(variable(id), pot.name.as_deref().unwrap_or(id.as_str()));
        cx.mirror_initial(
            &value_path(id),
            Binding::new(variable(id), ValueKind::Number),
            Some(json!(pot.value)),
        )
        .await?;
    }
    Ok(())
}

/// Move a pot by `step`, clamped to its range
///
/// The current value is re-read from the device rather than trusted from
/// the variable store.
pub async fn adjust(
    cx: &SessionContext,
    id: &str,
    pot: Option<Pot>,
    direction: Direction,
    step: f64,
) -> Result<(), SyncError> {
    let pot = pot.ok_or_else(|| SyncError::InvalidOptions(format!("Unknown pot: {}", id)))?;
    if !step.is_finite() || step <= 0.0 {
        return Err(SyncError::InvalidOptions("Invalid step value".to_string()));
    }

    let path = value_path(id);
    let current = cx.get(&path).await?;
    let current = normalize_scalar(&current, ValueKind::Number)
        .and_then(|s| s.as_f64())
        .ok_or_else(|| SyncError::payload(&path, "expected a number"))?;

    let next = pot.clamp(current + direction.sign() * step);
    let ack = cx.set(&path, json!(next)).await?;

    match normalize_scalar(&ack, ValueKind::Number) {
        Some(value) => cx.publish(HashMap::from([(variable(id), value.into_value())])),
        None => Ok(()),
    }
}
