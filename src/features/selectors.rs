//! Selector routing
//!
//! A selector routes one entry of its sourcelist to a left/right pair. The
//! variable holds the routing as a compact JSON string so feedback can
//! compare it with a plain equality.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use super::{parse_payload, Schema};
use crate::sync::{Binding, SessionContext, SyncError, ValueKind};
use crate::transport::TransportError;

pub const SELECTORS_PATH: &str = "/audio/selectors";

/// Sourcelist id marking a selector without sources
const NO_SOURCELIST: &str = "0";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Selector {
    #[serde(rename = "_name")]
    pub name: String,
    #[serde(rename = "_sourcelist")]
    pub sourcelist: String,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Source {
    #[serde(rename = "_label")]
    pub label: String,
    #[serde(rename = "_sourcel")]
    pub left: String,
    #[serde(rename = "_sourcer")]
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sourcelist {
    #[serde(rename = "_name")]
    pub name: String,
    #[serde(default)]
    pub entries: BTreeMap<String, Source>,
}

/// Selectors and their sourcelists
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Routing {
    #[serde(default)]
    pub selectors: BTreeMap<String, Selector>,
    #[serde(default)]
    pub sourcelists: BTreeMap<String, Sourcelist>,
}

impl Routing {
    /// Entry `entry` of the sourcelist feeding `selector`
    pub fn find_source(&self, selector: &str, entry: &str) -> Option<&Source> {
        let selector = self.selectors.get(selector)?;
        self.sourcelists
            .get(&selector.sourcelist)?
            .entries
            .get(entry)
    }
}

pub fn selector_path(selector: &str) -> String {
    format!("{}/selectors/{}", SELECTORS_PATH, selector)
}

pub fn variable(selector: &str) -> String {
    format!("routing_{}", selector)
}

/// Compact `{"left":..,"right":..}` string stored in the variable
pub fn routing_string(left: &str, right: &str) -> String {
    json!({"left": left, "right": right}).to_string()
}

/// Decoder for selector updates
pub fn decode_routing(value: Value) -> Option<Value> {
    let left = value.get("left")?.as_str()?;
    let right = value.get("right")?.as_str()?;
    Some(Value::String(routing_string(left, right)))
}

pub async fn fetch(cx: &SessionContext) -> Result<Routing, SyncError> {
    let payload = match cx.get(SELECTORS_PATH).await {
        Ok(payload) => payload,
        Err(SyncError::Transport(e @ TransportError::Api { .. })) => {
            warn!("Selectors unavailable: {}", e);
            return Ok(Routing::default());
        }
        Err(e) => return Err(e),
    };

    let mut routing: Routing = parse_payload(SELECTORS_PATH, payload)?;
    routing
        .selectors
        .retain(|_, selector| selector.sourcelist != NO_SOURCELIST);
    Ok(routing)
}

pub async fn install(
    cx: &SessionContext,
    routing: &Routing,
    schema: &mut Schema,
) -> Result<(), SyncError> {
    for (id, selector) in &routing.selectors {
        schema.variable(variable(id), &selector.name);
        cx.mirror_initial(
            &selector_path(id),
            Binding::new(variable(id), ValueKind::Any).with_decoder(Arc::new(decode_routing)),
            Some(Value::String(routing_string(&selector.left, &selector.right))),
        )
        .await?;
    }
    Ok(())
}

/// Route `source` to `selector`; the variable follows via the subscription
pub async fn route(
    cx: &SessionContext,
    selector: &str,
    source: Option<Source>,
) -> Result<(), SyncError> {
    let source = source.ok_or_else(|| SyncError::InvalidOptions("invalid selector".to_string()))?;

    cx.set(
        &selector_path(selector),
        json!({"left": source.left, "right": source.right}),
    )
    .await?;
    Ok(())
}
