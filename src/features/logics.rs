//! Control logics

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::actions::SwitchMode;
use super::{parse_payload, switch, Schema};
use crate::sync::{Binding, SessionContext, SyncError, ValueKind};

pub const LOGICS_PATH: &str = "/control/logics";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logic {
    pub value: bool,
    #[serde(rename = "_name")]
    pub name: String,
    #[serde(rename = "_path", default)]
    pub path: String,
}

pub fn value_path(logic: &str) -> String {
    format!("{}/{}/value", LOGICS_PATH, logic)
}

pub fn variable(logic: &str) -> String {
    format!("logic_{}", logic)
}

pub async fn fetch(cx: &SessionContext) -> Result<BTreeMap<String, Logic>, SyncError> {
    let payload = cx.get(LOGICS_PATH).await?;
    parse_payload(LOGICS_PATH, payload)
}

pub async fn install(
    cx: &SessionContext,
    logics: &BTreeMap<String, Logic>,
    schema: &mut Schema,
) -> Result<(), SyncError> {
    for (id, logic) in logics {
        schema.variable(variable(id), &logic.name);
        cx.mirror_initial(
            &value_path(id),
            Binding::new(variable(id), ValueKind::Boolean),
            Some(Value::Bool(logic.value)),
        )
        .await?;
    }
    Ok(())
}

pub async fn set(cx: &SessionContext, logic: &str, mode: SwitchMode) -> Result<(), SyncError> {
    switch(cx, &value_path(logic), &variable(logic), mode).await
}
