//! Generic path mirror
//!
//! `generic-action-{n}` variables can mirror any device path. Each variable
//! follows at most one path; watching a new path moves the binding.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::Schema;
use crate::sync::{coerce_input, Binding, SessionContext, SyncError, ValueKind};

pub fn variable(index: u32) -> String {
    format!("generic-action-{}", index)
}

fn options_missing() -> SyncError {
    SyncError::InvalidOptions("options is missing".to_string())
}

fn target(index: u32, count: u32) -> Result<String, SyncError> {
    if index == 0 || index > count {
        return Err(SyncError::InvalidOptions(format!(
            "generic variable {} outside 1..={}",
            index, count
        )));
    }
    Ok(variable(index))
}

pub fn install(count: u32, schema: &mut Schema) {
    for index in 1..=count {
        schema.variable(variable(index), format!("Generic Action {}", index));
    }
}

/// Write a user-typed value to an arbitrary path
///
/// The acknowledged payload lands in the chosen variable.
pub async fn execute(
    cx: &SessionContext,
    count: u32,
    path: &str,
    value: &str,
    readonly: bool,
    variable: Option<u32>,
) -> Result<(), SyncError> {
    if readonly {
        return Ok(());
    }
    if path.trim().is_empty() || value.is_empty() {
        return Err(options_missing());
    }
    let target = variable.map(|index| target(index, count)).transpose()?;

    let ack = cx.set(path, coerce_input(value)).await?;

    match target {
        Some(name) => cx.publish(HashMap::from([(name, ack)])),
        None => Ok(()),
    }
}

/// Live generic bindings, variable -> path
#[derive(Debug, Default)]
pub struct GenericMirrors {
    live: Mutex<HashMap<String, String>>,
}

impl GenericMirrors {
    /// Subscribe to `path` and mirror it into `generic-action-{variable}`
    ///
    /// Without a variable the path is only subscribed.
    pub async fn watch(
        &self,
        cx: &SessionContext,
        count: u32,
        path: &str,
        variable: Option<u32>,
    ) -> Result<(), SyncError> {
        if path.trim().is_empty() {
            return Err(options_missing());
        }
        let Some(index) = variable else {
            return cx.subscribe(path).await;
        };
        let name = target(index, count)?;

        let initial: Value = cx.get(path).await?;

        cx.ensure_current()?;
        let previous = self.live.lock().insert(name.clone(), path.to_string());
        if let Some(previous) = previous.filter(|p| p != path) {
            debug!("{} moves from {} to {}", name, previous, path);
            cx.unmirror(&previous, &name)?;
        }

        cx.mirror_initial(path, Binding::new(name, ValueKind::Any), Some(initial))
            .await
    }
}
