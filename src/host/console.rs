//! Console host - keeps variables in memory and logs every change
//!
//! Used by the binary when no control surface is attached, and by tests
//! to observe what the bridge published.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::{ActionDefinition, Host, InstanceStatus, VariableDefinition};

/// ConsoleHost stores variables in memory and logs through `tracing`
#[derive(Default)]
pub struct ConsoleHost {
    values: RwLock<HashMap<String, Value>>,
    status_history: RwLock<Vec<(InstanceStatus, Option<String>)>>,
    variable_definitions: RwLock<Vec<VariableDefinition>>,
    action_definitions: RwLock<Vec<ActionDefinition>>,
    /// Number of feedback recompute requests
    recompute_count: AtomicU64,
    /// Number of `set_values` calls
    write_count: AtomicU64,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reported status
    pub fn status(&self) -> Option<(InstanceStatus, Option<String>)> {
        self.status_history.read().last().cloned()
    }

    pub fn status_history(&self) -> Vec<(InstanceStatus, Option<String>)> {
        self.status_history.read().clone()
    }

    pub fn recompute_count(&self) -> u64 {
        self.recompute_count.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    pub fn variable_definitions(&self) -> Vec<VariableDefinition> {
        self.variable_definitions.read().clone()
    }

    pub fn action_definitions(&self) -> Vec<ActionDefinition> {
        self.action_definitions.read().clone()
    }
}

impl Host for ConsoleHost {
    fn set_values(&self, values: HashMap<String, Value>) {
        if values.is_empty() {
            return;
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);

        for (name, value) in &values {
            debug!(variable = name.as_str(), value = %value, "variable updated");
        }
        self.values.write().extend(values);
    }

    fn get_value(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    fn set_status(&self, status: InstanceStatus, detail: Option<String>) {
        match (&status, &detail) {
            (InstanceStatus::Ok | InstanceStatus::Connecting, _) => {
                info!("Status: {}", status)
            }
            (_, Some(detail)) => warn!("Status: {} ({})", status, detail),
            (_, None) => warn!("Status: {}", status),
        }
        self.status_history.write().push((status, detail));
    }

    fn recompute_feedback(&self) {
        self.recompute_count.fetch_add(1, Ordering::SeqCst);
    }

    fn set_variable_definitions(&self, definitions: Vec<VariableDefinition>) {
        info!("🔧 {} variables defined", definitions.len());
        *self.variable_definitions.write() = definitions;
    }

    fn set_action_definitions(&self, definitions: Vec<ActionDefinition>) {
        info!("🔧 {} actions defined", definitions.len());
        *self.action_definitions.write() = definitions;
    }
}
