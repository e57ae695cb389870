//! Host surface collaborators
//!
//! The host owns the variable store, shows the instance status and
//! recomputes button feedback. The bridge only talks to it through [`Host`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub mod console;

pub use console::ConsoleHost;

/// Instance status shown by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Connecting,
    Ok,
    BadConfig,
    ConnectionFailure,
    UnknownError,
    Disconnected,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InstanceStatus::Connecting => "connecting",
            InstanceStatus::Ok => "ok",
            InstanceStatus::BadConfig => "bad_config",
            InstanceStatus::ConnectionFailure => "connection_failure",
            InstanceStatus::UnknownError => "unknown_error",
            InstanceStatus::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

/// A variable exposed to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableDefinition {
    pub variable_id: String,
    pub name: String,
}

impl VariableDefinition {
    pub fn new(variable_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            variable_id: variable_id.into(),
            name: name.into(),
        }
    }
}

/// An action offered to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDefinition {
    pub action_id: String,
    pub name: String,
}

impl ActionDefinition {
    pub fn new(action_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            name: name.into(),
        }
    }
}

/// Host surface trait
///
/// All methods take `&self`; implementations use interior mutability.
/// `get_value` must observe every `set_values` made before it.
pub trait Host: Send + Sync {
    fn set_values(&self, values: HashMap<String, Value>);

    fn get_value(&self, name: &str) -> Option<Value>;

    fn set_status(&self, status: InstanceStatus, detail: Option<String>);

    /// Ask the host to re-evaluate state-dependent feedback
    fn recompute_feedback(&self);

    fn set_variable_definitions(&self, definitions: Vec<VariableDefinition>);

    fn set_action_definitions(&self, definitions: Vec<ActionDefinition>);
}
