//! Host-triggered actions

use serde::{Deserialize, Serialize};

use super::snapshots::SnapshotType;
use super::Schema;

/// How a boolean action picks the next value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchMode {
    #[default]
    Toggle,
    On,
    Off,
}

impl SwitchMode {
    pub fn next(self, current: bool) -> bool {
        match self {
            SwitchMode::Toggle => !current,
            SwitchMode::On => true,
            SwitchMode::Off => false,
        }
    }
}

/// Rotary direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Up,
    Down,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

fn default_pot_step() -> f64 {
    1.0
}

/// An action with its options
///
/// Deserializes from `{"action": "<id>", ...options}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    ChannelOnOff {
        fader: String,
        #[serde(default)]
        mode: SwitchMode,
    },
    FaderPfl {
        fader: String,
        #[serde(default)]
        mode: SwitchMode,
    },
    FaderLevel {
        fader: String,
        level: f64,
    },
    FaderAgainAdjust {
        fader: String,
        #[serde(default)]
        direction: Direction,
    },
    PotValueAdjust {
        pot: String,
        #[serde(default)]
        direction: Direction,
        #[serde(default = "default_pot_step")]
        step: f64,
    },
    Routing {
        selector: String,
        entry: String,
    },
    Snapshot {
        mixer: u32,
        #[serde(rename = "type")]
        kind: SnapshotType,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fader: Option<String>,
    },
    Logic {
        logic: String,
        #[serde(default)]
        mode: SwitchMode,
    },
    GenericAction {
        path: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        readonly: bool,
        /// Target `generic-action-{n}` variable, none to discard the response
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variable: Option<u32>,
    },
}

const DEFINITIONS: &[(&str, &str)] = &[
    ("channel_on_off", "Channel On/Off"),
    ("fader_pfl", "Fader Pfl"),
    ("fader_level", "Fader Level"),
    ("fader_again_adjust", "Fader AGain (Rotary)"),
    ("pot_value_adjust", "Pot Value (Rotary)"),
    ("routing", "Routing"),
    ("snapshot", "Snapshot"),
    ("logic", "Logic"),
    ("generic_action", "Generic Action"),
];

impl Action {
    pub fn id(&self) -> &'static str {
        match self {
            Action::ChannelOnOff { .. } => "channel_on_off",
            Action::FaderPfl { .. } => "fader_pfl",
            Action::FaderLevel { .. } => "fader_level",
            Action::FaderAgainAdjust { .. } => "fader_again_adjust",
            Action::PotValueAdjust { .. } => "pot_value_adjust",
            Action::Routing { .. } => "routing",
            Action::Snapshot { .. } => "snapshot",
            Action::Logic { .. } => "logic",
            Action::GenericAction { .. } => "generic_action",
        }
    }

    /// Register every action with the schema
    pub fn declare(schema: &mut Schema) {
        for (id, name) in DEFINITIONS {
            schema.action(id, name);
        }
    }
}
