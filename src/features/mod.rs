//! Device feature areas
//!
//! Each area fetches its catalog from the mixer during bootstrap, declares
//! its variables, binds the paths it mirrors and exposes its actions. The
//! catalogs are kept for action validation and feedback evaluation.

pub mod actions;
pub mod channels;
pub mod feedback;
pub mod generic;
pub mod logics;
pub mod pots;
pub mod selectors;
pub mod snapshots;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub use actions::{Action, Direction, SwitchMode};
pub use channels::Channel;
pub use feedback::Feedback;
pub use generic::GenericMirrors;
pub use logics::Logic;
pub use pots::Pot;
pub use selectors::{Routing, Selector, Source, Sourcelist};
pub use snapshots::{SnapshotIndex, SnapshotRef, SnapshotType};

use crate::config::BridgeConfig;
use crate::host::{ActionDefinition, Host, VariableDefinition};
use crate::sync::{normalize_scalar, Bootstrap, SessionContext, SyncError, ValueKind};

/// Device catalogs discovered at bootstrap
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub channels: BTreeMap<String, Channel>,
    pub pots: BTreeMap<String, Pot>,
    pub routing: Routing,
    pub snapshots: SnapshotIndex,
    pub logics: BTreeMap<String, Logic>,
    pub generic_count: u32,
}

/// Variable and action definitions collected during bootstrap
#[derive(Debug, Default)]
pub struct Schema {
    pub variables: Vec<VariableDefinition>,
    pub actions: Vec<ActionDefinition>,
}

impl Schema {
    pub fn variable(&mut self, variable_id: impl Into<String>, name: impl Into<String>) {
        self.variables.push(VariableDefinition::new(variable_id, name));
    }

    pub fn action(&mut self, action: &str, name: &str) {
        self.actions.push(ActionDefinition::new(action, name));
    }
}

/// Feature state shared by bootstrap, actions and feedback
#[derive(Default)]
pub struct Features {
    catalog: RwLock<Catalog>,
    generic: GenericMirrors,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog.read().clone()
    }

    pub fn generic(&self) -> &GenericMirrors {
        &self.generic
    }

    /// Run one action against the current session
    pub async fn execute(&self, cx: &SessionContext, action: Action) -> Result<(), SyncError> {
        debug!("Executing {}", action.id());

        match action {
            Action::ChannelOnOff { fader, mode } => channels::set_on(cx, &fader, mode).await,
            Action::FaderPfl { fader, mode } => channels::set_pfl(cx, &fader, mode).await,
            Action::FaderLevel { fader, level } => channels::set_level(cx, &fader, level).await,
            Action::FaderAgainAdjust { fader, direction } => {
                channels::adjust_again(cx, &fader, direction).await
            }
            Action::PotValueAdjust { pot, direction, step } => {
                let known = self.catalog.read().pots.get(&pot).cloned();
                pots::adjust(cx, &pot, known, direction, step).await
            }
            Action::Routing { selector, entry } => {
                let source = self
                    .catalog
                    .read()
                    .routing
                    .find_source(&selector, &entry)
                    .cloned();
                selectors::route(cx, &selector, source).await
            }
            Action::Snapshot { mixer, kind, id, fader } => {
                let label = self
                    .catalog
                    .read()
                    .snapshots
                    .label(&mixer.to_string(), kind, &id)
                    .map(str::to_string);
                snapshots::load(cx, mixer, kind, &id, fader.as_deref(), label).await
            }
            Action::Logic { logic, mode } => logics::set(cx, &logic, mode).await,
            Action::GenericAction { path, value, readonly, variable } => {
                let count = self.catalog.read().generic_count;
                generic::execute(cx, count, &path, &value, readonly, variable).await
            }
        }
    }

    /// Start mirroring an arbitrary path into a generic variable
    pub async fn watch_generic(
        &self,
        cx: &SessionContext,
        path: &str,
        variable: Option<u32>,
    ) -> Result<(), SyncError> {
        let count = self.catalog.read().generic_count;
        self.generic.watch(cx, count, path, variable).await
    }

    /// Evaluate a feedback against the host's current variables
    pub fn evaluate(&self, host: &dyn Host, feedback: &Feedback) -> bool {
        feedback.evaluate(host, &self.catalog.read().routing)
    }
}

#[async_trait]
impl Bootstrap for Features {
    async fn run(&self, cx: &SessionContext, config: &BridgeConfig) -> Result<(), SyncError> {
        let mut schema = Schema::default();

        let channels = tolerate(channels::fetch(cx).await, "Channel list")?.unwrap_or_default();
        let pots = tolerate(pots::fetch(cx).await, "Pot list")?.unwrap_or_default();

        if !channels.is_empty() {
            channels::install(cx, &channels, &mut schema).await?;
        }
        if !pots.is_empty() {
            pots::install(cx, &pots, &mut schema).await?;
        }

        let routing = selectors::fetch(cx).await?;
        selectors::install(cx, &routing, &mut schema).await?;

        let snapshots = snapshots::fetch(cx).await?;
        snapshots::install(cx, &channels, &mut schema).await?;

        let logics = logics::fetch(cx).await?;
        logics::install(cx, &logics, &mut schema).await?;

        generic::install(config.generic_actions_num, &mut schema);
        Action::declare(&mut schema);

        cx.token.with_current(|| {
            info!(
                "📋 Catalog: {} channels, {} pots, {} selectors, {} logics, {} snapshot lists",
                channels.len(),
                pots.len(),
                routing.selectors.len(),
                logics.len(),
                snapshots.len()
            );

            *self.catalog.write() = Catalog {
                channels,
                pots,
                routing,
                snapshots,
                logics,
                generic_count: config.generic_actions_num,
            };
            cx.host.set_variable_definitions(schema.variables);
            cx.host.set_action_definitions(schema.actions);
        })?;
        Ok(())
    }
}

/// Turn a non-stale failure into `None` so bootstrap can skip the area
pub(crate) fn tolerate<T>(result: Result<T, SyncError>, what: &str) -> Result<Option<T>, SyncError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SyncError::Stale) => Err(SyncError::Stale),
        Err(e) => {
            warn!("{} unavailable: {}", what, e);
            Ok(None)
        }
    }
}

/// Deserialize a device payload, reporting the path on mismatch
pub(crate) fn parse_payload<T: DeserializeOwned>(path: &str, payload: Value) -> Result<T, SyncError> {
    serde_json::from_value(payload).map_err(|e| SyncError::payload(path, e))
}

/// Loose truthiness of a stored variable
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Set a boolean path per `mode` and store the acknowledged value
pub(crate) async fn switch(
    cx: &SessionContext,
    path: &str,
    variable: &str,
    mode: SwitchMode,
) -> Result<(), SyncError> {
    let current = truthy(cx.host.get_value(variable).as_ref());
    let next = mode.next(current);

    let ack = cx.set(path, Value::Bool(next)).await?;
    let confirmed = normalize_scalar(&ack, ValueKind::Boolean)
        .and_then(|s| s.as_bool())
        .ok_or_else(|| SyncError::payload(path, "expected a boolean"))?;

    cx.publish(HashMap::from([(variable.to_string(), Value::Bool(confirmed))]))
}
