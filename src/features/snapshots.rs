//! Snapshots
//!
//! Lists are discovered per mixer and snapshot type through
//! `getsnapshotlist`; loading goes through `loadsnapshot`.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::channels::{fader_path, Channel};
use super::{parse_payload, Schema};
use crate::sync::{Binding, SessionContext, SyncError, ValueKind};

pub const MIXERS_PATH: &str = "audio/mixers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SnapshotType {
    Channel = 1,
    Mixer = 2,
    Processing = 3,
}

impl SnapshotType {
    pub const ALL: [SnapshotType; 3] = [
        SnapshotType::Channel,
        SnapshotType::Mixer,
        SnapshotType::Processing,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SnapshotType::Channel => "Channel Snapshot",
            SnapshotType::Mixer => "Mixer Snapshot",
            SnapshotType::Processing => "Processing Snapshot",
        }
    }
}

impl TryFrom<u8> for SnapshotType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SnapshotType::Channel),
            2 => Ok(SnapshotType::Mixer),
            3 => Ok(SnapshotType::Processing),
            other => Err(format!("unknown snapshot type {}", other)),
        }
    }
}

impl From<SnapshotType> for u8 {
    fn from(kind: SnapshotType) -> Self {
        kind as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RawSnapshotRef {
    name: String,
    id: Value,
}

impl RawSnapshotRef {
    fn into_ref(self) -> SnapshotRef {
        let id = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        SnapshotRef { id, name: self.name }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotListPayload {
    #[serde(default)]
    result: Vec<RawSnapshotRef>,
}

/// Non-empty snapshot lists keyed by mixer and type
#[derive(Debug, Clone, Default)]
pub struct SnapshotIndex {
    lists: BTreeMap<(String, SnapshotType), Vec<SnapshotRef>>,
}

impl SnapshotIndex {
    pub fn insert(&mut self, mixer: &str, kind: SnapshotType, snapshots: Vec<SnapshotRef>) {
        if snapshots.is_empty() {
            return;
        }
        self.lists.insert((mixer.to_string(), kind), snapshots);
    }

    pub fn list(&self, mixer: &str, kind: SnapshotType) -> &[SnapshotRef] {
        self.lists
            .get(&(mixer.to_string(), kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn label(&self, mixer: &str, kind: SnapshotType, id: &str) -> Option<&str> {
        self.list(mixer, kind)
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
    }

    /// Number of non-empty lists
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

pub fn variable(fader: &str) -> String {
    format!("ch_snap_loaded_{}", fader)
}

pub async fn fetch(cx: &SessionContext) -> Result<SnapshotIndex, SyncError> {
    let payload = cx.get(MIXERS_PATH).await?;
    let mixers: BTreeMap<String, IgnoredAny> = parse_payload(MIXERS_PATH, payload)?;

    let mut index = SnapshotIndex::default();
    for mixer in mixers.into_keys() {
        let Ok(mixer_number) = mixer.parse::<u32>() else {
            debug!("Skipping mixer with non-numeric id {}", mixer);
            continue;
        };

        for kind in SnapshotType::ALL {
            let response = cx
                .rpc(
                    "getsnapshotlist",
                    json!({"type": u8::from(kind), "mixer": mixer_number}),
                )
                .await?;
            let list: SnapshotListPayload = parse_payload("getsnapshotlist", response)?;
            index.insert(
                &mixer,
                kind,
                list.result.into_iter().map(RawSnapshotRef::into_ref).collect(),
            );
        }
    }

    Ok(index)
}

pub async fn install(
    cx: &SessionContext,
    channels: &BTreeMap<String, Channel>,
    schema: &mut Schema,
) -> Result<(), SyncError> {
    for (id, channel) in channels {
        schema.variable(variable(id), format!("Ch Snapshot Loaded {}", channel.label));
        cx.mirror(
            &fader_path(id, "_lastloadedsnap"),
            Binding::new(variable(id), ValueKind::Text),
        )
        .await?;
    }
    Ok(())
}

/// Load a snapshot; channel snapshots need a target fader
///
/// `label` is the snapshot's catalog name, the id is stored when unknown.
pub async fn load(
    cx: &SessionContext,
    mixer: u32,
    kind: SnapshotType,
    id: &str,
    fader: Option<&str>,
    label: Option<String>,
) -> Result<(), SyncError> {
    if id.is_empty() {
        return Err(SyncError::InvalidOptions("options is missing".to_string()));
    }

    let mut params = json!({"type": u8::from(kind), "mixer": mixer, "id": id});
    let fader = match kind {
        SnapshotType::Channel => {
            let fader = fader
                .and_then(|f| f.trim().parse::<u32>().ok())
                .ok_or_else(|| SyncError::InvalidOptions("options is missing".to_string()))?;
            params["fader"] = json!(fader);
            Some(fader)
        }
        _ => None,
    };

    debug!("Loading {} {} on mixer {}", kind.label(), id, mixer);
    cx.rpc("loadsnapshot", params).await?;

    if let Some(fader) = fader {
        let label = label.unwrap_or_else(|| id.to_string());
        cx.publish(HashMap::from([(
            variable(&fader.to_string()),
            Value::String(label),
        )]))?;
    }
    Ok(())
}
