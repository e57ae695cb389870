//! Channel faders: on/off, PFL, level and analog gain

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::actions::{Direction, SwitchMode};
use super::{parse_payload, switch, tolerate, Schema};
use crate::sync::{normalize_range, Binding, SessionContext, SyncError, ValueKind};

pub const MIXER_PATH: &str = "/audio/mixers/0";

pub const LEVEL_MIN: f64 = -160.0;
pub const LEVEL_MAX: f64 = 10.0;

/// A fader channel of mixer 0
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub label: String,
    pub fader: f64,
    pub on: bool,
    pub pfl1: bool,
    pub pfl2: bool,
    pub has_again: bool,
}

#[derive(Debug, Deserialize)]
struct MixerPayload {
    faders: BTreeMap<String, RawChannel>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    label: String,
    fader: f64,
    on: bool,
    pfl1: bool,
    pfl2: bool,
    #[serde(rename = "_hasagain", default)]
    has_again: bool,
    #[serde(default)]
    params: Option<RawParams>,
}

#[derive(Debug, Deserialize)]
struct RawParams {
    #[serde(default)]
    gain: Option<RawGain>,
}

#[derive(Debug, Deserialize)]
struct RawGain {
    #[serde(rename = "_hasagain", default)]
    has_again: bool,
}

impl From<RawChannel> for Channel {
    fn from(raw: RawChannel) -> Self {
        // the gain block is authoritative when present
        let has_again = raw
            .params
            .and_then(|p| p.gain)
            .map(|g| g.has_again)
            .unwrap_or(raw.has_again);

        Self {
            label: raw.label,
            fader: raw.fader,
            on: raw.on,
            pfl1: raw.pfl1,
            pfl2: raw.pfl2,
            has_again,
        }
    }
}

pub fn fader_path(fader: &str, leaf: &str) -> String {
    format!("{}/faders/{}/{}", MIXER_PATH, fader, leaf)
}

pub fn again_path(fader: &str) -> String {
    fader_path(fader, "params/gain/again")
}

pub fn on_variable(fader: &str) -> String {
    format!("channel_fader_{}", fader)
}

pub fn pfl_variable(fader: &str) -> String {
    format!("fader_pfl_{}", fader)
}

/// `fader_again_{field}_{fader}` for field in min/max/step/value
pub fn again_variable(field: &str, fader: &str) -> String {
    format!("fader_again_{}_{}", field, fader)
}

pub async fn fetch(cx: &SessionContext) -> Result<BTreeMap<String, Channel>, SyncError> {
    let payload = cx.get(MIXER_PATH).await?;
    let mixer: MixerPayload = parse_payload(MIXER_PATH, payload)?;

    Ok(mixer
        .faders
        .into_iter()
        .map(|(id, raw)| (id, Channel::from(raw)))
        .collect())
}

/// Declare and mirror every channel
///
/// Each initial value is written before its binding goes live, so a push
/// arriving during bootstrap is never overwritten by the fetched catalog.
pub async fn install(
    cx: &SessionContext,
    channels: &BTreeMap<String, Channel>,
    schema: &mut Schema,
) -> Result<(), SyncError> {
    for (id, channel) in channels {
        schema.variable(on_variable(id), &channel.label);
        schema.variable(pfl_variable(id), &channel.label);

        cx.mirror_initial(
            &fader_path(id, "on"),
            Binding::new(on_variable(id), ValueKind::Boolean),
            Some(Value::Bool(channel.on)),
        )
        .await?;
        cx.mirror_initial(
            &fader_path(id, "pfl1"),
            Binding::new(pfl_variable(id), ValueKind::Boolean),
            Some(Value::Bool(channel.pfl1)),
        )
        .await?;
    }

    for (id, channel) in channels.iter().filter(|(_, c)| c.has_again) {
        for (field, name) in [("min", "Min"), ("max", "Max"), ("value", "Value"), ("step", "Step")] {
            schema.variable(
                again_variable(field, id),
                format!("Fader {} AGain {}", channel.label, name),
            );
        }

        let path = again_path(id);
        let mut value = None;
        if let Some(payload) = tolerate(cx.get(&path).await, "AGain range")? {
            match normalize_range(&payload) {
                Some(range) => {
                    // bounds are not mirrored, only the value follows pushes
                    cx.publish(HashMap::from([
                        (again_variable("min", id), json!(range.min)),
                        (again_variable("max", id), json!(range.max)),
                        (again_variable("step", id), json!(range.step)),
                    ]))?;
                    value = Some(json!(range.value));
                }
                None => warn!("Unexpected payload at {}", path),
            }
        }

        cx.mirror_initial(
            &format!("{}/value", path),
            Binding::new(again_variable("value", id), ValueKind::Number),
            value,
        )
        .await?;
    }

    Ok(())
}

pub async fn set_on(cx: &SessionContext, fader: &str, mode: SwitchMode) -> Result<(), SyncError> {
    switch(cx, &fader_path(fader, "on"), &on_variable(fader), mode).await
}

pub async fn set_pfl(cx: &SessionContext, fader: &str, mode: SwitchMode) -> Result<(), SyncError> {
    switch(cx, &fader_path(fader, "pfl1"), &pfl_variable(fader), mode).await
}

pub async fn set_level(cx: &SessionContext, fader: &str, level: f64) -> Result<(), SyncError> {
    if !(LEVEL_MIN..=LEVEL_MAX).contains(&level) {
        return Err(SyncError::InvalidOptions(format!(
            "Fader level {} outside {}..{}",
            level, LEVEL_MIN, LEVEL_MAX
        )));
    }
    cx.set(&fader_path(fader, "fader"), json!(level)).await?;
    Ok(())
}

/// Step the analog gain by one step; no-op at the bound or before the
/// range is known
pub async fn adjust_again(
    cx: &SessionContext,
    fader: &str,
    direction: Direction,
) -> Result<(), SyncError> {
    let read = |field: &str| {
        cx.host
            .get_value(&again_variable(field, fader))
            .and_then(|v| v.as_f64())
    };

    let (Some(value), Some(min), Some(max), Some(step)) =
        (read("value"), read("min"), read("max"), read("step"))
    else {
        debug!("AGain range of fader {} unknown, ignoring", fader);
        return Ok(());
    };

    let at_bound = match direction {
        Direction::Down => value <= min,
        Direction::Up => value >= max,
    };
    if at_bound {
        return Ok(());
    }

    cx.set(&format!("{}/inc", again_path(fader)), json!(direction.sign() * step))
        .await?;
    Ok(())
}
