//! Feedback evaluation
//!
//! Feedbacks are pure reads of the host's variable store (plus the routing
//! catalog for `routing_value`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::selectors::{self, Routing};
use super::{channels, logics, truthy};
use crate::host::Host;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "feedback", rename_all = "snake_case")]
pub enum Feedback {
    ChannelFaderValue { fader: String },
    FaderPfl { fader: String },
    Logic { logic: String },
    RoutingValue { selector: String, entry: String },
}

impl Feedback {
    pub fn id(&self) -> &'static str {
        match self {
            Feedback::ChannelFaderValue { .. } => "channel_fader_value",
            Feedback::FaderPfl { .. } => "fader_pfl",
            Feedback::Logic { .. } => "logic",
            Feedback::RoutingValue { .. } => "routing_value",
        }
    }

    pub fn evaluate(&self, host: &dyn Host, routing: &Routing) -> bool {
        match self {
            Feedback::ChannelFaderValue { fader } => {
                truthy(host.get_value(&channels::on_variable(fader)).as_ref())
            }
            Feedback::FaderPfl { fader } => {
                truthy(host.get_value(&channels::pfl_variable(fader)).as_ref())
            }
            // strict: a logic is lit only by a real `true`
            Feedback::Logic { logic } => {
                host.get_value(&logics::variable(logic)) == Some(Value::Bool(true))
            }
            Feedback::RoutingValue { selector, entry } => {
                let Some(source) = routing.find_source(selector, entry) else {
                    return false;
                };
                let expected = selectors::routing_string(&source.left, &source.right);
                host.get_value(&selectors::variable(selector)) == Some(Value::String(expected))
            }
        }
    }
}
