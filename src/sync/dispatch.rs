//! Push notification dispatch
//!
//! A notification is a partial snapshot. Every bound path is resolved
//! against it; whatever resolves and normalizes is written to the host in a
//! single batch, followed by one feedback recompute.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use super::lifecycle::AttemptToken;
use super::normalize::normalize_scalar;
use super::registry::{SharedRegistry, SubscriptionRegistry};
use crate::host::Host;
use crate::transport::{PushHandler, PushNotification};

/// Routes notifications into host variables
#[derive(Clone)]
pub struct Dispatcher {
    registry: SharedRegistry,
    host: Arc<dyn Host>,
}

impl Dispatcher {
    pub fn new(registry: SharedRegistry, host: Arc<dyn Host>) -> Self {
        Self { registry, host }
    }

    /// Apply one notification, returning the number of variables written
    ///
    /// Zero writes means no recompute either.
    pub fn dispatch(&self, payload: &Value) -> usize {
        let updates = {
            let registry = self.registry.read();
            collect_updates(&registry, payload)
        };

        if updates.is_empty() {
            trace!("notification touched no bound path");
            return 0;
        }

        let written = updates.len();
        self.host.set_values(updates);
        self.host.recompute_feedback();
        written
    }

    /// Build a push handler bound to `token`
    ///
    /// Notifications arriving after the attempt is superseded are dropped;
    /// a transition waits for a dispatch already writing.
    pub fn handler(&self, token: AttemptToken) -> PushHandler {
        let dispatcher = self.clone();
        Arc::new(move |notification: PushNotification| {
            let path = notification.path.as_deref().unwrap_or("/");
            match token.with_current(|| dispatcher.dispatch(&notification.payload)) {
                Ok(written) => trace!(path, written, "notification dispatched"),
                Err(_) => trace!(path, "dropping notification from superseded attempt #{}", token.id()),
            }
        })
    }
}

/// Resolve and normalize every bound path against a snapshot
pub fn collect_updates(registry: &SubscriptionRegistry, payload: &Value) -> HashMap<String, Value> {
    let mut updates = HashMap::new();

    for (path, bindings) in registry.iter() {
        let Some(found) = path.resolve(payload) else {
            continue;
        };

        for binding in bindings {
            let Some(scalar) = normalize_scalar(found, binding.kind) else {
                trace!(path = %path, variable = binding.variable.as_str(), "payload did not normalize");
                continue;
            };
            if let Some(value) = binding.apply(scalar.into_value()) {
                updates.insert(binding.variable.clone(), value);
            }
        }
    }

    updates
}
