//! Bridge - the instance facade
//!
//! Ties the pieces together:
//! - Connection lifecycle (configure, teardown, stale-attempt guard)
//! - Bootstrap of the device feature areas
//! - Push dispatch into host variables
//! - Action execution and feedback evaluation

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{BridgeConfig, ConfigError};
use crate::features::{Action, Catalog, Feedback, Features};
use crate::host::{Host, InstanceStatus};
use crate::sync::{ConnectionManager, SessionContext, SharedRegistry, SubscriptionRegistry, SyncError};
use crate::transport::Connector;

/// One bridge instance mirroring one mixer into one host
#[derive(Clone)]
pub struct Bridge {
    manager: ConnectionManager,
    features: Arc<Features>,
}

impl Bridge {
    pub fn new(connector: Arc<dyn Connector>, host: Arc<dyn Host>) -> Self {
        let features = Arc::new(Features::new());
        let manager = ConnectionManager::new(
            connector,
            host,
            SubscriptionRegistry::shared(),
            features.clone(),
        );
        Self { manager, features }
    }

    /// Apply a configuration, starting a fresh connection attempt
    pub fn configure(&self, config: BridgeConfig) -> Result<JoinHandle<()>, ConfigError> {
        self.manager.configure(config)
    }

    /// Invalidate the current attempt and close the session
    pub async fn teardown(&self) {
        self.manager.teardown().await;
    }

    /// Run an action, reporting failures through the instance status
    pub async fn execute(&self, action: Action) -> Result<(), SyncError> {
        let cx = self.context(action.id())?;
        let result = self.features.execute(&cx, action).await;
        report_failure(&cx, &result);
        result
    }

    /// Mirror an arbitrary path into a generic variable
    pub async fn watch_generic(&self, path: &str, variable: Option<u32>) -> Result<(), SyncError> {
        let cx = self.context("generic_action")?;
        let result = self.features.watch_generic(&cx, path, variable).await;
        report_failure(&cx, &result);
        result
    }

    pub fn evaluate(&self, feedback: &Feedback) -> bool {
        self.features.evaluate(self.manager.host().as_ref(), feedback)
    }

    pub fn catalog(&self) -> Catalog {
        self.features.catalog()
    }

    pub fn registry(&self) -> SharedRegistry {
        self.manager.registry()
    }

    pub fn current_attempt(&self) -> u64 {
        self.manager.current_attempt()
    }

    fn context(&self, what: &str) -> Result<SessionContext, SyncError> {
        self.manager.session_context().ok_or_else(|| {
            warn!("{} ignored: not connected", what);
            SyncError::NotConnected
        })
    }
}

fn report_failure(cx: &SessionContext, result: &Result<(), SyncError>) {
    let Err(error) = result else {
        return;
    };

    match error {
        SyncError::Stale => debug!("action outcome dropped, attempt superseded"),
        SyncError::InvalidOptions(message) => {
            warn!("Invalid action options: {}", message);
            cx.report(InstanceStatus::BadConfig, message.clone());
        }
        other => {
            warn!("Action failed: {}", other);
            cx.report(InstanceStatus::UnknownError, other.to_string());
        }
    }
}
