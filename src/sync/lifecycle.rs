//! Connection lifecycle
//!
//! Every `configure` starts a new attempt and every `teardown` invalidates
//! the current one. Work started by an attempt carries an [`AttemptToken`]
//! and checks it after each await; once a newer attempt exists the token is
//! stale and the work stops without touching host state.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::dispatch::Dispatcher;
use super::error::SyncError;
use super::registry::{Binding, SharedRegistry};
use crate::config::{BridgeConfig, ConfigError};
use crate::host::{Host, InstanceStatus};
use crate::transport::{Connector, Session};

#[derive(Debug, Default)]
struct AttemptState {
    current: AtomicU64,
    /// Held for reading by guarded writes, for writing by transitions
    transition: RwLock<()>,
}

/// Monotonic attempt counter
#[derive(Debug, Clone, Default)]
pub struct AttemptCounter(Arc<AttemptState>);

impl AttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt, superseding all previous tokens
    ///
    /// Waits for guarded writes of the previous attempt to finish.
    pub fn advance(&self) -> AttemptToken {
        let _transition = self.0.transition.write();
        let id = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
        AttemptToken {
            id,
            state: self.0.clone(),
        }
    }

    /// Supersede the current attempt without starting a new one
    pub fn invalidate(&self) {
        let _transition = self.0.transition.write();
        self.0.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current_id(&self) -> u64 {
        self.0.current.load(Ordering::SeqCst)
    }
}

/// Identifies the attempt a piece of work belongs to
#[derive(Debug, Clone)]
pub struct AttemptToken {
    id: u64,
    state: Arc<AttemptState>,
}

impl AttemptToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.state.current.load(Ordering::SeqCst) == self.id
    }

    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }

    pub fn ensure_current(&self) -> Result<(), SyncError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(SyncError::Stale)
        }
    }

    /// Run `write` only while this attempt is current
    ///
    /// No attempt transition can happen between the check and the end of
    /// `write`, so `write` must not block on another transition.
    pub fn with_current<R>(&self, write: impl FnOnce() -> R) -> Result<R, SyncError> {
        let _transition = self.state.transition.read();
        self.ensure_current()?;
        Ok(write())
    }
}

/// Everything bootstrap and action code needs for one attempt
///
/// Each async helper checks the token after the transport call returns, so
/// a superseded attempt never reaches the host.
#[derive(Clone)]
pub struct SessionContext {
    pub session: Arc<dyn Session>,
    pub registry: SharedRegistry,
    pub host: Arc<dyn Host>,
    pub token: AttemptToken,
}

impl SessionContext {
    pub fn ensure_current(&self) -> Result<(), SyncError> {
        self.token.ensure_current()
    }

    pub async fn get(&self, path: &str) -> Result<Value, SyncError> {
        let result = self.session.get(path).await;
        self.ensure_current()?;
        Ok(result?)
    }

    pub async fn set(&self, path: &str, value: Value) -> Result<Value, SyncError> {
        let result = self.session.set(path, value).await;
        self.ensure_current()?;
        Ok(result?)
    }

    pub async fn rpc(&self, method: &str, params: Value) -> Result<Value, SyncError> {
        let result = self.session.rpc(method, params).await;
        self.ensure_current()?;
        Ok(result?)
    }

    pub async fn subscribe(&self, path: &str) -> Result<(), SyncError> {
        let result = self.session.subscribe(path).await;
        self.ensure_current()?;
        Ok(result?)
    }

    /// Bind `path` to a variable, then subscribe to it
    ///
    /// A rejected subscription keeps the binding; it is retried on the next
    /// session.
    pub async fn mirror(&self, path: &str, binding: Binding) -> Result<(), SyncError> {
        self.mirror_initial(path, binding, None).await
    }

    /// Like [`mirror`](Self::mirror), writing `initial` before the binding
    /// goes live
    ///
    /// Pushes dispatched after the bind always win over the initial value.
    pub async fn mirror_initial(
        &self,
        path: &str,
        binding: Binding,
        initial: Option<Value>,
    ) -> Result<(), SyncError> {
        self.token.with_current(|| {
            if let Some(value) = initial {
                self.host
                    .set_values(HashMap::from([(binding.variable.clone(), value)]));
                self.host.recompute_feedback();
            }
            self.registry.write().bind(path, binding);
        })?;

        match self.subscribe(path).await {
            Err(SyncError::Transport(e)) => {
                warn!("Subscribe to {} failed: {}", path, e);
                Ok(())
            }
            other => other,
        }
    }

    /// Remove a binding; the device subscription itself is left in place
    pub fn unmirror(&self, path: &str, variable: &str) -> Result<bool, SyncError> {
        self.token
            .with_current(|| self.registry.write().unbind(path, variable))
    }

    /// Write variables and recompute feedback once
    pub fn publish(&self, values: HashMap<String, Value>) -> Result<(), SyncError> {
        self.token.with_current(|| {
            if values.is_empty() {
                return;
            }
            self.host.set_values(values);
            self.host.recompute_feedback();
        })
    }

    /// Report a status while this attempt is current
    pub fn report(&self, status: InstanceStatus, detail: impl Into<String>) {
        let detail = detail.into();
        let _ = self
            .token
            .with_current(|| self.host.set_status(status, Some(detail)));
    }

    /// Re-subscribe every bound path on a fresh session
    pub async fn resubscribe_all(&self) -> Result<(), SyncError> {
        let paths = self.registry.read().paths();
        if paths.is_empty() {
            return Ok(());
        }

        debug!("Re-subscribing {} paths", paths.len());
        for path in paths {
            match self.subscribe(&path).await {
                Ok(()) => {}
                Err(SyncError::Stale) => return Err(SyncError::Stale),
                Err(e) => warn!("Re-subscribe to {} failed: {}", path, e),
            }
        }
        Ok(())
    }
}

/// Post-connect initialization (catalogs, bindings, definitions)
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn run(&self, cx: &SessionContext, config: &BridgeConfig) -> Result<(), SyncError>;
}

struct ActiveSession {
    token: AttemptToken,
    session: Arc<dyn Session>,
}

struct ManagerInner {
    connector: Arc<dyn Connector>,
    host: Arc<dyn Host>,
    bootstrap: Arc<dyn Bootstrap>,
    registry: SharedRegistry,
    dispatcher: Dispatcher,
    attempts: AttemptCounter,
    active: RwLock<Option<ActiveSession>>,
}

/// Owns the attempt counter and the current session
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        host: Arc<dyn Host>,
        registry: SharedRegistry,
        bootstrap: Arc<dyn Bootstrap>,
    ) -> Self {
        let dispatcher = Dispatcher::new(registry.clone(), host.clone());
        Self {
            inner: Arc::new(ManagerInner {
                connector,
                host,
                bootstrap,
                registry,
                dispatcher,
                attempts: AttemptCounter::new(),
                active: RwLock::new(None),
            }),
        }
    }

    /// Start a new connection attempt with `config`
    ///
    /// Invalid configuration reports `BadConfig` and starts nothing. Otherwise
    /// the previous session is shut down and the attempt runs in a spawned
    /// task whose handle is returned.
    pub fn configure(&self, config: BridgeConfig) -> Result<JoinHandle<()>, ConfigError> {
        if let Err(e) = config.validate() {
            warn!("Configuration rejected: {}", e);
            let previous = {
                let mut active = self.inner.active.write();
                self.inner.attempts.invalidate();
                active.take()
            };
            if let Some(previous) = previous {
                tokio::spawn(async move { previous.session.shutdown().await });
            }
            self.inner
                .host
                .set_status(InstanceStatus::BadConfig, Some(e.to_string()));
            return Err(e);
        }
        let settings = config.connect_settings()?;

        let (token, previous) = {
            let mut active = self.inner.active.write();
            let token = self.inner.attempts.advance();
            (token, active.take())
        };
        if let Some(previous) = previous {
            debug!("Closing session of attempt #{}", previous.token.id());
            tokio::spawn(async move { previous.session.shutdown().await });
        }

        info!("🎬 Connecting to {} (attempt #{})", settings.url(), token.id());
        self.inner.host.set_status(InstanceStatus::Connecting, None);

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            match inner.run_attempt(config, &token).await {
                Ok(()) => {}
                Err(SyncError::Stale) => trace!("attempt #{} superseded", token.id()),
                // status stays where the attempt left it
                Err(e) => error!("Unexpected init error: {}", e),
            }
        }))
    }

    /// Invalidate the current attempt and close its session
    pub async fn teardown(&self) {
        let previous = {
            let mut active = self.inner.active.write();
            self.inner.attempts.invalidate();
            active.take()
        };
        if let Some(previous) = previous {
            previous.session.shutdown().await;
        }
        self.inner.host.set_status(InstanceStatus::Disconnected, None);
        info!("Disconnected");
    }

    /// Context of the current attempt, if it has a session
    pub fn session_context(&self) -> Option<SessionContext> {
        let active = self.inner.active.read();
        let active = active.as_ref()?;
        if active.token.is_stale() {
            return None;
        }
        Some(SessionContext {
            session: active.session.clone(),
            registry: self.inner.registry.clone(),
            host: self.inner.host.clone(),
            token: active.token.clone(),
        })
    }

    pub fn current_attempt(&self) -> u64 {
        self.inner.attempts.current_id()
    }

    pub fn registry(&self) -> SharedRegistry {
        self.inner.registry.clone()
    }

    pub fn host(&self) -> Arc<dyn Host> {
        self.inner.host.clone()
    }
}

impl ManagerInner {
    async fn run_attempt(&self, config: BridgeConfig, token: &AttemptToken) -> Result<(), SyncError> {
        let settings = config.connect_settings()?;
        let push = self.dispatcher.handler(token.clone());
        let limit = config.connect_timeout();

        let session =
            match tokio::time::timeout(limit, self.connector.connect(&settings, push)).await {
                Ok(Ok(session)) => session,
                Ok(Err(e)) => {
                    let message = e.failure_message();
                    token.with_current(|| {
                        warn!("Connection failed: {}", message);
                        self.host
                            .set_status(InstanceStatus::ConnectionFailure, Some(message))
                    })?;
                    return Ok(());
                }
                Err(_) => {
                    let message = timeout_message(limit);
                    token.with_current(|| {
                        warn!("{}", message);
                        self.host
                            .set_status(InstanceStatus::ConnectionFailure, Some(message))
                    })?;
                    return Ok(());
                }
            };

        let installed = {
            let mut active = self.active.write();
            if token.is_current() {
                *active = Some(ActiveSession {
                    token: token.clone(),
                    session: session.clone(),
                });
                true
            } else {
                false
            }
        };
        if !installed {
            session.shutdown().await;
            return Err(SyncError::Stale);
        }
        info!("✅ Connected (attempt #{})", token.id());

        let cx = SessionContext {
            session,
            registry: self.registry.clone(),
            host: self.host.clone(),
            token: token.clone(),
        };
        cx.resubscribe_all().await?;
        self.bootstrap.run(&cx, &config).await?;

        token.with_current(|| self.host.set_status(InstanceStatus::Ok, None))?;
        info!("✅ Bootstrap complete");
        Ok(())
    }
}

fn timeout_message(limit: Duration) -> String {
    let ms = limit.as_millis();
    if ms % 1000 == 0 {
        format!("Connection timeout after {}s", ms / 1000)
    } else {
        format!("Connection timeout after {}ms", ms)
    }
}
