//! Scripted in-memory device for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use super::{ConnectSettings, Connector, PushHandler, PushNotification, Session, TransportError};
use crate::sync::path::{DevicePath, Segment};

type RpcHandler = Arc<dyn Fn(&str, &Value) -> Result<Value, TransportError> + Send + Sync>;

/// Device state shared by every session the mock connector opens
pub struct MockDevice {
    tree: Mutex<Value>,
    rpc: Mutex<Option<RpcHandler>>,
    failing: Mutex<HashMap<String, TransportError>>,
    subscribe_pushes: Mutex<HashMap<String, Value>>,
    get_gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    pub gets: Mutex<Vec<String>>,
    pub sets: Mutex<Vec<(String, Value)>>,
    pub subscriptions: Mutex<Vec<String>>,
    pub rpcs: Mutex<Vec<(String, Value)>>,
}

impl MockDevice {
    pub fn new(tree: Value) -> Arc<Self> {
        Arc::new(Self {
            tree: Mutex::new(tree),
            rpc: Mutex::new(None),
            failing: Mutex::new(HashMap::new()),
            subscribe_pushes: Mutex::new(HashMap::new()),
            get_gates: Mutex::new(HashMap::new()),
            gets: Mutex::new(Vec::new()),
            sets: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            rpcs: Mutex::new(Vec::new()),
        })
    }

    pub fn on_rpc(
        &self,
        handler: impl Fn(&str, &Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) {
        *self.rpc.lock() = Some(Arc::new(handler));
    }

    /// Make `get`/`set` on `path` fail with `error`
    pub fn fail_path(&self, path: &str, error: TransportError) {
        self.failing.lock().insert(path.to_string(), error);
    }

    /// Answer a subscribe on `path` with an immediate `update` carrying `payload`
    pub fn push_on_subscribe(&self, path: &str, payload: Value) {
        self.subscribe_pushes.lock().insert(path.to_string(), payload);
    }

    /// Hold the next `get` on `path` until the returned sender fires or drops
    pub fn gate_get(&self, path: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.get_gates.lock().insert(path.to_string(), rx);
        tx
    }

    pub fn read(&self, path: &str) -> Option<Value> {
        DevicePath::parse(path).resolve(&self.tree.lock()).cloned()
    }

    pub fn write(&self, path: &str, value: Value) {
        let path = DevicePath::parse(path);
        let mut tree = self.tree.lock();
        let mut node = &mut *tree;
        for segment in path.segments() {
            let key = match segment {
                Segment::Index(i) => i.to_string(),
                Segment::Key(k) => k.clone(),
            };
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                return;
            };
            node = map.entry(key).or_insert(Value::Null);
        }
        *node = value;
    }

    fn check(&self, path: &str) -> Result<(), TransportError> {
        match self.failing.lock().get(path) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

pub struct MockSession {
    device: Arc<MockDevice>,
    push: PushHandler,
    pub closed: AtomicBool,
}

#[async_trait]
impl Session for MockSession {
    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.device.gets.lock().push(path.to_string());
        let gate = self.device.get_gates.lock().remove(path);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.device.check(path)?;
        self.device.read(path).ok_or_else(|| TransportError::Api {
            code: 404,
            message: format!("path not found: {}", path),
        })
    }

    async fn set(&self, path: &str, value: Value) -> Result<Value, TransportError> {
        self.device.check(path)?;
        self.device.sets.lock().push((path.to_string(), value.clone()));
        self.device.write(path, value.clone());
        Ok(value)
    }

    async fn subscribe(&self, path: &str) -> Result<(), TransportError> {
        self.device.subscriptions.lock().push(path.to_string());
        let payload = self.device.subscribe_pushes.lock().get(path).cloned();
        if let Some(payload) = payload {
            (self.push)(PushNotification { path: Some(path.to_string()), payload });
        }
        Ok(())
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.device.rpcs.lock().push((method.to_string(), params.clone()));
        let handler = self.device.rpc.lock().clone();
        match handler {
            Some(handler) => handler(method, &params),
            None => Ok(serde_json::json!({"result": []})),
        }
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// How the next `connect` call behaves
pub enum ConnectScript {
    Immediate,
    /// Wait for the sender to fire, then connect or fail
    Gated(oneshot::Receiver<Result<(), TransportError>>),
    Fail(TransportError),
    /// Never complete
    Hang,
}

pub struct MockConnector {
    pub device: Arc<MockDevice>,
    scripts: Mutex<VecDeque<ConnectScript>>,
    handlers: Mutex<Vec<PushHandler>>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(device: Arc<MockDevice>) -> Arc<Self> {
        Arc::new(Self {
            device,
            scripts: Mutex::new(VecDeque::new()),
            handlers: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, script: ConnectScript) {
        self.scripts.lock().push_back(script);
    }

    /// Queue a gated connect and return the gate
    pub fn gate(&self) -> oneshot::Sender<Result<(), TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.script(ConnectScript::Gated(rx));
        tx
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Deliver a notification through the handler of the `attempt`-th connect (0-based)
    pub fn push_via(&self, attempt: usize, payload: Value) {
        let handler = self.handlers.lock().get(attempt).cloned();
        if let Some(handler) = handler {
            handler(PushNotification { path: None, payload });
        }
    }

    /// Deliver a notification through the most recent handler
    pub fn push(&self, payload: Value) {
        let handler = self.handlers.lock().last().cloned();
        if let Some(handler) = handler {
            handler(PushNotification { path: None, payload });
        }
    }

    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _settings: &ConnectSettings,
        push: PushHandler,
    ) -> Result<Arc<dyn Session>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().push(push.clone());

        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or(ConnectScript::Immediate);
        match script {
            ConnectScript::Immediate => {}
            ConnectScript::Gated(rx) => match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(TransportError::Closed),
            },
            ConnectScript::Fail(e) => return Err(e),
            ConnectScript::Hang => std::future::pending::<()>().await,
        }

        let session = Arc::new(MockSession {
            device: self.device.clone(),
            push,
            closed: AtomicBool::new(false),
        });
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}
