//! WebSocket client for the DHD Control API
//!
//! One writer task drains an mpsc queue into the socket, one reader task
//! routes responses to their pending request by `msgID` and hands `update`
//! messages to the push handler.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::{
    ApiErrorBody, ConnectSettings, Connector, PushHandler, PushNotification, Session,
    TransportError,
};

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

/// Opens [`WebSocketSession`]s
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        settings: &ConnectSettings,
        push: PushHandler,
    ) -> Result<Arc<dyn Session>, TransportError> {
        let session = WebSocketSession::open(settings, push).await?;
        Ok(Arc::new(session))
    }
}

/// Response envelope for a request
#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

impl Response {
    fn into_result(self) -> Result<Value, TransportError> {
        if self.success {
            return Ok(self.payload.unwrap_or(Value::Null));
        }
        Err(self
            .error
            .map(TransportError::from)
            .unwrap_or(TransportError::Unknown))
    }
}

/// An open Control API WebSocket session
pub struct WebSocketSession {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketSession {
    /// Connect, start the IO tasks and authenticate when a token is set
    pub async fn open(
        settings: &ConnectSettings,
        push: PushHandler,
    ) -> Result<Self, TransportError> {
        let url = settings.url();
        debug!("Opening WebSocket to {}", url);

        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Native(e.to_string()))?;
        let (mut sink, mut stream) = stream.split();

        let (outbound, mut rx) = mpsc::unbounded_channel::<Message>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let is_close = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    warn!("WebSocket send failed: {}", e);
                    break;
                }
                if is_close {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = {
            let pending = pending.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(Message::Text(text)) => route_incoming(&text, &pending, &push),
                        Ok(Message::Close(frame)) => {
                            debug!("WebSocket closed by peer: {:?}", frame);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("WebSocket read failed: {}", e);
                            break;
                        }
                    }
                }
                closed.store(true, Ordering::SeqCst);
                // dropping the senders fails every outstanding request
                pending.lock().clear();
            })
        };

        let session = Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        };

        if let Some(token) = &settings.token {
            if let Err(e) = session.request(json!({"method": "auth", "token": token})).await {
                session.shutdown().await;
                return Err(e);
            }
            debug!("Authenticated with token");
        }

        info!("🔌 WebSocket connected to {}", url);
        Ok(session)
    }

    async fn request(&self, mut message: Value) -> Result<Value, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        if let Value::Object(map) = &mut message {
            map.insert("msgID".to_string(), Value::String(id.clone()));
        }
        let text = serde_json::to_string(&message)
            .map_err(|e| TransportError::Native(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        trace!("→ {}", text);
        if self.outbound.send(Message::Text(text)).is_err() {
            self.pending.lock().remove(&id);
            return Err(TransportError::Closed);
        }

        let raw = rx.await.map_err(|_| TransportError::Closed)?;
        parse_response(raw)
    }
}

fn parse_response(raw: Value) -> Result<Value, TransportError> {
    match Response::deserialize(&raw) {
        Ok(response) => response.into_result(),
        Err(_) => Err(TransportError::from_payload(&raw)),
    }
}

fn message_id(value: &Value) -> Option<String> {
    match value.get("msgID")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn route_incoming(text: &str, pending: &PendingMap, push: &PushHandler) {
    trace!("← {}", text);
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
            return;
        }
    };

    // updates may echo the msgID of the subscribe that caused them
    if value.get("method").and_then(Value::as_str) == Some("update") {
        let path = value.get("path").and_then(Value::as_str).map(str::to_string);
        let payload = value.get("payload").cloned().unwrap_or(Value::Null);
        push(PushNotification { path, payload });
        return;
    }

    if let Some(id) = message_id(&value) {
        if let Some(tx) = pending.lock().remove(&id) {
            let _ = tx.send(value);
        } else {
            trace!("Response for unknown msgID {}", id);
        }
    }
}

#[async_trait]
impl Session for WebSocketSession {
    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.request(json!({"method": "get", "path": path})).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<Value, TransportError> {
        self.request(json!({"method": "set", "path": path, "payload": value}))
            .await
    }

    async fn subscribe(&self, path: &str) -> Result<(), TransportError> {
        self.request(json!({"method": "subscribe", "path": path}))
            .await
            .map(|_| ())
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.request(json!({"method": "rpc", "params": {"method": method, "params": params}}))
            .await
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(Message::Close(None));

        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            let _ = tokio::time::timeout(Duration::from_millis(500), writer).await;
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.pending.lock().clear();
        debug!("WebSocket session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_handler() -> (PushHandler, Arc<Mutex<Vec<PushNotification>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: PushHandler = Arc::new(move |n| sink.lock().push(n));
        (handler, seen)
    }

    #[test]
    fn test_success_response() {
        let raw = json!({"msgID": "1", "success": true, "payload": {"on": true}});
        assert_eq!(parse_response(raw), Ok(json!({"on": true})));
    }

    #[test]
    fn test_error_response() {
        let raw = json!({
            "msgID": "2",
            "success": false,
            "error": {"code": 404, "message": "path not found"}
        });
        assert_eq!(
            parse_response(raw),
            Err(TransportError::Api { code: 404, message: "path not found".to_string() })
        );
    }

    #[test]
    fn test_failed_response_without_error_body() {
        assert_eq!(
            parse_response(json!({"msgID": "3", "success": false})),
            Err(TransportError::Unknown)
        );
    }

    #[test]
    fn test_response_resolves_pending_request() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = oneshot::channel();
        pending.lock().insert("7".to_string(), tx);
        let (handler, seen) = recording_handler();

        route_incoming(r#"{"msgID": 7, "success": true}"#, &pending, &handler);

        assert!(pending.lock().is_empty());
        assert_eq!(rx.try_recv().ok(), Some(json!({"msgID": 7, "success": true})));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_update_goes_to_push_handler() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (handler, seen) = recording_handler();

        route_incoming(
            r#"{"method": "update", "path": "/audio/pots", "payload": {"audio": {"pots": {"1": {"value": 4}}}}}"#,
            &pending,
            &handler,
        );
        route_incoming("not json", &pending, &handler);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path.as_deref(), Some("/audio/pots"));
        assert_eq!(seen[0].payload["audio"]["pots"]["1"]["value"], json!(4));
    }

    #[test]
    fn test_update_with_msg_id_is_not_a_response() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = oneshot::channel();
        pending.lock().insert("9".to_string(), tx);
        let (handler, seen) = recording_handler();

        route_incoming(
            r#"{"msgID": "9", "method": "update", "path": "/control/logics/1", "payload": {"control": {"logics": {"1": {"value": true}}}}}"#,
            &pending,
            &handler,
        );

        assert_eq!(seen.lock().len(), 1);
        assert!(pending.lock().contains_key("9"));
        assert!(rx.try_recv().is_err());
    }
}
