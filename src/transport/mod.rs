//! Transport collaborators
//!
//! A [`Connector`] opens a [`Session`] against the mixer. The session exposes
//! the Control API primitives (get/set/subscribe/rpc) and delivers push
//! notifications through the [`PushHandler`] given at connect time.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[cfg(test)]
pub mod mock;
pub mod websocket;

pub use websocket::{WebSocketConnector, WebSocketSession};

/// Asynchronous state delta pushed by the device
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    /// Subscription path the update was sent for, when the device names it
    pub path: Option<String>,
    /// Partial snapshot rooted at the top-level object
    pub payload: Value,
}

/// Callback receiving push notifications in delivery order
pub type PushHandler = Arc<dyn Fn(PushNotification) + Send + Sync>;

/// Parameters needed to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSettings {
    pub host: String,
    pub use_https: bool,
    pub token: Option<String>,
}

impl ConnectSettings {
    /// WebSocket endpoint of the Control API
    pub fn url(&self) -> String {
        let scheme = if self.use_https { "wss" } else { "ws" };
        format!("{}://{}/api/ws", scheme, self.host.trim_end_matches('/'))
    }
}

/// Errors raised by the transport
///
/// The Display form of each variant is the human-readable cause shown
/// in the instance status.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Native error (socket, TLS, protocol)
    #[error("{0}")]
    Native(String),
    /// Structured `{error: {code, message}}` from the device
    #[error("{message}")]
    Api { code: i64, message: String },
    /// Transport-level event carrying a `type` field
    #[error("{kind}")]
    Event { kind: String },
    #[error("unknown error")]
    Unknown,
    #[error("session closed")]
    Closed,
}

#[derive(Debug, Deserialize)]
struct ApiErrorShape {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct EventShape {
    #[serde(rename = "type")]
    kind: String,
}

impl TransportError {
    /// Classify an error value raised by the device or socket layer
    ///
    /// Recognizes `{error: {code, message}}` and `{type}`; anything else is
    /// [`TransportError::Unknown`].
    pub fn from_payload(value: &Value) -> Self {
        if let Ok(shape) = ApiErrorShape::deserialize(value) {
            return shape.error.into();
        }
        if let Ok(event) = EventShape::deserialize(value) {
            return TransportError::Event { kind: event.kind };
        }
        TransportError::Unknown
    }

    /// Message reported with a connection failure
    pub fn failure_message(&self) -> String {
        self.to_string()
    }
}

impl From<ApiErrorBody> for TransportError {
    fn from(body: ApiErrorBody) -> Self {
        TransportError::Api {
            code: body.code,
            message: body.message,
        }
    }
}

/// An open Control API session
///
/// Responses may arrive after the attempt that issued the request has been
/// superseded; callers check their attempt token before using them.
#[async_trait]
pub trait Session: Send + Sync {
    /// Read the value at `path`
    async fn get(&self, path: &str) -> Result<Value, TransportError>;

    /// Write `value` to `path`, returning the value the device acknowledged
    async fn set(&self, path: &str, value: Value) -> Result<Value, TransportError>;

    /// Ask the device to push changes under `path`
    async fn subscribe(&self, path: &str) -> Result<(), TransportError>;

    /// Call a remote procedure, returning its response payload
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Close the session; pending requests resolve with `Closed`
    async fn shutdown(&self);
}

/// Opens sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        settings: &ConnectSettings,
        push: PushHandler,
    ) -> Result<Arc<dyn Session>, TransportError>;
}
