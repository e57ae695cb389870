//! DHD Bridge
//!
//! Mirrors the state of a DHD audio mixer (Control API over WebSocket) into a
//! control-surface host: typed variables, actions and feedbacks.

pub mod bridge;
pub mod config;
pub mod features;
pub mod host;
pub mod sync;
pub mod transport;

pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError, ConfigWatcher};
pub use features::{Action, Feedback};
pub use host::{ConsoleHost, Host, InstanceStatus};
pub use sync::SyncError;
pub use transport::{Connector, WebSocketConnector};
