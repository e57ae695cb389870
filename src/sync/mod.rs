//! Synchronization core
//!
//! Paths, normalization, the subscription registry, push dispatch and the
//! attempt-guarded connection lifecycle.

pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod normalize;
pub mod path;
pub mod registry;

pub use dispatch::Dispatcher;
pub use error::SyncError;
pub use lifecycle::{AttemptCounter, AttemptToken, Bootstrap, ConnectionManager, SessionContext};
pub use normalize::{coerce_input, normalize_range, normalize_scalar, RangeParam, Scalar, ValueKind};
pub use path::DevicePath;
pub use registry::{Binding, Decoder, SharedRegistry, SubscriptionRegistry};
