//! Subscription registry
//!
//! Maps a device path to the local variables mirroring it. One path may feed
//! several variables (a boolean and a derived label, for example); the pair
//! `(path, variable)` is unique.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::normalize::ValueKind;
use super::path::DevicePath;

/// Post-normalization transform applied before a value is stored
///
/// Returning `None` drops the value for this binding.
pub type Decoder = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

/// Registry shared between the lifecycle manager, bootstrap and dispatcher
pub type SharedRegistry = Arc<RwLock<SubscriptionRegistry>>;

/// A local variable mirroring a device path
#[derive(Clone)]
pub struct Binding {
    pub variable: String,
    pub kind: ValueKind,
    pub decode: Option<Decoder>,
}

impl Binding {
    pub fn new(variable: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            variable: variable.into(),
            kind,
            decode: None,
        }
    }

    pub fn with_decoder(mut self, decode: Decoder) -> Self {
        self.decode = Some(decode);
        self
    }

    /// Run the decoder, identity when none is set
    pub fn apply(&self, value: Value) -> Option<Value> {
        match &self.decode {
            Some(decode) => decode(value),
            None => Some(value),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("variable", &self.variable)
            .field("kind", &self.kind)
            .field("decode", &self.decode.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct PathEntry {
    path: DevicePath,
    bindings: Vec<Binding>,
}

/// Path -> bindings map, keyed by the exact path string
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, PathEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert or replace the binding for `(path, binding.variable)`
    pub fn bind(&mut self, path: &str, binding: Binding) {
        let entry = self
            .entries
            .entry(path.to_string())
            .or_insert_with(|| PathEntry {
                path: DevicePath::parse(path),
                bindings: Vec::new(),
            });

        match entry
            .bindings
            .iter_mut()
            .find(|existing| existing.variable == binding.variable)
        {
            Some(existing) => *existing = binding,
            None => entry.bindings.push(binding),
        }
    }

    /// Remove the binding for `(path, variable)`, pruning the path when empty
    ///
    /// Returns whether a binding was removed.
    pub fn unbind(&mut self, path: &str, variable: &str) -> bool {
        let Some(entry) = self.entries.get_mut(path) else {
            return false;
        };

        let before = entry.bindings.len();
        entry.bindings.retain(|b| b.variable != variable);
        let removed = entry.bindings.len() != before;

        if entry.bindings.is_empty() {
            self.entries.remove(path);
        }
        removed
    }

    /// Bindings for an exact path string, empty for unknown paths
    pub fn bindings_for(&self, path: &str) -> &[Binding] {
        self.entries
            .get(path)
            .map(|entry| entry.bindings.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate over every bound path with its bindings
    pub fn iter(&self) -> impl Iterator<Item = (&DevicePath, &[Binding])> {
        self.entries
            .values()
            .map(|entry| (&entry.path, entry.bindings.as_slice()))
    }

    /// All bound path strings
    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of bound paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
