//! Device path parsing and resolution
//!
//! Device paths are slash-delimited (`/audio/mixers/0/faders/3/on`). Push
//! notifications carry partial snapshots rooted at the top-level object, so
//! a bound path is resolved by walking the snapshot segment by segment.

use serde_json::Value;
use std::fmt;

/// One segment of a device path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// All-digit segment: array index or integer-keyed record
    Index(usize),
    Key(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = raw.parse::<usize>() {
                return Segment::Index(index);
            }
        }
        Segment::Key(raw.to_string())
    }

    /// Step into `value` by this segment
    fn step<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        match (self, value) {
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            (Segment::Key(k), Value::Object(map)) => map.get(k),
            _ => None,
        }
    }
}

/// A parsed device path
///
/// Keeps the original string, which is the path's identity in the
/// subscription registry. Resolution ignores empty segments, so `a//b/`
/// and `a/b` walk the same way while still being distinct registry keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DevicePath {
    raw: String,
    segments: Vec<Segment>,
}

impl DevicePath {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .collect();
        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Walk `root` along this path
    ///
    /// Returns `None` as soon as a segment is absent. `None` means the
    /// snapshot does not concern this path, not that something failed.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |current, segment| segment.step(current))
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for DevicePath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Resolve a path string against a value
pub fn resolve<'a>(path: &str, root: &'a Value) -> Option<&'a Value> {
    DevicePath::parse(path).resolve(root)
}
