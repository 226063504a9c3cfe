//! Subject bundles: the JSON document holding every signal of one subject.
//!
//! Layout:
//!
//! ```json
//! {
//!     "unique_id": "subject_145",
//!     "metadata": { "...": "..." },
//!     "cgm": { "time": ["2024-01-01T00:00:00", "..."], "value": [110.0, null] },
//!     "bolus": { "time": "2024-01-01T07:30:00", "value": 4.5 }
//! }
//! ```
//!
//! Keys containing `metadata` are never treated as signals. A signal entry is
//! any object carrying a `time` field; everything else is ignored unless the
//! caller explicitly asks for it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{AlignError, BundleError};

/// Either a list of items or a single bare item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn len(&self) -> usize {
        match self {
            OneOrMany::Many(items) => items.len(),
            OneOrMany::One(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_one(&self) -> bool {
        matches!(self, OneOrMany::One(_))
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => std::slice::from_ref(item),
        }
    }
}

/// One signal as it appears in a bundle, before timestamp parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub time: OneOrMany<String>,
    pub value: OneOrMany<Option<f64>>,
}

impl RawSignal {
    pub fn new(time: Vec<String>, value: Vec<Option<f64>>) -> Self {
        Self {
            time: OneOrMany::Many(time),
            value: OneOrMany::Many(value),
        }
    }

    /// A single timestamp/value pair.
    pub fn single(time: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            time: OneOrMany::One(time.into()),
            value: OneOrMany::One(value),
        }
    }
}

/// A subject bundle, kept as the raw JSON object so that non-signal keys
/// (ids, metadata) survive untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    entries: Map<String, Value>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a bundle from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, BundleError> {
        let content = std::fs::read_to_string(path).map_err(|source| BundleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse a bundle from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, BundleError> {
        Self::from_value(serde_json::from_str(content)?)
    }

    pub fn from_value(value: Value) -> Result<Self, BundleError> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            _ => Err(BundleError::NotAnObject),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }

    pub fn to_json_string(&self) -> Result<String, BundleError> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Insert (or replace) a signal entry.
    pub fn insert_signal(&mut self, name: impl Into<String>, signal: RawSignal) {
        // RawSignal only holds strings and optional floats, serialization cannot fail.
        let value = serde_json::to_value(signal).unwrap_or(Value::Null);
        self.entries.insert(name.into(), value);
    }

    /// Insert an arbitrary non-signal entry (ids, metadata).
    pub fn insert_entry(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of every entry that looks like a signal, in sorted order.
    pub fn signal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| !key.contains("metadata"))
            .filter(|(_, value)| value.get("time").is_some())
            .map(|(key, _)| key.clone())
            .collect();
        names.sort();
        names
    }

    /// Decode the raw signal stored under `name`.
    ///
    /// Fails with `MalformedSignal` if the key is absent, has no `time` field,
    /// or holds values that are neither numbers nor null.
    pub fn raw_signal(&self, name: &str) -> Result<RawSignal, AlignError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| AlignError::malformed(name, "not present in bundle"))?;
        if entry.get("time").is_none() {
            return Err(AlignError::malformed(name, "no time field"));
        }
        if entry.get("value").is_none() {
            return Err(AlignError::malformed(name, "no value field"));
        }
        RawSignal::deserialize(entry).map_err(|e| AlignError::malformed(name, e.to_string()))
    }

    /// Subject identifier: `unique_id`, then `subject_id`, then `id`.
    pub fn subject_id(&self) -> Option<String> {
        ["unique_id", "subject_id", "id"]
            .iter()
            .find_map(|key| match self.entries.get(*key)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}
