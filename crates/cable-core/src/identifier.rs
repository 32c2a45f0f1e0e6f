//! Subscription identifiers and their canonical encoding.
//!
//! A client names a subscription with a flat JSON object such as
//! `{"channel":"ChatChannel","pk":"1"}`. On the wire that object travels as a
//! *string* inside the command frame, so it is decoded twice. The canonical
//! key is the object re-encoded with keys sorted and no whitespace; it is both
//! the per-connection lookup key and the `identifier` echoed back to the
//! client, so two encodings of the same object always collapse to one
//! subscription.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::{CableError, Result};

/// Key every identifier must carry to name its channel type.
pub const CHANNEL_KEY: &str = "channel";

/// Serializes a `Value` with object keys in lexicographic order at every depth.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let sorted: BTreeMap<&str, Canonical<'_>> = map
                    .iter()
                    .map(|(k, v)| (k.as_str(), Canonical(v)))
                    .collect();
                sorted.serialize(serializer)
            }
            Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical)),
            other => other.serialize(serializer),
        }
    }
}

/// Encode a JSON value deterministically: sorted keys, compact separators.
///
/// Total over every `Value`; non-ASCII text is emitted as UTF-8, not escaped.
pub fn canonicalize(value: &Value) -> String {
    // Serializing a `Value` into a String cannot fail.
    serde_json::to_string(&Canonical(value)).unwrap_or_default()
}

/// A parsed subscription identifier with its canonical key.
#[derive(Clone, Debug)]
pub struct Identifier {
    key: String,
    channel: String,
    params: Map<String, Value>,
}

impl Identifier {
    /// Decode the string carried in a command's `identifier` field.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| CableError::InvalidIdentifier(e.to_string()))?;
        match value {
            Value::Object(params) => Self::from_params(params),
            other => Err(CableError::InvalidIdentifier(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Build an identifier from an already-decoded parameter map.
    pub fn from_params(params: Map<String, Value>) -> Result<Self> {
        let channel = params
            .get(CHANNEL_KEY)
            .and_then(Value::as_str)
            .ok_or(CableError::MissingChannel)?
            .to_owned();
        let key = canonicalize_map(&params);
        Ok(Self {
            key,
            channel,
            params,
        })
    }

    /// Canonical key, identical for every key ordering of the same object.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Channel type name (the `channel` parameter).
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// All parameters, including `channel`.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Look up a single parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn canonicalize_map(map: &Map<String, Value>) -> String {
    let sorted: BTreeMap<&str, Canonical<'_>> = map
        .iter()
        .map(|(k, v)| (k.as_str(), Canonical(v)))
        .collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
