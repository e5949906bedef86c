use std::fmt;

use serde_json::{Map, Value};

use crate::clipboard::document;
use crate::error::DocumentError;
use crate::graph_utils::graph::{Edge, Node};

/// Canonical serialized `{nodes, edges}`. Object keys are sorted recursively and
/// array order is the store's insertion order, so equal graphs give equal strings.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn capture(nodes: &[Node], edges: &[Edge]) -> Self {
        let doc = document::serialize(nodes, edges);
        let value = serde_json::to_value(&doc).unwrap_or(Value::Null);
        Snapshot(canonical(value).to_string())
    }

    /// Wrap raw text, e.g. a snapshot read back from storage. Not validated.
    pub fn from_raw(text: impl Into<String>) -> Self { Snapshot(text.into()) }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn restore(&self) -> Result<(Vec<Node>, Vec<Edge>), DocumentError> {
        document::deserialize(&self.0)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snapshot({} bytes)", self.0.len())
    }
}

fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k, canonical(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        other => other,
    }
}
