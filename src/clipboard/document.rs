//! Portable JSON document used for copy/paste, import/export and history snapshots.
//!
//! Node positions travel inside `metadata.layout` so the document keeps the
//! persisted graph shape. Documents without layout get a diagonal grid.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DocumentError;
use crate::graph_utils::graph::{
    default_enabled, empty_object, fresh_id, Edge, EdgeData, Node, NodeData, NodeKind, Position,
};

pub const LAYOUT_KEY: &str = "layout";
pub const GRID_STEP_X: f64 = 150.0;
pub const GRID_STEP_Y: f64 = 120.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: String,
    // kept as text so documents from newer editors still parse
    pub kind: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub agent_key: Option<String>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortableDocument {
    pub nodes: Vec<DocumentNode>,
    #[serde(default)]
    pub edges: Vec<DocumentEdge>,
}

impl PortableDocument {
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Convert nodes (and the edges running between them) into a portable document.
/// Edges with an endpoint outside `nodes` are left out.
pub fn serialize(nodes: &[Node], edges: &[Edge]) -> PortableDocument {
    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let nodes = nodes
        .iter()
        .map(|n| {
            let mut metadata = n.data.metadata.clone();
            metadata.insert(
                LAYOUT_KEY.to_string(),
                serde_json::json!({ "x": n.position.x, "y": n.position.y }),
            );
            DocumentNode {
                id: n.id.clone(),
                kind: n.data.kind.as_str().to_string(),
                display_name: n.data.display_name.clone(),
                agent_key: n.data.agent_key.clone(),
                is_enabled: n.data.is_enabled,
                parameters: n.data.parameters.clone(),
                metadata,
            }
        })
        .collect();
    let edges = edges
        .iter()
        .filter(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
        .map(|e| DocumentEdge {
            id: Some(e.id.clone()),
            source: e.source.clone(),
            target: e.target.clone(),
            condition: e.data.condition.clone(),
            metadata: e.data.metadata.clone(),
        })
        .collect();
    PortableDocument { nodes, edges }
}

/// Parse text into a document. Anything that is not an object with a `nodes`
/// array is rejected outright.
pub fn parse(text: &str) -> Result<PortableDocument, DocumentError> {
    let value: Value = serde_json::from_str(text)?;
    let Some(obj) = value.as_object() else { return Err(DocumentError::NotAnObject) };
    if !obj.get("nodes").is_some_and(Value::is_array) {
        return Err(DocumentError::MissingNodes);
    }
    Ok(serde_json::from_value(value)?)
}

/// Inverse of [`serialize`] for text input.
pub fn deserialize(text: &str) -> Result<(Vec<Node>, Vec<Edge>), DocumentError> {
    let doc = parse(text)?;
    Ok(from_document(doc))
}

fn take_layout(metadata: &mut Map<String, Value>) -> Option<Position> {
    let raw = metadata.remove(LAYOUT_KEY)?;
    let pos: Position = serde_json::from_value(raw).ok()?;
    (pos.x.is_finite() && pos.y.is_finite()).then_some(pos)
}

/// Build graph elements from a parsed document. Unknown kinds, duplicate ids
/// and edges pointing at missing nodes are dropped individually.
pub fn from_document(doc: PortableDocument) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = Vec::with_capacity(doc.nodes.len());
    let mut seen: HashSet<String> = HashSet::new();
    for (index, dn) in doc.nodes.into_iter().enumerate() {
        let kind: NodeKind = match dn.kind.parse() {
            Ok(k) => k,
            Err(e) => {
                log::debug!("dropping node {}: {}", dn.id, e);
                continue;
            }
        };
        if !seen.insert(dn.id.clone()) {
            log::debug!("dropping duplicate node {}", dn.id);
            continue;
        }
        let mut metadata = dn.metadata;
        let position = take_layout(&mut metadata)
            .unwrap_or_else(|| Position::new(GRID_STEP_X * index as f64, GRID_STEP_Y * index as f64));
        let display_name = if dn.display_name.is_empty() {
            kind.default_display_name().to_string()
        } else {
            dn.display_name
        };
        nodes.push(Node {
            id: dn.id,
            position,
            data: NodeData {
                kind,
                display_name,
                agent_key: dn.agent_key,
                parameters: dn.parameters,
                is_enabled: dn.is_enabled,
                metadata,
            },
            selected: false,
            dragging: false,
        });
    }

    let mut edge_ids: HashSet<String> = HashSet::new();
    let mut edges = Vec::with_capacity(doc.edges.len());
    for de in doc.edges {
        if !seen.contains(&de.source) || !seen.contains(&de.target) {
            log::debug!("dropping edge {} -> {}: missing endpoint", de.source, de.target);
            continue;
        }
        let id = de.id.unwrap_or_else(fresh_id);
        if !edge_ids.insert(id.clone()) {
            continue;
        }
        edges.push(Edge {
            id,
            source: de.source,
            target: de.target,
            data: EdgeData { condition: de.condition, metadata: de.metadata },
        });
    }
    (nodes, edges)
}
