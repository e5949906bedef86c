use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::clipboard::document::LAYOUT_KEY;
use crate::error::UnknownKind;
use crate::history::snapshot::Snapshot;

// Basic type aliases for clarity
pub type NodeId = String;
pub type EdgeId = String;

/// Presentational hook applied to every node before it is stored.
/// Must keep `id` and `data.kind` intact.
pub type Decorator = Rc<dyn Fn(Node) -> Node>;

pub fn fresh_id() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self { Self { x, y } }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Trigger,
    Agent,
    Tool,
    Condition,
    Loop,
    Transform,
    HttpRequest,
    Delay,
    Approval,
    Output,
}

impl NodeKind {
    pub const ALL: [NodeKind; 10] = [
        NodeKind::Trigger,
        NodeKind::Agent,
        NodeKind::Tool,
        NodeKind::Condition,
        NodeKind::Loop,
        NodeKind::Transform,
        NodeKind::HttpRequest,
        NodeKind::Delay,
        NodeKind::Approval,
        NodeKind::Output,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Agent => "agent",
            NodeKind::Tool => "tool",
            NodeKind::Condition => "condition",
            NodeKind::Loop => "loop",
            NodeKind::Transform => "transform",
            NodeKind::HttpRequest => "http_request",
            NodeKind::Delay => "delay",
            NodeKind::Approval => "approval",
            NodeKind::Output => "output",
        }
    }

    pub fn default_display_name(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "Trigger",
            NodeKind::Agent => "Agent",
            NodeKind::Tool => "Tool",
            NodeKind::Condition => "Condition",
            NodeKind::Loop => "Loop",
            NodeKind::Transform => "Transform",
            NodeKind::HttpRequest => "HTTP Request",
            NodeKind::Delay => "Delay",
            NodeKind::Approval => "Approval",
            NodeKind::Output => "Output",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for NodeKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub kind: NodeKind,
    pub display_name: String,
    #[serde(default)]
    pub agent_key: Option<String>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    /// Opaque host data. The `layout` key is reserved: documents carry the node
    /// position there, so a host value under it is dropped on update and
    /// replaced on serialize.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NodeData {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            display_name: kind.default_display_name().to_string(),
            agent_key: None,
            parameters: empty_object(),
            is_enabled: true,
            metadata: Map::new(),
        }
    }
}

pub(crate) fn empty_object() -> Value { Value::Object(Default::default()) }
pub(crate) fn default_enabled() -> bool { true }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub data: NodeData,
    // transient canvas state, never persisted
    #[serde(default, skip_serializing)]
    pub selected: bool,
    #[serde(default, skip_serializing)]
    pub dragging: bool,
}

impl Node {
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self { id: fresh_id(), position, data: NodeData::new(kind), selected: false, dragging: false }
    }

    pub fn with_id(id: impl Into<NodeId>, kind: NodeKind, position: Position) -> Self {
        Self { id: id.into(), position, data: NodeData::new(kind), selected: false, dragging: false }
    }
}

/// Partial update for node data. `kind` is deliberately absent: changing kind is delete + recreate.
#[derive(Clone, Debug, Default)]
pub struct NodeDataPatch {
    pub display_name: Option<String>,
    pub agent_key: Option<Option<String>>,
    pub parameters: Option<Value>,
    pub is_enabled: Option<bool>,
    pub metadata: Option<Map<String, Value>>,
}

impl NodeDataPatch {
    fn apply(self, data: &mut NodeData) {
        if let Some(v) = self.display_name { data.display_name = v; }
        if let Some(v) = self.agent_key { data.agent_key = v; }
        if let Some(v) = self.parameters { data.parameters = v; }
        if let Some(v) = self.is_enabled { data.is_enabled = v; }
        if let Some(mut v) = self.metadata {
            if v.remove(LAYOUT_KEY).is_some() {
                log::warn!("metadata key '{LAYOUT_KEY}' is reserved for positions; value dropped");
            }
            data.metadata = v;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Default for EdgeData {
    fn default() -> Self { Self { condition: None, metadata: Map::new() } }
}

#[derive(Clone, Debug, Default)]
pub struct EdgeDataPatch {
    pub condition: Option<Option<String>>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub data: EdgeData,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self { id: fresh_id(), source: source.into(), target: target.into(), data: EdgeData::default() }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// A connect gesture coming from the canvas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
}

impl Connection {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self { source: source.into(), target: target.into() }
    }
}

/// Persisted graph shape handed to save/export collaborators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<PayloadNode>,
    pub edges: Vec<PayloadEdge>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayloadNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub display_name: String,
    pub agent_key: Option<String>,
    pub is_enabled: bool,
    pub parameters: Value,
    pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayloadEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub condition: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Canonical node/edge collection for one editing session.
#[derive(Clone, Default)]
pub struct WorkflowGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    decorate: Option<Decorator>,
    pending_changes: bool,
    // snapshot of the last loaded/saved content
    baseline: Option<Snapshot>,
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("nodes", &self.nodes)
            .field("edges", &self.edges)
            .field("pending_changes", &self.pending_changes)
            .finish()
    }
}

impl WorkflowGraph {
    // Instantiate a new, empty graph
    pub fn new() -> Self { Self::default() }

    pub fn with_decorator(decorate: Decorator) -> Self {
        Self { decorate: Some(decorate), ..Self::default() }
    }

    pub fn nodes(&self) -> &[Node] { &self.nodes }
    pub fn edges(&self) -> &[Edge] { &self.edges }
    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn edge_count(&self) -> usize { self.edges.len() }
    pub fn has_pending_changes(&self) -> bool { self.pending_changes }

    pub fn node(&self, id: &str) -> Option<&Node> { self.nodes.iter().find(|n| n.id == id) }
    pub fn edge(&self, id: &str) -> Option<&Edge> { self.edges.iter().find(|e| e.id == id) }
    pub fn contains_node(&self, id: &str) -> bool { self.node(id).is_some() }
    pub fn contains_edge(&self, id: &str) -> bool { self.edge(id).is_some() }

    fn node_mut(&mut self, id: &str) -> Option<&mut Node> { self.nodes.iter_mut().find(|n| n.id == id) }
    fn edge_mut(&mut self, id: &str) -> Option<&mut Edge> { self.edges.iter_mut().find(|e| e.id == id) }

    fn mark_dirty(&mut self) { self.pending_changes = true; }

    fn decorated(&self, node: Node) -> Node {
        let Some(decorate) = &self.decorate else { return node };
        let id = node.id.clone();
        let kind = node.data.kind;
        let out = decorate(node.clone());
        if out.id != id || out.data.kind != kind {
            log::warn!("decorator changed identity of node {id}; storing undecorated node");
            return node;
        }
        out
    }

    /// Insert a node. Returns false when the id is already taken.
    pub fn add_node(&mut self, node: Node) -> bool {
        if self.contains_node(&node.id) {
            log::warn!("refusing to add duplicate node id {}", node.id);
            return false;
        }
        let node = self.decorated(node);
        self.nodes.push(node);
        self.mark_dirty();
        true
    }

    pub fn update_node_data(&mut self, id: &str, patch: NodeDataPatch) -> bool {
        let Some(mut node) = self.node(id).cloned() else { return false };
        patch.apply(&mut node.data);
        let node = self.decorated(node);
        if let Some(slot) = self.node_mut(id) {
            *slot = node;
        }
        self.mark_dirty();
        true
    }

    pub fn set_node_position(&mut self, id: &str, position: Position) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.position = position;
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    // Transient flags do not count as edits
    pub fn set_node_dragging(&mut self, id: &str, dragging: bool) -> bool {
        match self.node_mut(id) {
            Some(node) => { node.dragging = dragging; true }
            None => false,
        }
    }

    pub fn sync_selected(&mut self, selected: &HashSet<NodeId>) {
        for node in self.nodes.iter_mut() {
            node.selected = selected.contains(&node.id);
        }
    }

    pub fn remove_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return false;
        }
        // Cascade delete edges involving this node
        self.edges.retain(|e| !e.touches(id));
        self.mark_dirty();
        true
    }

    /// Connect two existing nodes. Returns the new edge id, or None when an endpoint
    /// is missing or the same connection already exists.
    pub fn add_edge(&mut self, connection: Connection) -> Option<EdgeId> {
        if !self.contains_node(&connection.source) || !self.contains_node(&connection.target) {
            return None;
        }
        if self.edges.iter().any(|e| e.source == connection.source && e.target == connection.target) {
            return None;
        }
        let edge = Edge::new(connection.source, connection.target);
        let id = edge.id.clone();
        self.edges.push(edge);
        self.mark_dirty();
        Some(id)
    }

    /// Insert an already-built edge (paste, import). Dangling or duplicate ids are refused.
    pub fn insert_edge(&mut self, edge: Edge) -> bool {
        if self.contains_edge(&edge.id) || !self.contains_node(&edge.source) || !self.contains_node(&edge.target) {
            return false;
        }
        self.edges.push(edge);
        self.mark_dirty();
        true
    }

    pub fn update_edge_data(&mut self, id: &str, patch: EdgeDataPatch) -> bool {
        match self.edge_mut(id) {
            Some(edge) => {
                if let Some(v) = patch.condition { edge.data.condition = v; }
                if let Some(v) = patch.metadata { edge.data.metadata = v; }
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    pub fn remove_edge(&mut self, id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        if self.edges.len() == before {
            return false;
        }
        self.mark_dirty();
        true
    }

    fn store_all(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        let mut seen: HashSet<NodeId> = HashSet::with_capacity(nodes.len());
        let mut kept = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !seen.insert(node.id.clone()) {
                log::debug!("dropping duplicate node {}", node.id);
                continue;
            }
            kept.push(self.decorated(node));
        }
        let mut edge_ids: HashSet<EdgeId> = HashSet::with_capacity(edges.len());
        let edges = edges
            .into_iter()
            .filter(|e| {
                let ok = seen.contains(&e.source) && seen.contains(&e.target) && edge_ids.insert(e.id.clone());
                if !ok { log::debug!("dropping dangling or duplicate edge {}", e.id); }
                ok
            })
            .collect();
        self.nodes = kept;
        self.edges = edges;
    }

    /// Bulk replacement originating from the user (import). Counts as an edit.
    pub fn replace_graph(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.store_all(nodes, edges);
        self.mark_dirty();
    }

    /// Programmatic replacement (undo/redo). The pending flag is recomputed
    /// against the last loaded/saved baseline instead of being set.
    pub fn hydrate(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.store_all(nodes, edges);
        self.pending_changes = match &self.baseline {
            Some(baseline) => *baseline != self.snapshot(),
            None => false,
        };
    }

    /// Load fresh content: hydrate and make it the new baseline.
    pub fn load(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.store_all(nodes, edges);
        self.mark_saved();
    }

    pub fn mark_saved(&mut self) {
        self.baseline = Some(self.snapshot());
        self.pending_changes = false;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.nodes, &self.edges)
    }

    pub fn build_payload(&self) -> GraphPayload {
        let nodes = self
            .nodes
            .iter()
            .map(|n| PayloadNode {
                id: n.id.clone(),
                kind: n.data.kind,
                display_name: n.data.display_name.clone(),
                agent_key: n.data.agent_key.clone(),
                is_enabled: n.data.is_enabled,
                parameters: n.data.parameters.clone(),
                metadata: n.data.metadata.clone(),
            })
            .collect();
        let edges = self
            .edges
            .iter()
            .map(|e| PayloadEdge {
                source: e.source.clone(),
                target: e.target.clone(),
                condition: e.data.condition.clone(),
                metadata: e.data.metadata.clone(),
            })
            .collect();
        GraphPayload { nodes, edges }
    }

    // Fetch helpers
    pub fn incident_edge_ids(&self, node_id: &str) -> Vec<EdgeId> {
        self.edges.iter().filter(|e| e.touches(node_id)).map(|e| e.id.clone()).collect()
    }

    pub fn find_node_ids_by_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes.iter().filter(|n| n.data.kind == kind).map(|n| n.id.clone()).collect()
    }
}
