use std::collections::BTreeSet;

use super::graph::{EdgeId, NodeId, WorkflowGraph};

/// Which element drives the details panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Primary {
    Node(NodeId),
    Edge(EdgeId),
}

/// Node-or-edge selection. Selecting one kind always clears the other.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    nodes: BTreeSet<NodeId>,
    edges: BTreeSet<EdgeId>,
    primary_node: Option<NodeId>,
    primary_edge: Option<EdgeId>,
}

impl Selection {
    pub fn new() -> Self { Self::default() }

    pub fn selected_node_ids(&self) -> &BTreeSet<NodeId> { &self.nodes }
    pub fn selected_edge_ids(&self) -> &BTreeSet<EdgeId> { &self.edges }
    pub fn primary_node_id(&self) -> Option<&str> { self.primary_node.as_deref() }
    pub fn primary_edge_id(&self) -> Option<&str> { self.primary_edge.as_deref() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() && self.edges.is_empty() }
    pub fn is_node_selected(&self, id: &str) -> bool { self.nodes.contains(id) }
    pub fn is_edge_selected(&self, id: &str) -> bool { self.edges.contains(id) }

    pub fn primary(&self) -> Option<Primary> {
        match (&self.primary_node, &self.primary_edge) {
            (Some(n), _) => Some(Primary::Node(n.clone())),
            (None, Some(e)) => Some(Primary::Edge(e.clone())),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.primary_node = None;
        self.primary_edge = None;
    }

    pub fn select_node(&mut self, id: Option<NodeId>) {
        self.clear();
        if let Some(id) = id {
            self.nodes.insert(id.clone());
            self.primary_node = Some(id);
        }
    }

    pub fn select_edge(&mut self, id: Option<EdgeId>) {
        self.clear();
        if let Some(id) = id {
            self.edges.insert(id.clone());
            self.primary_edge = Some(id);
        }
    }

    pub fn select_multiple_nodes<I: IntoIterator<Item = NodeId>>(&mut self, ids: I) {
        self.clear();
        self.nodes.extend(ids);
        if self.nodes.len() == 1 {
            self.primary_node = self.nodes.iter().next().cloned();
        }
    }

    pub fn select_multiple_edges<I: IntoIterator<Item = EdgeId>>(&mut self, ids: I) {
        self.clear();
        self.edges.extend(ids);
        if self.edges.len() == 1 {
            self.primary_edge = self.edges.iter().next().cloned();
        }
    }

    /// Reconcile a marquee/click selection reported by the canvas into the
    /// exclusive model. Nodes win when both lists are non-empty.
    pub fn handle_selection_change(&mut self, node_ids: &[NodeId], edge_ids: &[EdgeId]) {
        match (node_ids.len(), edge_ids.len()) {
            (0, 0) => self.clear(),
            (1, _) => self.select_node(Some(node_ids[0].clone())),
            (n, _) if n > 1 => self.select_multiple_nodes(node_ids.iter().cloned()),
            (_, 1) => self.select_edge(Some(edge_ids[0].clone())),
            _ => self.select_multiple_edges(edge_ids.iter().cloned()),
        }
    }

    /// Drop every selected id that no longer exists in `graph`.
    pub fn retain_existing(&mut self, graph: &WorkflowGraph) {
        self.nodes.retain(|id| graph.contains_node(id));
        self.edges.retain(|id| graph.contains_edge(id));
        if self.primary_node.as_deref().is_some_and(|id| !graph.contains_node(id)) {
            self.primary_node = None;
        }
        if self.primary_edge.as_deref().is_some_and(|id| !graph.contains_edge(id)) {
            self.primary_edge = None;
        }
    }
}
