use std::collections::{BTreeSet, HashMap, HashSet};

use super::document::{self, PortableDocument};
use crate::graph_utils::graph::{fresh_id, Edge, Node, NodeId, Position, WorkflowGraph};

/// Document for the current selection: selected nodes, endpoints of selected
/// edges, and every edge running between them.
pub fn copy_subset(graph: &WorkflowGraph, node_ids: &BTreeSet<NodeId>, edge_ids: &BTreeSet<String>) -> PortableDocument {
    let mut wanted: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    for id in edge_ids {
        if let Some(e) = graph.edge(id) {
            wanted.insert(e.source.as_str());
            wanted.insert(e.target.as_str());
        }
    }
    let nodes: Vec<Node> = graph.nodes().iter().filter(|n| wanted.contains(n.id.as_str())).cloned().collect();
    document::serialize(&nodes, graph.edges())
}

pub fn copy_all(graph: &WorkflowGraph) -> PortableDocument {
    document::serialize(graph.nodes(), graph.edges())
}

/// Give every pasted element a fresh id, rewrite edge endpoints through the
/// remap and shift positions by `offset` on both axes.
pub fn remap_for_paste(doc: PortableDocument, offset: f64) -> (Vec<Node>, Vec<Edge>) {
    let (nodes, edges) = document::from_document(doc);
    let mut remap: HashMap<NodeId, NodeId> = HashMap::with_capacity(nodes.len());
    let nodes = nodes
        .into_iter()
        .map(|mut n| {
            let old = std::mem::replace(&mut n.id, fresh_id());
            remap.insert(old, n.id.clone());
            n.position = Position::new(n.position.x + offset, n.position.y + offset);
            n
        })
        .collect();
    let edges = edges
        .into_iter()
        .filter_map(|mut e| {
            e.source = remap.get(&e.source)?.clone();
            e.target = remap.get(&e.target)?.clone();
            e.id = fresh_id();
            Some(e)
        })
        .collect();
    (nodes, edges)
}
