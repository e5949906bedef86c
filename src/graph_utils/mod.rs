pub mod graph;
pub mod selection;

pub use graph::{Connection, Edge, EdgeData, Node, NodeData, NodeId, NodeKind, Position, WorkflowGraph};
pub use selection::{Primary, Selection};
