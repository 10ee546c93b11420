pub mod edge;
pub mod graph;
pub mod node;

pub use edge::{compute_edge_id, ConfidenceLevel, Edge, EdgeKind, Evidence, EvidenceType};
pub use graph::{DependencyGraph, GraphMetadata, UnresolvedReference};
pub use node::{Node, NodeKind, SourceLocation};
