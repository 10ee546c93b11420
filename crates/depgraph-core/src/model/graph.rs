use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::edge::Edge;
use super::node::{Node, NodeKind};

/// A reference that looked like a node id but did not resolve to a node
/// present in the graph at emit time. Tracked separately; never promoted to
/// an edge (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub from_node: String,
    pub target_path: String,
    pub file: String,
    pub line: u32,
}

/// Per-scan metadata: source files touched, per-kind node counts, timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub source_files: Vec<String>,
    pub node_kind_counts: HashMap<String, usize>,
    pub build_duration_ms: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Per-file parse errors: a bad file is dropped from the scan but does
    /// not abort detection (spec §4.1 failure model).
    pub file_errors: Vec<(String, String)>,
}

/// A per-scan container: nodes (insertion order preserved), edges (ordered),
/// and metadata. The traversable structure mirrors `PipelineDag`: a
/// `petgraph::DiGraph` keyed by the same ids stored in `nodes`/`edge_list`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub scan_id: String,
    nodes: IndexMap<String, Node>,
    edge_list: Vec<Edge>,
    pub unresolved: Vec<UnresolvedReference>,
    pub metadata: GraphMetadata,
    graph: DiGraph<String, usize>,
    node_index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new(scan_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            nodes: IndexMap::new(),
            edge_list: Vec::new(),
            unresolved: Vec::new(),
            metadata: GraphMetadata::default(),
            graph: DiGraph::new(),
            node_index: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) {
        if self.nodes.contains_key(&node.id) {
            return;
        }
        let idx = self.graph.add_node(node.id.clone());
        self.node_index.insert(node.id.clone(), idx);
        *self.metadata.node_kind_counts.entry(node.kind.label().to_string()).or_insert(0) += 1;
        self.nodes.insert(node.id.clone(), node);
    }

    /// Add an edge, but only if both endpoints already exist in the graph.
    /// Returns `false` (and records nothing) when an endpoint is missing —
    /// callers that want to track the miss should push an `UnresolvedReference`.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let (Some(&src), Some(&dst)) = (self.node_index.get(&edge.source), self.node_index.get(&edge.target)) else {
            return false;
        };
        let edge_pos = self.edge_list.len();
        self.graph.add_edge(src, dst, edge_pos);
        self.edge_list.push(edge);
        true
    }

    pub fn record_unresolved(&mut self, unresolved: UnresolvedReference) {
        self.unresolved.push(unresolved);
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edge_list
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_list.len()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    /// Outgoing edges from `id`, in insertion order.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Edge> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new().into_iter();
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| &self.edge_list[*e.weight()])
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Incoming edges to `id`, in insertion order.
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &Edge> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new().into_iter();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| &self.edge_list[*e.weight()])
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Validate the spec §8 invariant: every edge's endpoints resolve to
    /// nodes present in this graph.
    pub fn validate_edges_resolve(&self) -> bool {
        self.edge_list
            .iter()
            .all(|e| self.nodes.contains_key(&e.source) && self.nodes.contains_key(&e.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::edge::EdgeKind;
    use crate::model::node::SourceLocation;

    fn node(id: &str) -> Node {
        Node::new(id, id, NodeKind::TerraformResource, SourceLocation::point("main.tf", 1))
    }

    #[test]
    fn edges_only_attach_when_both_endpoints_exist() {
        let mut g = DependencyGraph::new("scan-1");
        g.add_node(node("a"));
        let added = g.add_edge(Edge::new("a", "b", EdgeKind::References, 80));
        assert!(!added);
        assert_eq!(g.edge_count(), 0);

        g.add_node(node("b"));
        let added = g.add_edge(Edge::new("a", "b", EdgeKind::References, 80));
        assert!(added);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut g = DependencyGraph::new("scan-1");
        g.add_node(node("z"));
        g.add_node(node("a"));
        g.add_node(node("m"));
        let ids: Vec<&str> = g.nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn validates_edge_resolution_invariant() {
        let mut g = DependencyGraph::new("scan-1");
        g.add_node(node("a"));
        g.add_node(node("b"));
        g.add_edge(Edge::new("a", "b", EdgeKind::References, 80));
        assert!(g.validate_edges_resolve());
    }
}
