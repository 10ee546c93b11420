use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::model::{DependencyGraph, Edge, EdgeKind, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upstream,
    Downstream,
    Both,
}

#[derive(Debug, Clone)]
pub struct BlastRadiusQuery {
    pub node_ids: Vec<String>,
    pub direction: Direction,
    pub max_depth: u32,
    pub include_edge_kinds: Option<Vec<EdgeKind>>,
}

impl Default for BlastRadiusQuery {
    fn default() -> Self {
        Self { node_ids: Vec::new(), direction: Direction::Both, max_depth: 10, include_edge_kinds: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitedNode {
    pub id: String,
    pub depth: u32,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct BlastRadiusResult {
    pub nodes: Vec<VisitedNode>,
    pub edges: Vec<Edge>,
    pub truncated: bool,
}

fn edge_allowed(edge: &Edge, include: &Option<Vec<EdgeKind>>) -> bool {
    match include {
        Some(kinds) => kinds.contains(&edge.kind),
        None => true,
    }
}

/// Breadth-first traversal over the merged graph, visit-state keyed by node
/// id, depth capped by `query.max_depth` (spec §4.2). Runs in O(V+E) within
/// the visited frontier.
pub fn blast_radius(graph: &DependencyGraph, query: &BlastRadiusQuery) -> BlastRadiusResult {
    let mut visited: HashSet<String> = HashSet::new();
    let mut visited_nodes = Vec::new();
    let mut visited_edges: Vec<Edge> = Vec::new();
    let mut queue: VecDeque<(String, u32)> = VecDeque::new();
    let mut truncated = false;

    for id in &query.node_ids {
        if graph.contains(id) && visited.insert(id.clone()) {
            queue.push_back((id.clone(), 0));
        }
    }

    while let Some((id, depth)) = queue.pop_front() {
        if let Some(node) = graph.get(&id) {
            visited_nodes.push(VisitedNode { id: id.clone(), depth, kind: node.kind });
        }
        if depth >= query.max_depth {
            // Still exists beyond this frontier, so the caller should know
            // the result did not reach every reachable node.
            if has_unvisited_neighbor(graph, &id, query, &visited) {
                truncated = true;
            }
            continue;
        }

        let neighbors = collect_neighbors(graph, &id, query.direction);
        for (edge, neighbor_id) in neighbors {
            if !edge_allowed(&edge, &query.include_edge_kinds) {
                continue;
            }
            visited_edges.push(edge);
            if visited.insert(neighbor_id.clone()) {
                queue.push_back((neighbor_id, depth + 1));
            }
        }
    }

    visited_edges.sort_by(|a, b| a.id.cmp(&b.id));
    visited_edges.dedup_by(|a, b| a.id == b.id);

    BlastRadiusResult { nodes: visited_nodes, edges: visited_edges, truncated }
}

fn collect_neighbors(graph: &DependencyGraph, id: &str, direction: Direction) -> Vec<(Edge, String)> {
    let mut out = Vec::new();
    if matches!(direction, Direction::Downstream | Direction::Both) {
        for edge in graph.outgoing(id) {
            out.push((edge.clone(), edge.target.clone()));
        }
    }
    if matches!(direction, Direction::Upstream | Direction::Both) {
        for edge in graph.incoming(id) {
            out.push((edge.clone(), edge.source.clone()));
        }
    }
    out
}

fn has_unvisited_neighbor(graph: &DependencyGraph, id: &str, query: &BlastRadiusQuery, visited: &HashSet<String>) -> bool {
    collect_neighbors(graph, id, query.direction)
        .into_iter()
        .any(|(edge, neighbor)| edge_allowed(&edge, &query.include_edge_kinds) && !visited.contains(&neighbor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge as ModelEdge, Node, SourceLocation};

    fn chain_graph(length: usize) -> DependencyGraph {
        let mut graph = DependencyGraph::new("scan-1");
        for i in 0..length {
            graph.add_node(Node::new(format!("n{i}"), format!("n{i}"), NodeKind::TerraformResource, SourceLocation::point("f", 1)));
        }
        for i in 0..length.saturating_sub(1) {
            graph.add_edge(ModelEdge::new(format!("n{i}"), format!("n{}", i + 1), EdgeKind::References, 100));
        }
        graph
    }

    #[test]
    fn downstream_traversal_follows_outgoing_edges() {
        let graph = chain_graph(4);
        let query = BlastRadiusQuery { node_ids: vec!["n0".into()], direction: Direction::Downstream, max_depth: 10, include_edge_kinds: None };
        let result = blast_radius(&graph, &query);
        assert_eq!(result.nodes.len(), 4);
        assert!(!result.truncated);
    }

    #[test]
    fn max_depth_truncates_and_sets_flag() {
        let graph = chain_graph(5);
        let query = BlastRadiusQuery { node_ids: vec!["n0".into()], direction: Direction::Downstream, max_depth: 1, include_edge_kinds: None };
        let result = blast_radius(&graph, &query);
        assert_eq!(result.nodes.len(), 2);
        assert!(result.truncated);
    }

    #[test]
    fn excluded_edge_kinds_are_not_followed() {
        let graph = chain_graph(3);
        let query = BlastRadiusQuery {
            node_ids: vec!["n0".into()],
            direction: Direction::Downstream,
            max_depth: 10,
            include_edge_kinds: Some(vec![EdgeKind::DependsOn]),
        };
        let result = blast_radius(&graph, &query);
        assert_eq!(result.nodes.len(), 1);
    }

    #[test]
    fn upstream_and_downstream_combine_under_both() {
        let graph = chain_graph(3);
        let query = BlastRadiusQuery { node_ids: vec!["n1".into()], direction: Direction::Both, max_depth: 10, include_edge_kinds: None };
        let result = blast_radius(&graph, &query);
        let ids: HashSet<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(ids.contains("n0") && ids.contains("n2"));
    }
}
