use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use depgraph_core::model::{DependencyGraph, Edge, GraphMetadata, Node, UnresolvedReference};
use serde::{Deserialize, Serialize};

/// On-disk representation of a `DependencyGraph`. The core type keeps its
/// traversal index private, so the CLI round-trips through this flat shape
/// rather than deriving `Serialize` on the graph itself.
#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    scan_id: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    unresolved: Vec<UnresolvedReference>,
    metadata: GraphMetadata,
}

pub fn load_graph(path: &Path) -> Result<DependencyGraph> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: GraphFile = serde_json::from_str(&raw).with_context(|| format!("parsing {} as a scan graph", path.display()))?;

    let mut graph = DependencyGraph::new(file.scan_id);
    for node in file.nodes {
        graph.add_node(node);
    }
    for edge in file.edges {
        graph.add_edge(edge);
    }
    for unresolved in file.unresolved {
        graph.record_unresolved(unresolved);
    }
    graph.metadata = file.metadata;
    Ok(graph)
}

pub fn save_graph(path: &Path, graph: &DependencyGraph) -> Result<()> {
    let file = GraphFile {
        scan_id: graph.scan_id.clone(),
        nodes: graph.nodes().cloned().collect(),
        edges: graph.edges().to_vec(),
        unresolved: graph.unresolved.clone(),
        metadata: graph.metadata.clone(),
    };
    let rendered = serde_json::to_string_pretty(&file)?;
    fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
