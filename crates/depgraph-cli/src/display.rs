use depgraph_core::index::IndexBuildResult;
use depgraph_core::model::DependencyGraph;
use depgraph_core::rollup::{BlastRadiusResult, RollupExecutionResult};

pub fn print_scan_summary(graph: &DependencyGraph) {
    println!();
    println!(" scan {}", graph.scan_id);
    println!(" {} nodes, {} edges", graph.node_count(), graph.edge_count());
    if !graph.unresolved.is_empty() {
        println!(" {} unresolved references", graph.unresolved.len());
    }
    if !graph.metadata.file_errors.is_empty() {
        println!(" {} files failed to parse:", graph.metadata.file_errors.len());
        for (file, message) in &graph.metadata.file_errors {
            println!("   - {file}: {message}");
        }
    }
    println!();
}

pub fn print_execution_result(result: &RollupExecutionResult) {
    println!();
    println!(" rollup execution: {:?}", result.status);
    println!(
        " {} source nodes -> {} merged nodes, {} edges ({} cross-repo)",
        result.stats.source_node_count, result.stats.merged_node_count, result.stats.edge_count, result.stats.cross_repo_edge_count
    );
    for (matcher, count) in &result.stats.matches_by_matcher {
        println!("   - {matcher}: {count} matches");
    }
    if let Some(error) = &result.error_message {
        println!(" error: {error}");
    }
    println!();
}

pub fn print_blast_radius(result: &BlastRadiusResult) {
    println!();
    println!(" {} nodes reached, {} edges{}", result.nodes.len(), result.edges.len(), if result.truncated { " (truncated)" } else { "" });
    let mut by_depth: Vec<&depgraph_core::rollup::blast_radius::VisitedNode> = result.nodes.iter().collect();
    by_depth.sort_by_key(|n| n.depth);
    for node in by_depth {
        println!("   [{}] {}", node.depth, node.id);
    }
    println!();
}

pub fn print_index_build_result(result: &IndexBuildResult) {
    println!();
    println!(" index build for {}/{}", result.tenant_id, result.scan_id);
    println!(" {} succeeded, {} failed ({:?})", result.success_count, result.failed_count, result.outcome);
    println!();
}
