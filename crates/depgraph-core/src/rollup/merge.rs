use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{DependencyGraph, Edge, Node};

use super::matchers::MatchResult;

/// How attribute conflicts within a merged equivalence class are resolved
/// (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    Merge,
    PreferLatest,
    PreferSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    pub conflict_resolution: ConflictResolution,
    pub create_cross_repo_edges: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { conflict_resolution: ConflictResolution::Merge, create_cross_repo_edges: true }
    }
}

/// A disjoint-set forest over node ids, used to build equivalence classes
/// from kept `MatchResult`s (spec §4.2 step 6).
struct UnionFind {
    parent: HashMap<String, String>,
}

impl UnionFind {
    fn new() -> Self {
        Self { parent: HashMap::new() }
    }

    fn find(&mut self, id: &str) -> String {
        if !self.parent.contains_key(id) {
            self.parent.insert(id.to_string(), id.to_string());
            return id.to_string();
        }
        let parent = self.parent.get(id).unwrap().clone();
        if parent == id {
            return parent;
        }
        let root = self.find(&parent);
        self.parent.insert(id.to_string(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            // Deterministic tie-break: the lexicographically smaller id becomes root.
            if root_a < root_b {
                self.parent.insert(root_b, root_a);
            } else {
                self.parent.insert(root_a, root_b);
            }
        }
    }
}

/// A scan-qualified source node feeding into a merged node.
#[derive(Debug, Clone)]
pub struct SourceMember {
    pub scan_id: String,
    pub repo_id: String,
    pub node: Node,
    pub ingested_at_ms: u64,
}

/// The result of merging ≥ 2 equivalent source nodes into one.
#[derive(Debug, Clone)]
pub struct MergedNode {
    pub merged_id: String,
    pub members: Vec<SourceMember>,
    pub attributes: serde_json::Map<String, Value>,
    pub conflicts: serde_json::Map<String, Value>,
}

/// Per-repository context a matcher's candidate pairs are drawn from.
pub struct RepoGraph {
    pub repo_id: String,
    pub scan_id: String,
    pub graph: DependencyGraph,
    /// Order in which this repository appears in the rollup config, used by
    /// `prefer_source` conflict resolution.
    pub config_order: usize,
    pub ingested_at_ms: u64,
}

/// Conflict-resolve kept matches (spec §4.2 step 5): for a node with matches
/// to multiple targets, keep the highest `(priority, confidence)`, ties
/// broken by earliest `targetNodeId`; each node participates in at most one
/// equivalence class.
pub fn resolve_conflicts(matches: Vec<(MatchResult, i32)>) -> Vec<MatchResult> {
    let mut best: HashMap<String, (MatchResult, i32)> = HashMap::new();

    for (candidate_match, priority) in matches {
        let key = candidate_match.source_node_id.clone();
        match best.get(&key) {
            Some((existing, existing_priority)) => {
                let better = (priority, candidate_match.confidence) > (*existing_priority, existing.confidence)
                    || ((priority, candidate_match.confidence) == (*existing_priority, existing.confidence)
                        && candidate_match.target_node_id < existing.target_node_id);
                if better {
                    best.insert(key, (candidate_match, priority));
                }
            }
            None => {
                best.insert(key, (candidate_match, priority));
            }
        }
    }

    let mut kept: Vec<MatchResult> = best.into_values().map(|(m, _)| m).collect();
    kept.sort_by(|a, b| a.source_node_id.cmp(&b.source_node_id));
    kept
}

/// Build equivalence classes from kept matches via union-find; classes with
/// fewer than 2 members are dropped (spec §4.2 step 6).
pub fn build_equivalence_classes(matches: &[MatchResult]) -> Vec<Vec<String>> {
    let mut uf = UnionFind::new();
    for m in matches {
        uf.union(&m.source_node_id, &m.target_node_id);
    }

    let mut classes: HashMap<String, Vec<String>> = HashMap::new();
    let mut all_ids: HashSet<String> = HashSet::new();
    for m in matches {
        all_ids.insert(m.source_node_id.clone());
        all_ids.insert(m.target_node_id.clone());
    }
    for id in &all_ids {
        let root = uf.find(id);
        classes.entry(root).or_default().push(id.clone());
    }

    let mut result: Vec<Vec<String>> =
        classes.into_values().filter(|members| members.len() >= 2).map(|mut m| { m.sort(); m }).collect();
    result.sort();
    result
}

fn scalar_confidence(node: &Node) -> u8 {
    node.attributes.get("_matchConfidence").and_then(|v| v.as_u64()).unwrap_or(0) as u8
}

/// Merge attribute bags for one equivalence class per `options` (spec §4.2 step 7).
pub fn merge_attributes(members: &[SourceMember], options: &MergeOptions) -> (serde_json::Map<String, Value>, serde_json::Map<String, Value>) {
    let mut merged = serde_json::Map::new();
    let mut conflicts = serde_json::Map::new();

    match options.conflict_resolution {
        ConflictResolution::Merge => {
            for member in members {
                for (key, value) in &member.node.attributes {
                    match merged.get(key) {
                        None => {
                            merged.insert(key.clone(), value.clone());
                        }
                        Some(existing) if existing != value => {
                            let best = members
                                .iter()
                                .filter(|m| m.node.attributes.get(key).is_some())
                                .max_by_key(|m| scalar_confidence(&m.node));
                            if let Some(best) = best {
                                merged.insert(key.clone(), best.node.attributes.get(key).cloned().unwrap_or(value.clone()));
                            }
                            let entry = conflicts.entry(key.clone()).or_insert_with(|| Value::Array(Vec::new()));
                            if let Value::Array(arr) = entry {
                                arr.push(value.clone());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        ConflictResolution::PreferLatest => {
            if let Some(latest) = members.iter().max_by_key(|m| m.ingested_at_ms) {
                for (key, value) in &latest.node.attributes {
                    merged.insert(key.clone(), value.clone());
                }
                for member in members {
                    if member.scan_id == latest.scan_id {
                        continue;
                    }
                    for (key, value) in &member.node.attributes {
                        if latest.node.attributes.get(key) != Some(value) {
                            let entry = conflicts.entry(key.clone()).or_insert_with(|| Value::Array(Vec::new()));
                            if let Value::Array(arr) = entry {
                                arr.push(value.clone());
                            }
                        }
                    }
                }
            }
        }
        ConflictResolution::PreferSource => {
            if let Some(source) = members.iter().min_by_key(|m| &m.repo_id) {
                for (key, value) in &source.node.attributes {
                    merged.insert(key.clone(), value.clone());
                }
                for member in members {
                    if member.repo_id == source.repo_id {
                        continue;
                    }
                    for (key, value) in &member.node.attributes {
                        if source.node.attributes.get(key) != Some(value) {
                            let entry = conflicts.entry(key.clone()).or_insert_with(|| Value::Array(Vec::new()));
                            if let Value::Array(arr) = entry {
                                arr.push(value.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    (merged, conflicts)
}

/// Rewrite source edges whose endpoints lie in merged classes to reference
/// merged node ids, deduplicating by `(source, target, kind)` keeping the
/// highest-confidence instance (spec §4.2 step 8).
pub fn rewrite_edges(edges: Vec<Edge>, merged_id_of: &HashMap<String, String>, create_cross_repo: bool, is_cross_repo: impl Fn(&Edge) -> bool) -> Vec<Edge> {
    let mut deduped: HashMap<(String, String, &'static str), Edge> = HashMap::new();

    for mut edge in edges {
        let crosses_repos = is_cross_repo(&edge);
        if crosses_repos && !create_cross_repo {
            continue;
        }
        if let Some(merged_source) = merged_id_of.get(&edge.source) {
            edge.source = merged_source.clone();
        }
        if let Some(merged_target) = merged_id_of.get(&edge.target) {
            edge.target = merged_target.clone();
        }
        if crosses_repos {
            edge = edge.with_metadata("crossRepo", true);
        }

        let key = (edge.source.clone(), edge.target.clone(), edge.kind.label());
        match deduped.get(&key) {
            Some(existing) if existing.confidence >= edge.confidence => {}
            _ => {
                deduped.insert(key, edge);
            }
        }
    }

    deduped.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(source: &str, target: &str, confidence: u8) -> MatchResult {
        MatchResult { source_node_id: source.to_string(), target_node_id: target.to_string(), confidence, matcher: "arn" }
    }

    #[test]
    fn higher_priority_and_confidence_wins_conflict() {
        let matches = vec![(m("a", "b", 80), 100), (m("a", "c", 95), 50)];
        let kept = resolve_conflicts(matches);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].target_node_id, "b");
    }

    #[test]
    fn tie_breaks_on_earliest_target_id() {
        let matches = vec![(m("a", "z", 90), 100), (m("a", "b", 90), 100)];
        let kept = resolve_conflicts(matches);
        assert_eq!(kept[0].target_node_id, "b");
    }

    #[test]
    fn equivalence_classes_require_at_least_two_members() {
        let matches = vec![m("a", "b", 90)];
        let classes = build_equivalence_classes(&matches);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn transitive_matches_form_one_class() {
        let matches = vec![m("a", "b", 90), m("b", "c", 90)];
        let classes = build_equivalence_classes(&matches);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0], vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }
}
