pub mod blast_radius;
pub mod cron;
pub mod matchers;
pub mod merge;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DepGraphError;
use crate::model::{DependencyGraph, Edge};

pub use blast_radius::{blast_radius, BlastRadiusQuery, BlastRadiusResult, Direction};
pub use matchers::{ConfigValidation, MatchResult, Matcher};
pub use merge::{build_equivalence_classes, merge_attributes, resolve_conflicts, ConflictResolution, MergeOptions, MergedNode, RepoGraph, SourceMember};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupStatus {
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: String,
    pub repository_ids: Vec<String>,
    pub matchers: Vec<MatcherSpec>,
    pub merge_options: MergeOptions,
    pub schedule: Option<String>,
    pub version: i64,
    pub status: RollupStatus,
}

/// Descriptor for the tagged union spec §3 describes: `arn | resource_id |
/// name | tag`. `config` carries the kind-specific fields from spec §4.3
/// (the ARN component mask, the tag matcher's required tags, ...) as loose
/// JSON rather than one struct per kind, mirroring how node attribute bags
/// are stored elsewhere; fields absent or malformed fall back to that
/// matcher's own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherSpec {
    pub kind: String,
    pub enabled: bool,
    pub priority: i32,
    pub min_confidence: u8,
    #[serde(default)]
    pub config: serde_json::Value,
}

fn arn_matcher_from_config(config: &serde_json::Value, min_confidence: u8) -> matchers::ArnMatcher {
    let components = config.get("components").and_then(|c| {
        Some(matchers::arn::ArnComponents {
            partition: c.get("partition")?.as_bool().unwrap_or(true),
            service: c.get("service")?.as_bool().unwrap_or(true),
            region: c.get("region")?.as_bool().unwrap_or(true),
            account: c.get("account")?.as_bool().unwrap_or(true),
            resource: c.get("resource")?.as_bool().unwrap_or(true),
        })
    });
    matchers::ArnMatcher {
        components: components.unwrap_or_default(),
        allow_partial: config.get("allow_partial").and_then(|v| v.as_bool()).unwrap_or(false),
        min_confidence,
    }
}

fn resource_id_matcher_from_config(config: &serde_json::Value, min_confidence: u8) -> matchers::ResourceIdMatcher {
    let defaults = matchers::ResourceIdMatcher::default();
    matchers::ResourceIdMatcher {
        id_attribute: config.get("id_attribute").and_then(|v| v.as_str()).map(str::to_string).unwrap_or(defaults.id_attribute),
        normalize: config.get("normalize").and_then(|v| v.as_bool()).unwrap_or(defaults.normalize),
        min_confidence,
    }
}

fn tag_matcher_from_config(config: &serde_json::Value, min_confidence: u8) -> matchers::TagMatcher {
    let required_tags = config
        .get("required_tags")
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let key = entry.get("key")?.as_str()?.to_string();
                    let value = entry.get("value").and_then(|v| v.as_str()).map(str::to_string);
                    Some(matchers::tag::RequiredTag { key, value })
                })
                .collect()
        })
        .unwrap_or_default();
    let match_mode = match config.get("match_mode").and_then(|v| v.as_str()) {
        Some("any") => matchers::tag::TagMatchMode::Any,
        _ => matchers::tag::TagMatchMode::All,
    };
    matchers::TagMatcher { required_tags, match_mode, min_confidence }
}

fn name_matcher_from_config(config: &serde_json::Value, min_confidence: u8) -> matchers::NameMatcher {
    matchers::NameMatcher {
        case_sensitive: config.get("case_sensitive").and_then(|v| v.as_bool()).unwrap_or(false),
        namespace_prefix: config.get("namespace_prefix").and_then(|v| v.as_str()).map(str::to_string),
        min_confidence,
    }
}

/// Reconstruct a matcher trait object from its descriptor. Unknown kinds
/// fall back to the name matcher.
pub fn build_matcher(spec: &MatcherSpec) -> Box<dyn Matcher> {
    match spec.kind.as_str() {
        "arn" => Box::new(arn_matcher_from_config(&spec.config, spec.min_confidence)),
        "resource_id" => Box::new(resource_id_matcher_from_config(&spec.config, spec.min_confidence)),
        "tag" => Box::new(tag_matcher_from_config(&spec.config, spec.min_confidence)),
        _ => Box::new(name_matcher_from_config(&spec.config, spec.min_confidence)),
    }
}

const MAX_NAME_LEN: usize = 255;

/// Validate a `RollupConfig` per spec §7/§4.2: at least 2 repositories, at
/// least 1 enabled matcher, no duplicate repository ids, name length bound.
pub fn validate_rollup_config(config: &RollupConfig, built_matchers: &[Box<dyn Matcher>]) -> Result<(), DepGraphError> {
    if config.name.len() > MAX_NAME_LEN {
        return Err(DepGraphError::NameTooLong { len: config.name.len() });
    }
    if config.repository_ids.len() < 2 {
        return Err(DepGraphError::InsufficientRepositories { found: config.repository_ids.len() });
    }
    let mut seen = std::collections::HashSet::new();
    for repo_id in &config.repository_ids {
        if !seen.insert(repo_id) {
            return Err(DepGraphError::DuplicateRepository { repository_id: repo_id.clone() });
        }
    }
    if config.matchers.iter().filter(|m| m.enabled).count() == 0 {
        return Err(DepGraphError::NoMatchers);
    }
    if let Some(schedule) = &config.schedule {
        cron::parse_cron(schedule)?;
    }
    matchers::validate_matchers(built_matchers)?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct RollupExecutionStats {
    pub source_node_count: usize,
    pub merged_node_count: usize,
    pub edge_count: usize,
    pub cross_repo_edge_count: usize,
    pub matches_by_matcher: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct RollupExecutionResult {
    pub status: ExecutionStatus,
    pub stats: RollupExecutionStats,
    pub merged_graph: DependencyGraph,
    pub error_message: Option<String>,
}

/// Execute a rollup's matcher pipeline against the already-materialized
/// source graphs (spec §4.2 pipeline, steps 2-9 — step 1's status check and
/// step 3's index build/reuse are the caller's responsibility since they
/// cross the persistence/index trait boundary).
pub fn execute_rollup(
    config: &RollupConfig,
    built_matchers: &[Box<dyn Matcher>],
    sources: Vec<RepoGraph>,
) -> RollupExecutionResult {
    let mut stats = RollupExecutionStats::default();
    stats.source_node_count = sources.iter().map(|s| s.graph.node_count()).sum();

    let mut candidate_matches: Vec<(MatchResult, i32)> = Vec::new();
    let mut sorted_matchers: Vec<&Box<dyn Matcher>> = built_matchers.iter().collect();
    sorted_matchers.sort_by(|a, b| b.priority().cmp(&a.priority()).then_with(|| a.name().cmp(b.name())));

    for i in 0..sources.len() {
        for j in 0..sources.len() {
            if i == j {
                continue;
            }
            for node_a in sources[i].graph.nodes() {
                for node_b in sources[j].graph.nodes() {
                    for matcher in &sorted_matchers {
                        if let Some(result) = matcher.matches(node_a, node_b) {
                            if result.confidence >= matcher.min_confidence() {
                                *stats.matches_by_matcher.entry(matcher.name().to_string()).or_insert(0) += 1;
                                candidate_matches.push((result, matcher.priority()));
                            }
                        }
                    }
                }
            }
        }
    }

    let kept = resolve_conflicts(candidate_matches);
    let classes = build_equivalence_classes(&kept);

    let mut node_by_id: HashMap<String, (&crate::model::Node, &str)> = HashMap::new();
    let mut ingested_at_by_repo: HashMap<String, u64> = HashMap::new();
    for repo in &sources {
        ingested_at_by_repo.insert(repo.repo_id.clone(), repo.ingested_at_ms);
        for node in repo.graph.nodes() {
            node_by_id.insert(node.id.clone(), (node, repo.repo_id.as_str()));
        }
    }

    let mut merged = DependencyGraph::new(format!("rollup-{}", config.id));
    let mut merged_id_of: HashMap<String, String> = HashMap::new();

    for class in &classes {
        let merged_id = format!("merged:{}", class.join(","));
        let members: Vec<SourceMember> = class
            .iter()
            .filter_map(|id| {
                let (node, repo_id) = node_by_id.get(id)?;
                let ingested_at_ms = ingested_at_by_repo.get(*repo_id).copied().unwrap_or(0);
                Some(SourceMember { scan_id: String::new(), repo_id: repo_id.to_string(), node: (*node).clone(), ingested_at_ms })
            })
            .collect();
        let (attributes, conflicts) = merge_attributes(&members, &config.merge_options);

        if let Some(first) = members.first() {
            let mut node = first.node.clone();
            node.id = merged_id.clone();
            for (k, v) in attributes {
                node.attributes.insert(k, v);
            }
            if !conflicts.is_empty() {
                node.attributes.insert("_conflicts".to_string(), serde_json::Value::Object(conflicts));
            }
            merged.add_node(node);
        }
        for id in class {
            merged_id_of.insert(id.clone(), merged_id.clone());
        }
    }

    let mut all_edges: Vec<Edge> = Vec::new();
    let mut repo_of_node: HashMap<String, String> = HashMap::new();
    for repo in &sources {
        for node in repo.graph.nodes() {
            repo_of_node.insert(node.id.clone(), repo.repo_id.clone());
        }
        all_edges.extend(repo.graph.edges().iter().cloned());
    }

    let rewritten = merge::rewrite_edges(all_edges, &merged_id_of, config.merge_options.create_cross_repo_edges, |edge| {
        match (repo_of_node.get(&edge.source), repo_of_node.get(&edge.target)) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    });

    for node_id in node_by_id.keys() {
        if !merged_id_of.contains_key(node_id) {
            if let Some((node, _)) = node_by_id.get(node_id) {
                merged.add_node((*node).clone());
            }
        }
    }
    for edge in &rewritten {
        if edge.metadata.get("crossRepo").is_some() {
            stats.cross_repo_edge_count += 1;
        }
        merged.add_edge(edge.clone());
    }

    stats.merged_node_count = classes.len();
    stats.edge_count = merged.edge_count();

    RollupExecutionResult { status: ExecutionStatus::Completed, stats, merged_graph: merged, error_message: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, NodeKind, SourceLocation};
    use matchers::ArnMatcher;

    #[test]
    fn validation_requires_at_least_two_repos() {
        let config = RollupConfig {
            id: "r1".into(),
            tenant_id: "t1".into(),
            name: "x".into(),
            description: String::new(),
            repository_ids: vec!["repo-a".into()],
            matchers: vec![MatcherSpec { kind: "arn".into(), enabled: true, priority: 100, min_confidence: 0, config: serde_json::Value::Null }],
            merge_options: MergeOptions::default(),
            schedule: None,
            version: 1,
            status: RollupStatus::Active,
        };
        let built: Vec<Box<dyn Matcher>> = vec![Box::new(ArnMatcher::default())];
        let err = validate_rollup_config(&config, &built).unwrap_err();
        assert!(matches!(err, DepGraphError::InsufficientRepositories { found: 1 }));
    }

    #[test]
    fn execute_merges_nodes_matched_by_arn() {
        let mut graph_a = DependencyGraph::new("scan-a");
        graph_a.add_node(
            Node::new("aws_s3_bucket.data", "data", NodeKind::TerraformResource, SourceLocation::point("a.tf", 1))
                .with_attribute("arn", "arn:aws:s3:::my-bucket"),
        );
        let mut graph_b = DependencyGraph::new("scan-b");
        graph_b.add_node(
            Node::new("aws_s3_bucket.data2", "data2", NodeKind::TerraformResource, SourceLocation::point("b.tf", 1))
                .with_attribute("arn", "arn:aws:s3:::my-bucket"),
        );

        let config = RollupConfig {
            id: "r1".into(),
            tenant_id: "t1".into(),
            name: "cross-repo".into(),
            description: String::new(),
            repository_ids: vec!["repo-a".into(), "repo-b".into()],
            matchers: vec![MatcherSpec { kind: "arn".into(), enabled: true, priority: 100, min_confidence: 0, config: serde_json::Value::Null }],
            merge_options: MergeOptions::default(),
            schedule: None,
            version: 1,
            status: RollupStatus::Active,
        };
        let built: Vec<Box<dyn Matcher>> = vec![Box::new(ArnMatcher::default())];
        let sources = vec![
            RepoGraph { repo_id: "repo-a".into(), scan_id: "scan-a".into(), graph: graph_a, config_order: 0, ingested_at_ms: 0 },
            RepoGraph { repo_id: "repo-b".into(), scan_id: "scan-b".into(), graph: graph_b, config_order: 1, ingested_at_ms: 0 },
        ];

        let result = execute_rollup(&config, &built, sources);
        assert_eq!(result.stats.merged_node_count, 1);
        assert_eq!(result.status, ExecutionStatus::Completed);
    }

    #[test]
    fn build_matcher_reads_kind_specific_fields_out_of_config() {
        let spec = MatcherSpec {
            kind: "tag".into(),
            enabled: true,
            priority: 70,
            min_confidence: 80,
            config: serde_json::json!({"required_tags": [{"key": "team", "value": "platform"}], "match_mode": "any"}),
        };
        let built = build_matcher(&spec);
        assert!(built.validate_config().is_valid());

        let a = Node::new("a", "a", NodeKind::TerraformResource, SourceLocation::point("a.tf", 1))
            .with_attribute("tags", serde_json::json!({"team": "platform"}));
        let b = Node::new("b", "b", NodeKind::TerraformResource, SourceLocation::point("b.tf", 1))
            .with_attribute("tags", serde_json::json!({"team": "other"}));
        assert!(built.matches(&a, &b).is_none(), "team values differ and match_mode is any with only one required tag");

        let c = Node::new("c", "c", NodeKind::TerraformResource, SourceLocation::point("c.tf", 1))
            .with_attribute("tags", serde_json::json!({"team": "platform"}));
        assert!(built.matches(&a, &c).is_some());
    }

    #[test]
    fn build_matcher_falls_back_to_defaults_when_config_is_absent() {
        let spec = MatcherSpec { kind: "tag".into(), enabled: true, priority: 70, min_confidence: 0, config: serde_json::Value::Null };
        let built = build_matcher(&spec);
        assert!(!built.validate_config().is_valid(), "tag matcher with no required tags should still fail its own validation");
    }
}
