//! End-to-end scenarios spanning detection, rollup, and the external object
//! index together, rather than one module in isolation.

use std::sync::Arc;

use depgraph_core::detection::{DetectionInput, DetectionOrchestrator};
use depgraph_core::error::DepGraphError;
use depgraph_core::index::{
    ExternalObjectEntry, ExternalObjectIndex, IndexBuildConfig, InMemoryIndexRepository, InMemoryL2Cache, L1Cache, L2Cache, LookupOptions,
    TieredCache,
};
use depgraph_core::model::{DependencyGraph, EdgeKind, Node, NodeKind, SourceLocation};
use depgraph_core::rollup::{
    blast_radius, build_matcher, execute_rollup, matchers::ArnMatcher, validate_rollup_config, BlastRadiusQuery, Direction, Matcher,
    MatcherSpec, MergeOptions, RepoGraph, RollupConfig, RollupStatus,
};

fn scan(files: &[(&str, &str)]) -> DependencyGraph {
    let inputs: Vec<DetectionInput> = files.iter().map(|(file, content)| DetectionInput { file, content }).collect();
    let mut graph = DependencyGraph::new("scan-1");
    DetectionOrchestrator::new().run(&inputs, &mut graph);
    graph
}

// ─── S1 — direct TF→Helm flow ───

#[test]
fn direct_tf_helm_output_produces_a_high_confidence_feeds_into_edge() {
    let main_tf = r#"
output "vpc_id" {
  value = aws_vpc.main.id
}
"#;
    let pipeline = r#"
stages:
  - deploy

deploy:
  stage: deploy
  script:
    - helm upgrade --install myapp ./chart --set vpc.id=$(terraform output -raw vpc_id)
"#;
    let graph = scan(&[("main.tf", main_tf), (".gitlab-ci.yml", pipeline)]);

    assert!(graph.contains("output.vpc_id"));
    let feeds: Vec<_> = graph.outgoing("output.vpc_id").filter(|e| e.kind == EdgeKind::FeedsInto).collect();
    assert_eq!(feeds.len(), 1);
    let flow = feeds[0];
    assert_eq!(flow.target, "vpc.id");
    assert!(flow.confidence >= 80, "confidence {} should be >= 80", flow.confidence);
}

// ─── S2 — rollup matches two scans on ARN ───

#[test]
fn rollup_merges_nodes_across_repos_matched_by_arn() {
    // `resource` blocks don't carry an `arn` attribute by default (it's
    // computed at apply time); attach one directly the way a later
    // enrichment pass would, matching the scenario's fixture.
    let node_r1 = scan(&[("main.tf", r#"resource "aws_s3_bucket" "main" { bucket = "shared-bucket" }"#)])
        .get("aws_s3_bucket.main")
        .unwrap()
        .clone()
        .with_attribute("arn", "arn:aws:s3:::shared-bucket");
    let mut graph_r1 = DependencyGraph::new("scan-r1");
    graph_r1.add_node(node_r1);

    let node_r2 = scan(&[("primary.tf", r#"resource "aws_s3_bucket" "primary" { bucket = "shared-bucket" }"#)])
        .get("aws_s3_bucket.primary")
        .unwrap()
        .clone()
        .with_attribute("arn", "arn:aws:s3:::shared-bucket");
    let mut graph_r2 = DependencyGraph::new("scan-r2");
    graph_r2.add_node(node_r2);

    let config = RollupConfig {
        id: "r1".into(),
        tenant_id: "t1".into(),
        name: "shared-bucket-rollup".into(),
        description: String::new(),
        repository_ids: vec!["repo-1".into(), "repo-2".into()],
        matchers: vec![MatcherSpec { kind: "arn".into(), enabled: true, priority: 80, min_confidence: 80, config: serde_json::Value::Null }],
        merge_options: MergeOptions::default(),
        schedule: None,
        version: 1,
        status: RollupStatus::Active,
    };
    let built: Vec<Box<dyn Matcher>> = vec![Box::new(ArnMatcher { min_confidence: 80, ..Default::default() })];
    validate_rollup_config(&config, &built).unwrap();

    let sources = vec![
        RepoGraph { repo_id: "repo-1".into(), scan_id: "scan-r1".into(), graph: graph_r1, config_order: 0, ingested_at_ms: 0 },
        RepoGraph { repo_id: "repo-2".into(), scan_id: "scan-r2".into(), graph: graph_r2, config_order: 1, ingested_at_ms: 1 },
    ];
    let result = execute_rollup(&config, &built, sources);

    assert_eq!(result.stats.merged_node_count, 1);
    assert_eq!(result.merged_graph.node_count(), 1);
    assert_eq!(*result.stats.matches_by_matcher.get("arn").unwrap(), 1);
}

// ─── S3 — blast radius traversal with truncation ───

#[test]
fn blast_radius_stops_at_max_depth_and_flags_truncation() {
    let mut graph = DependencyGraph::new("scan-1");
    let ids = ["root", "level1_a", "level1_b", "level2_a", "level2_b", "level2_c", "level3_a"];
    for id in ids {
        graph.add_node(Node::new(id, id, NodeKind::TerraformResource, SourceLocation::point("main.tf", 1)));
    }
    let edges = [
        ("root", "level1_a"),
        ("root", "level1_b"),
        ("level1_a", "level2_a"),
        ("level1_a", "level2_b"),
        ("level1_b", "level2_c"),
        ("level2_a", "level3_a"),
    ];
    for (src, dst) in edges {
        graph.add_edge(depgraph_core::model::Edge::new(src, dst, EdgeKind::References, 100));
    }

    let query = BlastRadiusQuery { node_ids: vec!["root".into()], direction: Direction::Downstream, max_depth: 2, include_edge_kinds: None };
    let result = blast_radius(&graph, &query);

    let visited: std::collections::HashSet<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
    let expected: std::collections::HashSet<&str> =
        ["root", "level1_a", "level1_b", "level2_a", "level2_b", "level2_c"].into_iter().collect();
    assert_eq!(visited, expected);
    assert!(result.truncated);
}

// ─── S4 — cache fallback on an L2 failure ───

/// An `L2Cache` that fails every read the way a disconnected Redis client
/// would, still accepts writes. Exists only to give `TieredCache::get` a
/// genuine failure to fall back from — `InMemoryL2Cache` is a bare `DashMap`
/// and cannot fail this way.
struct FailingL2Cache {
    inner: InMemoryL2Cache,
}

impl FailingL2Cache {
    fn new() -> Self {
        Self { inner: InMemoryL2Cache::new(3_600_000) }
    }
}

#[async_trait::async_trait]
impl L2Cache for FailingL2Cache {
    async fn get(&self, _key: &str) -> Option<Vec<ExternalObjectEntry>> {
        None
    }

    async fn set(&self, key: &str, entries: &[ExternalObjectEntry]) {
        self.inner.set(key, entries).await;
    }

    async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        self.inner.invalidate_prefix(prefix).await;
    }
}

#[tokio::test]
async fn lookup_falls_back_to_the_repository_and_warms_l1_when_l2_is_unreachable() {
    let repository = Arc::new(InMemoryIndexRepository::default());
    let l1 = L1Cache::new(1000, 300_000);
    let l2: Arc<dyn L2Cache> = Arc::new(FailingL2Cache::new());
    let cache = TieredCache::new(l1, l2, "ext-idx:");
    let index = ExternalObjectIndex::new(repository, cache, IndexBuildConfig::default());

    let mut graph = DependencyGraph::new("scan-1");
    graph.add_node(
        Node::new("aws_s3_bucket.data", "data", NodeKind::TerraformResource, SourceLocation::point("main.tf", 1))
            .with_attribute("arn", "arn:aws:s3:::my-bucket"),
    );
    index.build("t1", "scan-1", "repo-1", &graph).await.unwrap();

    // First lookup: L1 is cold and L2 never succeeds, so this must be served
    // by the persistent store and the result populated back into L1.
    let first = index.lookup("t1", "arn:aws:s3:::my-bucket", LookupOptions::default()).await.unwrap();
    assert_eq!(first.entries.len(), 1);

    // Second lookup: served from L1 without touching the (still-failing) L2.
    let second = index.lookup("t1", "arn:aws:s3:::my-bucket", LookupOptions::default()).await.unwrap();
    assert_eq!(second.entries.len(), 1);
}

// ─── S5 — partial index build ───

#[tokio::test]
async fn index_build_reports_partial_outcome_and_failure_rate_when_some_arns_are_malformed() {
    let repository = Arc::new(InMemoryIndexRepository::default());
    let l1 = L1Cache::new(1000, 300_000);
    let l2: Arc<dyn L2Cache> = Arc::new(InMemoryL2Cache::new(3_600_000));
    let cache = TieredCache::new(l1, l2, "ext-idx:");
    let index = ExternalObjectIndex::new(repository, cache, IndexBuildConfig::default());

    let mut graph = DependencyGraph::new("scan-1");
    for i in 0..97 {
        graph.add_node(
            Node::new(format!("aws_s3_bucket.b{i}"), format!("b{i}"), NodeKind::TerraformResource, SourceLocation::point("main.tf", 1))
                .with_attribute("arn", format!("arn:aws:s3:::bucket-{i}")),
        );
    }
    for i in 0..3 {
        graph.add_node(
            Node::new(format!("aws_s3_bucket.unresolved{i}"), format!("u{i}"), NodeKind::TerraformResource, SourceLocation::point("main.tf", 1))
                .with_attribute("arn", "(known after apply)"),
        );
    }

    let result = index.build("t1", "scan-1", "repo-1", &graph).await.unwrap();
    assert_eq!(result.success_count, 97);
    assert_eq!(result.failed_count, 3);
    let failure_rate = 100.0 * result.failed_count as f64 / (result.success_count + result.failed_count) as f64;
    assert!((failure_rate - 3.0).abs() < 0.01, "failure rate was {failure_rate}");
    match &result.outcome {
        depgraph_core::index::BuildOutcome::Partial { failed_node_ids } => assert_eq!(failed_node_ids.len(), 3),
        other => panic!("expected Partial outcome, got {other:?}"),
    }
}

// ─── S6 — reference resolution ───

#[test]
fn variable_reference_resolves_to_an_input_variable_edge() {
    let main_tf = r#"
resource "aws_instance" "web" {
  ami = var.ami_id
}

variable "ami_id" {
  type = string
}
"#;
    let graph = scan(&[("main.tf", main_tf)]);

    assert!(graph.contains("aws_instance.web"));
    assert!(graph.contains("var.ami_id"));
    let edges: Vec<_> = graph.outgoing("aws_instance.web").collect();
    let reference = edges.iter().find(|e| e.target == "var.ami_id").expect("an edge to var.ami_id");
    assert_eq!(reference.kind, EdgeKind::InputVariable);
    assert!(reference.confidence >= 85);
}

// ─── Rejected config / error-path sanity checks that span modules ───

#[test]
fn rollup_config_with_one_repository_is_rejected_before_execution() {
    let config = RollupConfig {
        id: "r1".into(),
        tenant_id: "t1".into(),
        name: "solo".into(),
        description: String::new(),
        repository_ids: vec!["repo-1".into()],
        matchers: vec![MatcherSpec { kind: "arn".into(), enabled: true, priority: 100, min_confidence: 0, config: serde_json::Value::Null }],
        merge_options: MergeOptions::default(),
        schedule: None,
        version: 1,
        status: RollupStatus::Active,
    };
    let built: Vec<Box<dyn Matcher>> = config.matchers.iter().map(build_matcher).collect();
    let err = validate_rollup_config(&config, &built).unwrap_err();
    assert!(matches!(err, DepGraphError::InsufficientRepositories { found: 1 }));
}
