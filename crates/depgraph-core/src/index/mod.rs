pub mod cache;
pub mod extractors;
pub mod warming;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::DepGraphError;
use crate::model::{DependencyGraph, NodeKind};

pub use cache::{InMemoryL2Cache, InvalidationScope, L1Cache, L2Cache, TieredCache};
pub use extractors::{ExtractedReference, Extractor, ExtractorRegistry, ReferenceType};

/// One entry in the inverted index: an external object identifier pointing
/// back at the node it was extracted from (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalObjectEntry {
    pub external_id: String,
    pub reference_type: ReferenceType,
    pub normalized_id: String,
    pub components: BTreeMap<String, String>,
    pub tenant_id: String,
    pub repository_id: String,
    pub scan_id: String,
    pub node_id: String,
    pub node_name: String,
    pub node_kind: NodeKind,
    pub file_path: String,
    pub metadata: BTreeMap<String, String>,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    pub reference_type: Option<ReferenceType>,
    pub repository_ids: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct LookupResult {
    pub entries: Vec<ExternalObjectEntry>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    Partial { failed_node_ids: Vec<String> },
    Failed { failed_node_ids: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct IndexBuildResult {
    pub tenant_id: String,
    pub scan_id: String,
    pub success_count: usize,
    pub failed_count: usize,
    pub outcome: BuildOutcome,
}

/// Backing store contract for index entries (spec §6 persistence contract).
#[async_trait::async_trait]
pub trait IndexRepository: Send + Sync {
    async fn save_entries(&self, entries: Vec<ExternalObjectEntry>) -> Result<(), DepGraphError>;
    async fn find_by_external_id(&self, tenant_id: &str, external_id: &str, options: &LookupOptions) -> Result<LookupResult, DepGraphError>;
    async fn find_by_node_id(&self, tenant_id: &str, node_id: &str) -> Result<Vec<ExternalObjectEntry>, DepGraphError>;
    async fn delete_entries(&self, tenant_id: &str, scan_id: &str) -> Result<usize, DepGraphError>;
    async fn count_entries(&self, tenant_id: &str) -> Result<usize, DepGraphError>;
    async fn count_by_type(&self, tenant_id: &str, reference_type: ReferenceType) -> Result<usize, DepGraphError>;
}

/// In-memory reference implementation backing tests and the CLI.
#[derive(Default)]
pub struct InMemoryIndexRepository {
    entries: DashMap<String, Vec<ExternalObjectEntry>>,
}

fn tenant_scan_key(tenant_id: &str, scan_id: &str) -> String {
    format!("{tenant_id}:{scan_id}")
}

impl InMemoryIndexRepository {
    /// Test/CLI hook: dump every entry currently held, across scans.
    pub fn all_entries(&self) -> Vec<ExternalObjectEntry> {
        self.entries.iter().flat_map(|kv| kv.value().clone()).collect()
    }
}

#[async_trait::async_trait]
impl IndexRepository for InMemoryIndexRepository {
    async fn save_entries(&self, entries: Vec<ExternalObjectEntry>) -> Result<(), DepGraphError> {
        for entry in entries {
            let key = tenant_scan_key(&entry.tenant_id, &entry.scan_id);
            let mut bucket = self.entries.entry(key).or_default();
            if !bucket.iter().any(|existing| {
                existing.node_id == entry.node_id && existing.reference_type == entry.reference_type && existing.normalized_id == entry.normalized_id
            }) {
                bucket.push(entry);
            }
        }
        Ok(())
    }

    async fn find_by_external_id(&self, tenant_id: &str, external_id: &str, options: &LookupOptions) -> Result<LookupResult, DepGraphError> {
        if external_id.trim().is_empty() {
            return Err(DepGraphError::InvalidExternalId);
        }
        let mut matches: Vec<ExternalObjectEntry> = self
            .entries
            .iter()
            .filter(|kv| kv.key().starts_with(&format!("{tenant_id}:")))
            .flat_map(|kv| kv.value().clone())
            .filter(|e| e.tenant_id == tenant_id && (e.external_id == external_id || e.normalized_id == external_id))
            .filter(|e| options.reference_type.map(|t| t == e.reference_type).unwrap_or(true))
            .filter(|e| options.repository_ids.as_ref().map(|ids| ids.contains(&e.repository_id)).unwrap_or(true))
            .collect();

        matches.sort_by(|a, b| a.reference_type.priority().cmp(&b.reference_type.priority()).then_with(|| b.indexed_at.cmp(&a.indexed_at)));

        let total = matches.len();
        let offset = options.offset.unwrap_or(0);
        let limit = options.limit.unwrap_or(1000).min(1000);
        let page = matches.into_iter().skip(offset).take(limit).collect();
        Ok(LookupResult { entries: page, total })
    }

    async fn find_by_node_id(&self, tenant_id: &str, node_id: &str) -> Result<Vec<ExternalObjectEntry>, DepGraphError> {
        Ok(self
            .entries
            .iter()
            .filter(|kv| kv.key().starts_with(&format!("{tenant_id}:")))
            .flat_map(|kv| kv.value().clone())
            .filter(|e| e.node_id == node_id)
            .collect())
    }

    async fn delete_entries(&self, tenant_id: &str, scan_id: &str) -> Result<usize, DepGraphError> {
        let key = tenant_scan_key(tenant_id, scan_id);
        Ok(self.entries.remove(&key).map(|(_, v)| v.len()).unwrap_or(0))
    }

    async fn count_entries(&self, tenant_id: &str) -> Result<usize, DepGraphError> {
        Ok(self
            .entries
            .iter()
            .filter(|kv| kv.key().starts_with(&format!("{tenant_id}:")))
            .map(|kv| kv.value().len())
            .sum())
    }

    async fn count_by_type(&self, tenant_id: &str, reference_type: ReferenceType) -> Result<usize, DepGraphError> {
        Ok(self
            .entries
            .iter()
            .filter(|kv| kv.key().starts_with(&format!("{tenant_id}:")))
            .flat_map(|kv| kv.value().clone())
            .filter(|e| e.reference_type == reference_type)
            .count())
    }
}

#[derive(Debug, Clone)]
pub struct IndexBuildConfig {
    pub batch_size: usize,
    pub max_concurrent_builds: usize,
    pub build_timeout_ms: u64,
    pub max_references_per_node: usize,
}

impl Default for IndexBuildConfig {
    fn default() -> Self {
        Self { batch_size: 1000, max_concurrent_builds: 3, build_timeout_ms: 300_000, max_references_per_node: 100 }
    }
}

/// The external object index: extraction, idempotent build, and cached
/// lookup/reverse-lookup (spec §4.3).
pub struct ExternalObjectIndex {
    repository: Arc<dyn IndexRepository>,
    extractors: ExtractorRegistry,
    cache: TieredCache,
    config: IndexBuildConfig,
    in_flight: DashMap<String, watch::Receiver<bool>>,
}

impl ExternalObjectIndex {
    pub fn new(repository: Arc<dyn IndexRepository>, cache: TieredCache, config: IndexBuildConfig) -> Self {
        Self { repository, extractors: ExtractorRegistry::standard(), cache, config, in_flight: DashMap::new() }
    }

    /// Build (or join an in-flight build of) the index for `(tenant_id, scan_id)`.
    /// Idempotent: re-running a build on an unchanged scan produces the same
    /// entry set (spec §8 round-trip property).
    pub async fn build(&self, tenant_id: &str, scan_id: &str, repository_id: &str, graph: &DependencyGraph) -> Result<IndexBuildResult, DepGraphError> {
        let key = tenant_scan_key(tenant_id, scan_id);

        if let Some(existing) = self.in_flight.get(&key) {
            let mut rx = existing.clone();
            drop(existing);
            let _ = rx.changed().await;
            return Ok(IndexBuildResult { tenant_id: tenant_id.to_string(), scan_id: scan_id.to_string(), success_count: 0, failed_count: 0, outcome: BuildOutcome::Success });
        }

        let (tx, rx) = watch::channel(false);
        self.in_flight.insert(key.clone(), rx);

        let result = crate::retry::with_timeout(self.config.build_timeout_ms, self.build_inner(tenant_id, scan_id, repository_id, graph)).await;

        self.in_flight.remove(&key);
        let _ = tx.send(true);
        result
    }

    async fn build_inner(&self, tenant_id: &str, scan_id: &str, repository_id: &str, graph: &DependencyGraph) -> Result<IndexBuildResult, DepGraphError> {
        self.repository.delete_entries(tenant_id, scan_id).await?;

        let nodes: Vec<_> = graph.nodes().collect();
        let mut success_count = 0usize;
        let mut failed_node_ids = Vec::new();
        let now = Utc::now();

        for batch in nodes.chunks(self.config.batch_size) {
            let mut entries = Vec::new();
            for node in batch {
                let extracted = self.extractors.extract_all(node, self.config.max_references_per_node);
                if extracted.is_empty() && self.extractors_claim(node) {
                    failed_node_ids.push(node.id.clone());
                    continue;
                }
                for reference in extracted {
                    let Some(extractor) = self.extractors.by_type(reference.reference_type) else { continue };
                    entries.push(ExternalObjectEntry {
                        normalized_id: extractor.normalize(&reference.external_id),
                        external_id: reference.external_id,
                        reference_type: reference.reference_type,
                        components: reference.components,
                        tenant_id: tenant_id.to_string(),
                        repository_id: repository_id.to_string(),
                        scan_id: scan_id.to_string(),
                        node_id: node.id.clone(),
                        node_name: node.name.clone(),
                        node_kind: node.kind,
                        file_path: node.location.file.clone(),
                        metadata: BTreeMap::new(),
                        indexed_at: now,
                    });
                }
                success_count += 1;
            }
            self.repository.save_entries(entries).await?;
        }

        self.cache.invalidate(InvalidationScope::Pattern(format!("{}:{}*", self.cache.key(tenant_id, "", None).trim_end_matches(':'), tenant_id))).await;

        let failed_count = failed_node_ids.len();
        let outcome = if failed_count == 0 {
            BuildOutcome::Success
        } else if success_count > 0 {
            BuildOutcome::Partial { failed_node_ids }
        } else {
            BuildOutcome::Failed { failed_node_ids }
        };

        Ok(IndexBuildResult { tenant_id: tenant_id.to_string(), scan_id: scan_id.to_string(), success_count, failed_count, outcome })
    }

    /// A node counts as a build failure when some extractor recognized it
    /// (e.g. it carries an `arn` attribute) but none of that extractor's
    /// candidate values survived extraction — every candidate was a
    /// placeholder or otherwise malformed (spec §4.3 partial-build model).
    fn extractors_claim(&self, node: &crate::model::Node) -> bool {
        self.extractors.claims(node)
    }

    pub async fn lookup(&self, tenant_id: &str, external_id: &str, options: LookupOptions) -> Result<LookupResult, DepGraphError> {
        if tenant_id.trim().is_empty() {
            return Err(DepGraphError::MissingTenant);
        }
        if external_id.trim().is_empty() {
            return Err(DepGraphError::InvalidExternalId);
        }

        let cache_key = self.cache.key(tenant_id, external_id, None);
        if let Some(entries) = self.cache.get(&cache_key).await {
            let total = entries.len();
            return Ok(LookupResult { entries, total });
        }

        let result = self.repository.find_by_external_id(tenant_id, external_id, &options).await?;
        self.cache.populate(&cache_key, result.entries.clone()).await;
        Ok(result)
    }

    pub async fn reverse_lookup(&self, tenant_id: &str, node_id: &str) -> Result<Vec<ExternalObjectEntry>, DepGraphError> {
        if tenant_id.trim().is_empty() {
            return Err(DepGraphError::MissingTenant);
        }
        self.repository.find_by_node_id(tenant_id, node_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, SourceLocation};

    fn index() -> ExternalObjectIndex {
        let repository = Arc::new(InMemoryIndexRepository::default());
        let l1 = L1Cache::new(1000, 300_000);
        let l2: Arc<dyn L2Cache> = Arc::new(InMemoryL2Cache::new(3_600_000));
        let cache = TieredCache::new(l1, l2, "ext-idx:");
        ExternalObjectIndex::new(repository, cache, IndexBuildConfig::default())
    }

    fn graph_with_arn_node() -> DependencyGraph {
        let mut graph = DependencyGraph::new("scan-1");
        graph.add_node(
            Node::new("aws_s3_bucket.data", "data", NodeKind::TerraformResource, SourceLocation::point("main.tf", 1))
                .with_attribute("arn", "arn:aws:s3:::my-bucket"),
        );
        graph
    }

    #[tokio::test]
    async fn build_then_lookup_round_trips() {
        let index = index();
        let graph = graph_with_arn_node();
        let build_result = index.build("t1", "scan-1", "repo-1", &graph).await.unwrap();
        assert_eq!(build_result.outcome, BuildOutcome::Success);

        let lookup = index.lookup("t1", "arn:aws:s3:::my-bucket", LookupOptions::default()).await.unwrap();
        assert_eq!(lookup.entries.len(), 1);
    }

    #[tokio::test]
    async fn build_is_idempotent() {
        let index = index();
        let graph = graph_with_arn_node();
        index.build("t1", "scan-1", "repo-1", &graph).await.unwrap();
        index.build("t1", "scan-1", "repo-1", &graph).await.unwrap();

        let lookup = index.lookup("t1", "arn:aws:s3:::my-bucket", LookupOptions::default()).await.unwrap();
        assert_eq!(lookup.entries.len(), 1);
    }

    #[tokio::test]
    async fn empty_external_id_is_rejected() {
        let index = index();
        let err = index.lookup("t1", "  ", LookupOptions::default()).await.unwrap_err();
        assert!(matches!(err, DepGraphError::InvalidExternalId));
    }

    #[tokio::test]
    async fn build_is_partial_when_some_nodes_yield_no_references() {
        let index = index();
        let mut graph = graph_with_arn_node();
        graph.add_node(
            Node::new("aws_s3_bucket.unresolved", "unresolved", NodeKind::TerraformResource, SourceLocation::point("main.tf", 2))
                .with_attribute("arn", "(known after apply)"),
        );
        let result = index.build("t1", "scan-1", "repo-1", &graph).await.unwrap();
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed_count, 1);
        assert!(matches!(result.outcome, BuildOutcome::Partial { .. }));
    }

    #[tokio::test]
    async fn reverse_lookup_finds_entries_by_node_id() {
        let index = index();
        let graph = graph_with_arn_node();
        index.build("t1", "scan-1", "repo-1", &graph).await.unwrap();
        let entries = index.reverse_lookup("t1", "aws_s3_bucket.data").await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
