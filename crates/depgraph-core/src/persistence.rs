use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::DepGraphError;
use crate::model::DependencyGraph;
use crate::rollup::{ExecutionStatus, RollupConfig};

fn require_tenant(tenant_id: &str) -> Result<(), DepGraphError> {
    if tenant_id.trim().is_empty() {
        Err(DepGraphError::MissingTenant)
    } else {
        Ok(())
    }
}

/// Backing store for scan graphs (spec §6: "scan/graph retrieval").
#[async_trait::async_trait]
pub trait ScanRepository: Send + Sync {
    async fn get_scan_graph(&self, tenant_id: &str, scan_id: &str) -> Result<DependencyGraph, DepGraphError>;
    async fn get_latest_scan_for_repository(&self, tenant_id: &str, repository_id: &str) -> Result<DependencyGraph, DepGraphError>;
    async fn put_scan_graph(&self, tenant_id: &str, repository_id: &str, graph: DependencyGraph) -> Result<(), DepGraphError>;
}

struct ScanRecord {
    repository_id: String,
    graph: DependencyGraph,
    ingested_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryScanRepository {
    scans: Mutex<HashMap<String, ScanRecord>>,
}

fn scan_key(tenant_id: &str, scan_id: &str) -> String {
    format!("{tenant_id}:{scan_id}")
}

#[async_trait::async_trait]
impl ScanRepository for InMemoryScanRepository {
    async fn get_scan_graph(&self, tenant_id: &str, scan_id: &str) -> Result<DependencyGraph, DepGraphError> {
        require_tenant(tenant_id)?;
        self.scans
            .lock()
            .unwrap()
            .get(&scan_key(tenant_id, scan_id))
            .map(|r| r.graph.clone())
            .ok_or(DepGraphError::NotFound { what: "scan", id: scan_id.to_string() })
    }

    async fn get_latest_scan_for_repository(&self, tenant_id: &str, repository_id: &str) -> Result<DependencyGraph, DepGraphError> {
        require_tenant(tenant_id)?;
        self.scans
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.repository_id == repository_id)
            .max_by_key(|r| r.ingested_at)
            .map(|r| r.graph.clone())
            .ok_or(DepGraphError::NotFound { what: "repository scan", id: repository_id.to_string() })
    }

    async fn put_scan_graph(&self, tenant_id: &str, repository_id: &str, graph: DependencyGraph) -> Result<(), DepGraphError> {
        require_tenant(tenant_id)?;
        let key = scan_key(tenant_id, &graph.scan_id);
        self.scans.lock().unwrap().insert(key, ScanRecord { repository_id: repository_id.to_string(), graph, ingested_at: Utc::now() });
        Ok(())
    }
}

/// CRUD + optimistic-version update for rollup configs (spec §6).
#[async_trait::async_trait]
pub trait RollupRepository: Send + Sync {
    async fn find_by_id(&self, tenant_id: &str, rollup_id: &str) -> Result<RollupConfig, DepGraphError>;
    async fn create(&self, config: RollupConfig) -> Result<RollupConfig, DepGraphError>;
    async fn update(&self, config: RollupConfig, expected_version: i64) -> Result<RollupConfig, DepGraphError>;
    async fn delete(&self, tenant_id: &str, rollup_id: &str) -> Result<(), DepGraphError>;
    async fn find_many(&self, tenant_id: &str, offset: usize, limit: usize) -> Result<Vec<RollupConfig>, DepGraphError>;
}

#[derive(Default)]
pub struct InMemoryRollupRepository {
    configs: Mutex<HashMap<String, RollupConfig>>,
}

fn rollup_key(tenant_id: &str, rollup_id: &str) -> String {
    format!("{tenant_id}:{rollup_id}")
}

#[async_trait::async_trait]
impl RollupRepository for InMemoryRollupRepository {
    async fn find_by_id(&self, tenant_id: &str, rollup_id: &str) -> Result<RollupConfig, DepGraphError> {
        require_tenant(tenant_id)?;
        self.configs
            .lock()
            .unwrap()
            .get(&rollup_key(tenant_id, rollup_id))
            .cloned()
            .ok_or(DepGraphError::NotFound { what: "rollup", id: rollup_id.to_string() })
    }

    async fn create(&self, config: RollupConfig) -> Result<RollupConfig, DepGraphError> {
        require_tenant(&config.tenant_id)?;
        let key = rollup_key(&config.tenant_id, &config.id);
        let mut configs = self.configs.lock().unwrap();
        if configs.contains_key(&key) {
            return Err(DepGraphError::Repository { detail: format!("rollup '{}' already exists", config.id) });
        }
        configs.insert(key, config.clone());
        Ok(config)
    }

    async fn update(&self, config: RollupConfig, expected_version: i64) -> Result<RollupConfig, DepGraphError> {
        require_tenant(&config.tenant_id)?;
        let key = rollup_key(&config.tenant_id, &config.id);
        let mut configs = self.configs.lock().unwrap();
        let current = configs.get(&key).ok_or(DepGraphError::NotFound { what: "rollup", id: config.id.clone() })?;
        if current.version != expected_version {
            return Err(DepGraphError::VersionConflict { expected: expected_version, actual: current.version });
        }
        let mut next = config;
        next.version = expected_version + 1;
        configs.insert(key, next.clone());
        Ok(next)
    }

    async fn delete(&self, tenant_id: &str, rollup_id: &str) -> Result<(), DepGraphError> {
        require_tenant(tenant_id)?;
        self.configs.lock().unwrap().remove(&rollup_key(tenant_id, rollup_id));
        Ok(())
    }

    async fn find_many(&self, tenant_id: &str, offset: usize, limit: usize) -> Result<Vec<RollupConfig>, DepGraphError> {
        require_tenant(tenant_id)?;
        let mut matches: Vec<RollupConfig> =
            self.configs.lock().unwrap().values().filter(|c| c.tenant_id == tenant_id).cloned().collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub id: String,
    pub rollup_id: String,
    pub tenant_id: String,
    pub status: ExecutionStatus,
    pub scan_ids: Vec<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// CRUD for rollup execution records (spec §6, §4.2).
#[async_trait::async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, record: ExecutionRecord) -> Result<ExecutionRecord, DepGraphError>;
    async fn update_status(&self, tenant_id: &str, execution_id: &str, status: ExecutionStatus, error_message: Option<String>) -> Result<ExecutionRecord, DepGraphError>;
    async fn find_by_id(&self, tenant_id: &str, execution_id: &str) -> Result<ExecutionRecord, DepGraphError>;
    async fn find_in_progress(&self, tenant_id: &str, rollup_id: &str) -> Result<Option<ExecutionRecord>, DepGraphError>;
}

#[derive(Default)]
pub struct InMemoryExecutionRepository {
    executions: Mutex<HashMap<String, ExecutionRecord>>,
}

fn execution_key(tenant_id: &str, execution_id: &str) -> String {
    format!("{tenant_id}:{execution_id}")
}

#[async_trait::async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, record: ExecutionRecord) -> Result<ExecutionRecord, DepGraphError> {
        require_tenant(&record.tenant_id)?;
        let key = execution_key(&record.tenant_id, &record.id);
        self.executions.lock().unwrap().insert(key, record.clone());
        Ok(record)
    }

    async fn update_status(&self, tenant_id: &str, execution_id: &str, status: ExecutionStatus, error_message: Option<String>) -> Result<ExecutionRecord, DepGraphError> {
        require_tenant(tenant_id)?;
        let key = execution_key(tenant_id, execution_id);
        let mut executions = self.executions.lock().unwrap();
        let record = executions.get_mut(&key).ok_or(DepGraphError::NotFound { what: "execution", id: execution_id.to_string() })?;
        record.status = status;
        record.error_message = error_message;
        if matches!(status, ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled) {
            record.completed_at = Some(Utc::now());
        }
        if matches!(status, ExecutionStatus::Running) && record.started_at.is_none() {
            record.started_at = Some(Utc::now());
        }
        Ok(record.clone())
    }

    async fn find_by_id(&self, tenant_id: &str, execution_id: &str) -> Result<ExecutionRecord, DepGraphError> {
        require_tenant(tenant_id)?;
        self.executions
            .lock()
            .unwrap()
            .get(&execution_key(tenant_id, execution_id))
            .cloned()
            .ok_or(DepGraphError::NotFound { what: "execution", id: execution_id.to_string() })
    }

    async fn find_in_progress(&self, tenant_id: &str, rollup_id: &str) -> Result<Option<ExecutionRecord>, DepGraphError> {
        require_tenant(tenant_id)?;
        Ok(self
            .executions
            .lock()
            .unwrap()
            .values()
            .find(|e| e.tenant_id == tenant_id && e.rollup_id == rollup_id && e.status == ExecutionStatus::Running)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollup::{MergeOptions, MatcherSpec, RollupStatus};

    fn config(id: &str) -> RollupConfig {
        RollupConfig {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            name: "n".to_string(),
            description: String::new(),
            repository_ids: vec!["a".into(), "b".into()],
            matchers: vec![MatcherSpec { kind: "arn".into(), enabled: true, priority: 100, min_confidence: 0, config: serde_json::Value::Null }],
            merge_options: MergeOptions::default(),
            schedule: None,
            version: 1,
            status: RollupStatus::Active,
        }
    }

    #[tokio::test]
    async fn update_rejects_stale_version() {
        let repo = InMemoryRollupRepository::default();
        repo.create(config("r1")).await.unwrap();
        let err = repo.update(config("r1"), 99).await.unwrap_err();
        assert!(matches!(err, DepGraphError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn update_bumps_version_on_success() {
        let repo = InMemoryRollupRepository::default();
        repo.create(config("r1")).await.unwrap();
        let updated = repo.update(config("r1"), 1).await.unwrap();
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn read_without_tenant_is_rejected() {
        let repo = InMemoryRollupRepository::default();
        let err = repo.find_by_id("", "r1").await.unwrap_err();
        assert!(matches!(err, DepGraphError::MissingTenant));
    }
}
