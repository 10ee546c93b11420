use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use uuid::Uuid;

use crate::error::DepGraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub result: Option<Value>,
}

/// External async-dispatch collaborator (spec §6): used only for
/// asynchronous rollup executions and cache-warming jobs.
#[async_trait::async_trait]
pub trait QueueClient: Send + Sync {
    async fn enqueue(&self, job_type: &str, payload: Value) -> Result<String, DepGraphError>;
    async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, DepGraphError>;
}

struct QueuedJob {
    job_type: String,
    payload: Value,
    status: JobStatus,
    result: Option<Value>,
}

/// In-memory reference implementation; `enqueue` immediately marks jobs
/// `Queued` and leaves execution to whatever polls `drain()`.
#[derive(Default)]
pub struct InMemoryQueueClient {
    jobs: Mutex<HashMap<String, QueuedJob>>,
}

impl InMemoryQueueClient {
    /// Test/CLI hook: pop the next queued job id to simulate a worker pulling
    /// work off the queue.
    pub fn drain_next(&self) -> Option<String> {
        let mut jobs = self.jobs.lock().unwrap();
        let next = jobs.iter().find(|(_, j)| j.status == JobStatus::Queued).map(|(id, _)| id.clone())?;
        jobs.get_mut(&next).unwrap().status = JobStatus::Running;
        Some(next)
    }

    pub fn complete(&self, job_id: &str, result: Value) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id) {
            job.status = JobStatus::Completed;
            job.result = Some(result);
        }
    }
}

#[async_trait::async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn enqueue(&self, job_type: &str, payload: Value) -> Result<String, DepGraphError> {
        let job_id = Uuid::new_v4().to_string();
        self.jobs.lock().unwrap().insert(job_id.clone(), QueuedJob { job_type: job_type.to_string(), payload, status: JobStatus::Queued, result: None });
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, DepGraphError> {
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .map(|j| JobStatusReport { status: j.status, result: j.result.clone() })
            .ok_or(DepGraphError::NotFound { what: "job", id: job_id.to_string() })
    }
}
