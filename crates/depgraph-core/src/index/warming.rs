use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

use crate::retry::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarmingPriority {
    Background = 1,
    Low = 3,
    Normal = 5,
    High = 7,
    Critical = 10,
}

impl WarmingPriority {
    pub fn weight(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarmingTarget {
    ExecutionResult,
    MergedGraph,
    BlastRadius,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Active,
    Completed,
    Failed,
    Delayed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct WarmingJob {
    pub id: String,
    pub tenant_id: String,
    pub priority: WarmingPriority,
    pub target_types: HashSet<WarmingTarget>,
    pub rollup_ids: Vec<String>,
    pub execution_ids: Vec<String>,
    pub force_refresh: bool,
    pub max_items: usize,
    pub state: JobState,
    pub attempt: u32,
    pub sequence: u64,
}

/// Max-heap ordering: higher priority first, then earlier sequence number
/// (FIFO within the same priority).
#[derive(Debug, Clone)]
struct QueueEntry {
    priority: WarmingPriority,
    sequence: u64,
    job_id: String,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// A single-process token bucket limiting warming job dispatch to
/// `max_jobs_per_second` (spec §4.3).
pub struct RateLimiter {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(max_jobs_per_second: f64) -> Self {
        Self { capacity: max_jobs_per_second, tokens: max_jobs_per_second, refill_per_sec: max_jobs_per_second, last_refill: Instant::now() }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Priority queue + bounded concurrency + token-bucket dispatch for cache
/// warming jobs (spec §4.3).
pub struct WarmingQueue {
    jobs: std::collections::HashMap<String, WarmingJob>,
    heap: BinaryHeap<QueueEntry>,
    active: HashSet<String>,
    max_concurrency: usize,
    limiter: RateLimiter,
    retry: RetryConfig,
    next_sequence: u64,
}

impl WarmingQueue {
    pub fn new(max_concurrency: usize, max_jobs_per_second: f64) -> Self {
        Self {
            jobs: std::collections::HashMap::new(),
            heap: BinaryHeap::new(),
            active: HashSet::new(),
            max_concurrency,
            limiter: RateLimiter::new(max_jobs_per_second),
            retry: RetryConfig { max_attempts: 3, base_delay_ms: 1000, multiplier: 2.0, max_delay_ms: 30_000, jitter: 0.0 },
            next_sequence: 0,
        }
    }

    pub fn enqueue(&mut self, mut job: WarmingJob) -> String {
        job.state = JobState::Pending;
        job.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueueEntry { priority: job.priority, sequence: job.sequence, job_id: job.id.clone() });
        let id = job.id.clone();
        self.jobs.insert(id.clone(), job);
        id
    }

    /// Pop the next eligible job respecting bounded concurrency and the rate
    /// limiter; returns `None` if nothing can be dispatched right now.
    pub fn try_dispatch(&mut self, now: Instant) -> Option<String> {
        if self.active.len() >= self.max_concurrency || !self.limiter.try_acquire(now) {
            return None;
        }
        while let Some(entry) = self.heap.pop() {
            if let Some(job) = self.jobs.get_mut(&entry.job_id) {
                if job.state == JobState::Pending {
                    job.state = JobState::Active;
                    self.active.insert(entry.job_id.clone());
                    return Some(entry.job_id);
                }
            }
        }
        None
    }

    pub fn complete(&mut self, job_id: &str) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.state = JobState::Completed;
        }
        self.active.remove(job_id);
    }

    pub fn cancel(&mut self, job_id: &str) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.state = JobState::Cancelled;
        }
        self.active.remove(job_id);
    }

    /// Fail and requeue with exponential backoff, or mark terminally failed
    /// once `retry.max_attempts` is exhausted.
    pub fn fail_and_retry(&mut self, job_id: &str) -> Option<Duration> {
        self.active.remove(job_id);
        let job = self.jobs.get_mut(job_id)?;
        job.attempt += 1;
        if job.attempt >= self.retry.max_attempts {
            job.state = JobState::Failed;
            None
        } else {
            job.state = JobState::Delayed;
            let delay = self.retry.delay_for_attempt(job.attempt, 0.0);
            Some(delay)
        }
    }

    pub fn requeue_delayed(&mut self, job_id: &str) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            if job.state == JobState::Delayed {
                job.state = JobState::Pending;
                job.sequence = self.next_sequence;
                self.next_sequence += 1;
                self.heap.push(QueueEntry { priority: job.priority, sequence: job.sequence, job_id: job_id.to_string() });
            }
        }
    }

    pub fn state_of(&self, job_id: &str) -> Option<JobState> {
        self.jobs.get(job_id).map(|j| j.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, priority: WarmingPriority) -> WarmingJob {
        WarmingJob {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            priority,
            target_types: HashSet::from([WarmingTarget::MergedGraph]),
            rollup_ids: vec![],
            execution_ids: vec![],
            force_refresh: false,
            max_items: 100,
            state: JobState::Pending,
            attempt: 0,
            sequence: 0,
        }
    }

    #[test]
    fn higher_priority_dispatches_first() {
        let mut queue = WarmingQueue::new(10, 1000.0);
        queue.enqueue(job("low", WarmingPriority::Low));
        queue.enqueue(job("critical", WarmingPriority::Critical));
        let dispatched = queue.try_dispatch(Instant::now()).unwrap();
        assert_eq!(dispatched, "critical");
    }

    #[test]
    fn concurrency_cap_blocks_extra_dispatch() {
        let mut queue = WarmingQueue::new(1, 1000.0);
        queue.enqueue(job("a", WarmingPriority::Normal));
        queue.enqueue(job("b", WarmingPriority::Normal));
        assert!(queue.try_dispatch(Instant::now()).is_some());
        assert!(queue.try_dispatch(Instant::now()).is_none());
    }

    #[test]
    fn rate_limiter_blocks_when_tokens_exhausted() {
        let mut limiter = RateLimiter::new(1.0);
        let now = Instant::now();
        assert!(limiter.try_acquire(now));
        assert!(!limiter.try_acquire(now));
    }

    #[test]
    fn failure_retries_until_max_attempts_then_fails_terminally() {
        let mut queue = WarmingQueue::new(10, 1000.0);
        queue.enqueue(job("a", WarmingPriority::Normal));
        queue.try_dispatch(Instant::now());
        assert!(queue.fail_and_retry("a").is_some());
        queue.requeue_delayed("a");
        queue.try_dispatch(Instant::now());
        assert!(queue.fail_and_retry("a").is_some());
        queue.requeue_delayed("a");
        queue.try_dispatch(Instant::now());
        assert!(queue.fail_and_retry("a").is_none());
        assert_eq!(queue.state_of("a"), Some(JobState::Failed));
    }
}
