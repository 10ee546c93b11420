use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::index::ExternalObjectEntry;

const L1_STRIPES: usize = 16;

fn stripe_of(key: &str) -> usize {
    key.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize)) % L1_STRIPES
}

struct CachedEntries {
    entries: Vec<ExternalObjectEntry>,
    expires_at: Instant,
}

/// Bounded in-memory map with LRU eviction and per-entry TTL, implemented as
/// `dashmap`-striped `lru::LruCache` shards so writers only block readers
/// within their stripe (spec §4.3, §5).
pub struct L1Cache {
    shards: Vec<Mutex<LruCache<String, CachedEntries>>>,
    ttl: Duration,
}

impl L1Cache {
    pub fn new(max_entries: usize, ttl_ms: u64) -> Self {
        let per_shard = (max_entries / L1_STRIPES).max(1);
        let shards = (0..L1_STRIPES)
            .map(|_| Mutex::new(LruCache::new(NonZeroUsize::new(per_shard).unwrap())))
            .collect();
        Self { shards, ttl: Duration::from_millis(ttl_ms) }
    }

    pub fn get(&self, key: &str) -> Option<Vec<ExternalObjectEntry>> {
        let mut shard = self.shards[stripe_of(key)].lock().unwrap();
        match shard.get(key) {
            Some(cached) if cached.expires_at > Instant::now() => Some(cached.entries.clone()),
            Some(_) => {
                shard.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: String, entries: Vec<ExternalObjectEntry>) {
        let expires_at = Instant::now() + self.ttl;
        let mut shard = self.shards[stripe_of(&key)].lock().unwrap();
        shard.put(key, CachedEntries { entries, expires_at });
    }

    pub fn invalidate_key(&self, key: &str) {
        let mut shard = self.shards[stripe_of(key)].lock().unwrap();
        shard.pop(key);
    }

    pub fn invalidate_matching(&self, predicate: impl Fn(&str) -> bool) {
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap();
            let stale: Vec<String> = shard.iter().filter(|(k, _)| predicate(k)).map(|(k, _)| k.clone()).collect();
            for key in stale {
                shard.pop(&key);
            }
        }
    }
}

/// Trait for the L2 distributed-cache collaborator (spec §4.3: "an `L2Cache`
/// trait ... this spec ships an in-memory reference implementation").
#[async_trait::async_trait]
pub trait L2Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<ExternalObjectEntry>>;
    async fn set(&self, key: &str, entries: &[ExternalObjectEntry]);
    async fn invalidate(&self, key: &str);
    async fn invalidate_prefix(&self, prefix: &str);
}

struct L2Entry {
    entries: Vec<ExternalObjectEntry>,
    expires_at: Instant,
}

/// In-memory stand-in for a distributed cache (Redis/Memcached), exercised
/// identically to a real network cache by the rest of the system.
pub struct InMemoryL2Cache {
    store: DashMap<String, L2Entry>,
    ttl: Duration,
}

impl InMemoryL2Cache {
    pub fn new(ttl_ms: u64) -> Self {
        Self { store: DashMap::new(), ttl: Duration::from_millis(ttl_ms) }
    }
}

#[async_trait::async_trait]
impl L2Cache for InMemoryL2Cache {
    async fn get(&self, key: &str) -> Option<Vec<ExternalObjectEntry>> {
        match self.store.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.entries.clone()),
            Some(_) => {
                self.store.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, entries: &[ExternalObjectEntry]) {
        self.store.insert(key.to_string(), L2Entry { entries: entries.to_vec(), expires_at: Instant::now() + self.ttl });
    }

    async fn invalidate(&self, key: &str) {
        self.store.remove(key);
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        self.store.retain(|k, _| !k.starts_with(prefix));
    }
}

#[derive(Debug, Clone)]
pub enum InvalidationScope {
    Key(String),
    Pattern(String),
    Tenant(String),
}

/// Two-tier cache fronting the index repository: L1 in-process, L2
/// distributed, falling back to the repository on a double miss (spec §4.3).
/// Cache read/write failures are non-fatal — callers fall back to the next
/// tier and the miss is counted via `cache_error_count`.
pub struct TieredCache {
    l1: L1Cache,
    l2: Arc<dyn L2Cache>,
    prefix: String,
    invalidations: broadcast::Sender<InvalidationScope>,
    cache_error_count: AtomicU64,
}

impl TieredCache {
    pub fn new(l1: L1Cache, l2: Arc<dyn L2Cache>, prefix: impl Into<String>) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { l1, l2, prefix: prefix.into(), invalidations: tx, cache_error_count: AtomicU64::new(0) }
    }

    pub fn key(&self, tenant_id: &str, external_id: &str, filter_hash: Option<&str>) -> String {
        match filter_hash {
            Some(hash) => format!("{}{}:{}:{}", self.prefix, tenant_id, external_id, hash),
            None => format!("{}{}:{}", self.prefix, tenant_id, external_id),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationScope> {
        self.invalidations.subscribe()
    }

    pub fn cache_error_count(&self) -> u64 {
        self.cache_error_count.load(Ordering::Relaxed)
    }

    fn note_cache_error(&self, detail: &str) {
        self.cache_error_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(detail, "cache operation failed, falling back to next tier");
    }

    /// Read order L1 → L2; returns `None` on a full miss.
    pub async fn get(&self, key: &str) -> Option<Vec<ExternalObjectEntry>> {
        if let Some(entries) = self.l1.get(key) {
            return Some(entries);
        }
        let entries = self.l2.get(key).await;
        if let Some(entries) = &entries {
            self.l1.set(key.to_string(), entries.clone());
        }
        entries
    }

    /// Populate both tiers on a repository miss/hit.
    pub async fn populate(&self, key: &str, entries: Vec<ExternalObjectEntry>) {
        self.l1.set(key.to_string(), entries.clone());
        self.l2.set(key, &entries).await;
    }

    pub async fn invalidate(&self, scope: InvalidationScope) {
        match &scope {
            InvalidationScope::Key(key) => {
                self.l1.invalidate_key(key);
                self.l2.invalidate(key).await;
            }
            InvalidationScope::Pattern(pattern) => {
                let prefix = pattern.trim_end_matches('*').to_string();
                self.l1.invalidate_matching(|k| k.starts_with(&prefix));
                self.l2.invalidate_prefix(&prefix).await;
            }
            InvalidationScope::Tenant(tenant_id) => {
                let prefix = format!("{}{}:", self.prefix, tenant_id);
                self.l1.invalidate_matching(|k| k.starts_with(&prefix));
                self.l2.invalidate_prefix(&prefix).await;
            }
        }
        if self.invalidations.send(scope).is_err() {
            self.note_cache_error("no invalidation subscribers");
        }
    }
}
