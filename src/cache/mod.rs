//! Two-tier (memory + disk) cache.
//!
//! Reads consult memory first, then disk, promoting a disk hit back into
//! memory. Writes go through both tiers under a per-fingerprint critical
//! section so an `Add` event is never emitted twice for one write, and never
//! interleaved with a `get` of the same key returning a half-written value.

pub mod disk;
pub mod entry;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::delegate::MulticastDelegate;
use crate::expiry::{CachePolicy, Expiry};
use crate::fingerprint::Fingerprint;

pub use entry::{CacheEntry, ChangeEvent};

use disk::DiskTier;
use memory::MemoryTier;

pub struct Cache {
    memory: MemoryTier,
    disk: DiskTier,
    locks: DashMap<Fingerprint, Arc<AsyncMutex<()>>>,
    on_change: MulticastDelegate<ChangeEvent>,
}

impl Cache {
    pub fn new(memory_count_limit: u64, memory_byte_limit: u64, disk_byte_limit: u64, cache_dir: PathBuf) -> Self {
        Self {
            memory: MemoryTier::new(memory_count_limit, memory_byte_limit),
            disk: DiskTier::new(cache_dir, disk_byte_limit),
            locks: DashMap::new(),
            on_change: MulticastDelegate::new(),
        }
    }

    fn lock_for(&self, fp: &Fingerprint) -> Arc<AsyncMutex<()>> {
        self.locks.entry(fp.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Registers a detached listener for cache change events. Used by the
    /// orchestrator to wire `Add` events into the observer registry.
    pub fn on_change(&self, callback: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.on_change.add_detached(callback);
    }

    pub async fn get(&self, fp: &Fingerprint) -> Option<Bytes> {
        if let Some(entry) = self.memory.get(fp).await {
            return Some(entry.bytes);
        }
        let entry = self.disk.get(fp).await?;
        self.memory.insert(fp.clone(), entry.clone()).await;
        Some(entry.bytes)
    }

    /// Writes `bytes` under `fp` with `policy`, through both tiers, emitting
    /// exactly one `Add` event. Disk I/O failure is logged and does not fail
    /// the write — the memory tier remains authoritative.
    pub async fn put(&self, fp: &Fingerprint, bytes: Bytes, policy: CachePolicy) {
        let lock = self.lock_for(fp);
        let _guard = lock.lock().await;

        let now = Instant::now();
        let expiry = policy.deadline(now);
        let entry = CacheEntry {
            bytes,
            written_at: now,
            expiry,
        };

        self.memory.insert(fp.clone(), entry.clone()).await;
        if let Err(err) = self.disk.put(fp, &entry).await {
            tracing::warn!(fingerprint = %fp, error = %err, "cache disk write failed, memory copy remains authoritative");
        }

        self.on_change.invoke(&ChangeEvent::Add(fp.clone()));
    }

    pub async fn is_expired(&self, fp: &Fingerprint) -> bool {
        match self.expiry(fp).await {
            Some(expiry) => expiry.is_expired(Instant::now()),
            None => true,
        }
    }

    pub async fn expiry(&self, fp: &Fingerprint) -> Option<Expiry> {
        if let Some(entry) = self.memory.get(fp).await {
            return Some(entry.expiry);
        }
        self.disk.expiry(fp).await
    }

    /// Forces `fp` to read as expired without discarding its bytes.
    pub async fn expire(&self, fp: &Fingerprint) {
        let lock = self.lock_for(fp);
        let _guard = lock.lock().await;
        let now = Instant::now();
        if let Some(mut entry) = self.memory.get(fp).await {
            entry.expiry = Expiry::At(now);
            self.memory.insert(fp.clone(), entry).await;
        }
        self.disk.set_expiry(fp, Expiry::At(now)).await;
    }

    pub async fn remove(&self, fp: &Fingerprint) {
        let lock = self.lock_for(fp);
        let guard = lock.lock().await;
        self.memory.remove(fp).await;
        self.disk.remove(fp).await;
        drop(guard);
        self.locks.remove(fp);
        self.on_change.invoke(&ChangeEvent::Remove(fp.clone()));
    }

    /// Drops expired entries from both tiers and their per-fingerprint lock
    /// entries — `locks` is otherwise only ever trimmed in bulk by
    /// `remove_all`, and a long-running process sees many distinct
    /// fingerprints over its lifetime.
    pub async fn remove_expired(&self) {
        let now = Instant::now();
        let memory_keys = self.memory.iter_keys();
        for fp in &memory_keys {
            let lock = self.lock_for(fp);
            let guard = lock.lock().await;
            if let Some(entry) = self.memory.get(fp).await {
                if entry.expiry.is_expired(now) {
                    self.memory.remove(fp).await;
                    drop(guard);
                    self.locks.remove(fp);
                }
            }
        }
        let disk_expired = self.disk.remove_expired(now).await;
        for fp in &disk_expired {
            self.locks.remove(fp);
        }
        self.on_change.invoke(&ChangeEvent::RemoveExpired);
    }

    pub async fn remove_all(&self) {
        self.memory.clear().await;
        self.disk.clear().await;
        self.locks.clear();
        self.on_change.invoke(&ChangeEvent::RemoveAll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn fp(s: &str) -> Fingerprint {
        crate::fingerprint::fingerprint_of(&Method::GET, s, &())
    }

    fn test_cache() -> Cache {
        let dir = std::env::temp_dir().join(format!("networkit-cache-test-{}", uuid::Uuid::new_v4()));
        Cache::new(100, 1024 * 1024, 1024 * 1024, dir)
    }

    #[tokio::test]
    async fn round_trip() {
        let cache = test_cache();
        let fp = fp("a");
        cache.put(&fp, Bytes::from_static(b"hello"), CachePolicy::Forever).await;
        assert_eq!(cache.get(&fp).await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn missing_entry_counts_as_expired() {
        let cache = test_cache();
        assert!(cache.is_expired(&fp("missing")).await);
    }

    #[tokio::test]
    async fn expire_immediately_is_expired_but_readable() {
        let cache = test_cache();
        let fp = fp("a");
        cache.put(&fp, Bytes::from_static(b"x"), CachePolicy::ExpireImmediately).await;
        assert!(cache.is_expired(&fp).await);
        assert_eq!(cache.get(&fp).await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn put_emits_exactly_one_add_event() {
        let cache = test_cache();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count2 = count.clone();
        cache.on_change(move |event| {
            if matches!(event, ChangeEvent::Add(_)) {
                count2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        });
        cache.put(&fp("a"), Bytes::from_static(b"x"), CachePolicy::Forever).await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remove_all_clears_everything() {
        let cache = test_cache();
        cache.put(&fp("a"), Bytes::from_static(b"x"), CachePolicy::Forever).await;
        cache.remove_all().await;
        assert!(cache.get(&fp("a")).await.is_none());
    }

    #[tokio::test]
    async fn remove_drops_the_fingerprints_lock_entry() {
        let cache = test_cache();
        cache.put(&fp("a"), Bytes::from_static(b"x"), CachePolicy::Forever).await;
        assert_eq!(cache.locks.len(), 1);
        cache.remove(&fp("a")).await;
        assert_eq!(cache.locks.len(), 0);
    }

    #[tokio::test]
    async fn remove_expired_drops_the_fingerprints_lock_entry() {
        let cache = test_cache();
        cache.put(&fp("a"), Bytes::from_static(b"x"), CachePolicy::ExpireImmediately).await;
        assert_eq!(cache.locks.len(), 1);
        cache.remove_expired().await;
        assert_eq!(cache.locks.len(), 0);
    }
}
