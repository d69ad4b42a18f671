//! Bounded in-memory cache tier (moka). Byte weight and entry count are
//! enforced as two independent bounds: moka's `max_capacity` + `weigher`
//! only ever cap total byte weight, so entry count is checked and trimmed
//! separately after every insert.

use moka::future::Cache as MokaCache;

use crate::cache::entry::CacheEntry;
use crate::fingerprint::Fingerprint;

pub struct MemoryTier {
    cache: MokaCache<Fingerprint, CacheEntry>,
    count_limit: u64,
}

impl MemoryTier {
    pub fn new(count_limit: u64, byte_limit: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(byte_limit)
            .weigher(|_key, entry: &CacheEntry| entry.weight())
            .build();
        Self { cache, count_limit: count_limit.max(1) }
    }

    pub async fn get(&self, fp: &Fingerprint) -> Option<CacheEntry> {
        self.cache.get(fp).await
    }

    /// Inserts `entry` under `fp`, then evicts the oldest remaining entries
    /// (by iteration order) until `count_limit` is satisfied. `entry_count`
    /// is moka's own approximate live count, refreshed by `run_pending_tasks`
    /// so the check below sees the insert we just made.
    pub async fn insert(&self, fp: Fingerprint, entry: CacheEntry) {
        self.cache.insert(fp.clone(), entry).await;
        self.cache.run_pending_tasks().await;

        while self.cache.entry_count() > self.count_limit {
            let Some(oldest) = self.cache.iter().map(|(k, _)| (*k).clone()).find(|k| *k != fp) else {
                break;
            };
            self.cache.invalidate(&oldest).await;
            self.cache.run_pending_tasks().await;
        }
    }

    pub async fn remove(&self, fp: &Fingerprint) {
        self.cache.invalidate(fp).await;
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub fn iter_keys(&self) -> Vec<Fingerprint> {
        self.cache.iter().map(|(k, _)| (*k).clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fp(s: &str) -> Fingerprint {
        crate::fingerprint::fingerprint_of(&http::Method::GET, s, &())
    }

    fn entry(bytes: &[u8]) -> CacheEntry {
        CacheEntry {
            bytes: bytes.to_vec().into(),
            written_at: Instant::now(),
            expiry: crate::expiry::Expiry::Never,
        }
    }

    #[tokio::test]
    async fn entry_count_is_capped_independently_of_byte_weight() {
        let tier = MemoryTier::new(3, 1024 * 1024);
        for i in 0..10 {
            tier.insert(fp(&format!("k{i}")), entry(b"x")).await;
        }
        assert!(tier.iter_keys().len() <= 3, "expected at most 3 entries, got {}", tier.iter_keys().len());
    }
}
