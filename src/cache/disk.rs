//! Bounded on-disk cache tier: one file per fingerprint under a configured
//! directory. Metadata (expiry, size, recency) lives only in memory — it is
//! rebuilt as entries are written or read back, not persisted across
//! restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::RwLock;

use crate::cache::entry::CacheEntry;
use crate::expiry::Expiry;
use crate::fingerprint::Fingerprint;

struct Meta {
    expiry: Expiry,
    written_at: Instant,
    last_touched: Instant,
    size: u64,
}

pub struct DiskTier {
    dir: PathBuf,
    byte_limit: u64,
    meta: RwLock<HashMap<Fingerprint, Meta>>,
}

impl DiskTier {
    pub fn new(dir: PathBuf, byte_limit: u64) -> Self {
        Self {
            dir,
            byte_limit,
            meta: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, fp: &Fingerprint) -> PathBuf {
        self.dir.join(fp.hex())
    }

    async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub async fn get(&self, fp: &Fingerprint) -> Option<CacheEntry> {
        let (expiry, written_at) = {
            let meta = self.meta.read().await;
            let m = meta.get(fp)?;
            (m.expiry, m.written_at)
        };
        let bytes = tokio::fs::read(self.path_for(fp)).await.ok()?;
        {
            let mut meta = self.meta.write().await;
            if let Some(m) = meta.get_mut(fp) {
                m.last_touched = Instant::now();
            }
        }
        Some(CacheEntry {
            bytes: bytes.into(),
            written_at,
            expiry,
        })
    }

    /// Writes `entry` to disk. A write failure is returned to the caller to
    /// log; the in-memory tier remains authoritative regardless.
    pub async fn put(&self, fp: &Fingerprint, entry: &CacheEntry) -> std::io::Result<()> {
        self.ensure_dir().await?;
        tokio::fs::write(self.path_for(fp), &entry.bytes).await?;
        let size = entry.bytes.len() as u64;
        {
            let mut meta = self.meta.write().await;
            meta.insert(
                fp.clone(),
                Meta {
                    expiry: entry.expiry,
                    written_at: entry.written_at,
                    last_touched: entry.written_at,
                    size,
                },
            );
        }
        self.evict_to_budget().await;
        Ok(())
    }

    pub async fn expiry(&self, fp: &Fingerprint) -> Option<Expiry> {
        self.meta.read().await.get(fp).map(|m| m.expiry)
    }

    pub async fn set_expiry(&self, fp: &Fingerprint, expiry: Expiry) {
        if let Some(m) = self.meta.write().await.get_mut(fp) {
            m.expiry = expiry;
        }
    }

    pub async fn remove(&self, fp: &Fingerprint) {
        self.meta.write().await.remove(fp);
        let _ = tokio::fs::remove_file(self.path_for(fp)).await;
    }

    pub async fn remove_expired(&self, now: Instant) -> Vec<Fingerprint> {
        let expired: Vec<Fingerprint> = {
            let meta = self.meta.read().await;
            meta.iter()
                .filter(|(_, m)| m.expiry.is_expired(now))
                .map(|(fp, _)| fp.clone())
                .collect()
        };
        for fp in &expired {
            self.remove(fp).await;
        }
        expired
    }

    pub async fn clear(&self) {
        let keys: Vec<Fingerprint> = self.meta.read().await.keys().cloned().collect();
        for fp in keys {
            self.remove(&fp).await;
        }
    }

    /// Expired-first, then least-recently-touched, until total tracked size
    /// is back under `byte_limit`.
    async fn evict_to_budget(&self) {
        let now = Instant::now();
        let mut meta = self.meta.write().await;
        let mut total: u64 = meta.values().map(|m| m.size).sum();
        if total <= self.byte_limit {
            return;
        }

        let mut candidates: Vec<(Fingerprint, bool, Instant)> = meta
            .iter()
            .map(|(fp, m)| (fp.clone(), m.expiry.is_expired(now), m.last_touched))
            .collect();
        candidates.sort_by(|a, b| match (a.1, b.1) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.2.cmp(&b.2),
        });

        for (fp, _, _) in candidates {
            if total <= self.byte_limit {
                break;
            }
            if let Some(m) = meta.remove(&fp) {
                total = total.saturating_sub(m.size);
                let path = self.path_for(&fp);
                tokio::spawn(async move {
                    let _ = tokio::fs::remove_file(path).await;
                });
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
