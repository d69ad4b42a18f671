//! Typed configuration for the process-wide `NetworkManager`.
//!
//! Mirrors the builder-with-sensible-defaults shape this corpus uses for
//! plugin configuration (e.g. idempotency/rate-limiter `Config`), generalized
//! to crate-wide tunables with an environment-variable overlay so deployments
//! can retune the cache and queue without a recompile.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables recognized by `NetworkManager::shared`/`NetworkManager::new`.
#[derive(Debug, Clone)]
pub struct NetworkManagerConfig {
    /// Maximum number of entries held in the memory cache tier.
    pub memory_count_limit: u64,
    /// Maximum total byte weight held in the memory cache tier.
    pub memory_byte_limit: u64,
    /// Maximum total byte weight held in the disk cache tier.
    pub disk_byte_limit: u64,
    /// Default concurrency cap applied to a `QueueDef` using `Concurrency::Default`.
    pub default_queue_concurrency: usize,
    /// Fixed per-request transport timeout.
    pub request_timeout: Duration,
    /// Directory holding one file per fingerprint for the disk cache tier.
    pub cache_dir: PathBuf,
}

impl Default for NetworkManagerConfig {
    fn default() -> Self {
        Self {
            memory_count_limit: 100,
            memory_byte_limit: 100 * 1024 * 1024,
            disk_byte_limit: 100 * 1024 * 1024,
            default_queue_concurrency: 4,
            request_timeout: Duration::from_secs(100),
            cache_dir: std::env::temp_dir().join("com.network.cache"),
        }
    }
}

impl NetworkManagerConfig {
    /// Starts from [`Default`] and overlays any recognized `TAKO_NET_*`
    /// environment variables. Malformed values are logged and ignored —
    /// the built-in default is kept rather than aborting startup.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = parse_env("TAKO_NET_MEMORY_COUNT_LIMIT") {
            cfg.memory_count_limit = v;
        }
        if let Some(v) = parse_env("TAKO_NET_MEMORY_BYTE_LIMIT") {
            cfg.memory_byte_limit = v;
        }
        if let Some(v) = parse_env("TAKO_NET_DISK_BYTE_LIMIT") {
            cfg.disk_byte_limit = v;
        }
        if let Some(v) = parse_env("TAKO_NET_QUEUE_CONCURRENCY") {
            cfg.default_queue_concurrency = v;
        }
        if let Some(v) = parse_env::<u64>("TAKO_NET_REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(v);
        }
        if let Ok(dir) = std::env::var("TAKO_NET_CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(dir);
        }

        cfg
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, raw, "ignoring malformed environment override");
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = NetworkManagerConfig::default();
        assert_eq!(cfg.memory_count_limit, 100);
        assert_eq!(cfg.request_timeout, Duration::from_secs(100));
    }

    #[test]
    fn malformed_env_override_is_ignored() {
        // SAFETY: test-local env var, no concurrent readers of this key in this process.
        unsafe { std::env::set_var("TAKO_NET_MEMORY_COUNT_LIMIT", "not-a-number") };
        let cfg = NetworkManagerConfig::from_env();
        assert_eq!(cfg.memory_count_limit, 100);
        unsafe { std::env::remove_var("TAKO_NET_MEMORY_COUNT_LIMIT") };
    }
}
