//! `NetworkManager`: the façade that ties fingerprinting, the cache,
//! the observer registry, coalescing, and the queue manager together into
//! the three entry points a descriptor's caller actually uses —
//! `request`, `request_async`, and `observe` — plus the process-wide
//! singleton.
//!
//! Grounded on `state::GLOBAL_STATE`'s `once_cell::sync::Lazy`-backed global
//! for the singleton, and on `signals::SignalArbiter`'s map-of-handlers shape
//! for wiring the cache's change events into the observer registry.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::cache::{Cache, ChangeEvent};
use crate::coalescer::{self, MergeOutcome};
use crate::config::NetworkManagerConfig;
use crate::descriptor::Requestable;
use crate::error::Error;
use crate::expiry::{shorter_policy_forces_refresh, CachePolicy};
use crate::fingerprint::{fingerprint_of, Fingerprint};
use crate::network_task::{NetworkTask, NetworkTaskDeps};
use crate::observer::{CancellationToken, ObserverRegistry};
use crate::queue::QueueManager;
use crate::transport::{HyperTransport, Transport};
use crate::url_builder;

type AnyWeak = Weak<dyn Any + Send + Sync>;
type ResultCallback<R> = Arc<dyn Fn(Result<Arc<R>, Arc<Error>>) + Send + Sync>;

static SHARED: OnceCell<NetworkManager> = OnceCell::new();

enum CacheLookup<T> {
    Fresh(T),
    Stale(T),
    Miss,
}

/// Process-wide façade over the coalescing/caching/scheduling core.
///
/// Cheap to clone: every field is itself an `Arc` or an internally-`Arc`'d
/// handle, so handing out a `NetworkManager` to callers is just a refcount
/// bump, the same way `QueueManager` and `ObserverRegistry` are designed.
#[derive(Clone)]
pub struct NetworkManager {
    config: Arc<NetworkManagerConfig>,
    queues: QueueManager,
    cache: Arc<Cache>,
    observers: ObserverRegistry,
    transport: Arc<dyn Transport>,
    observer_dedup: Arc<DashMap<Fingerprint, Vec<(AnyWeak, CancellationToken)>>>,
}

impl NetworkManager {
    pub fn new(config: NetworkManagerConfig, transport: Arc<dyn Transport>) -> Self {
        let queues = QueueManager::new(config.default_queue_concurrency);
        let cache = Arc::new(Cache::new(
            config.memory_count_limit,
            config.memory_byte_limit,
            config.disk_byte_limit,
            config.cache_dir.clone(),
        ));

        let demote_queues = queues.clone();
        let observers = ObserverRegistry::new(move |fp| {
            let queues = demote_queues.clone();
            let fp = fp.clone();
            tokio::spawn(async move { queues.demote_to_very_low(&fp).await });
        });

        let change_cache = cache.clone();
        let change_observers = observers.clone();
        cache.on_change(move |event| {
            if let ChangeEvent::Add(fp) = event {
                let cache = change_cache.clone();
                let observers = change_observers.clone();
                let fp = fp.clone();
                tokio::spawn(async move {
                    if let Some(bytes) = cache.get(&fp).await {
                        observers.deliver(&fp, &bytes);
                    }
                });
            }
        });

        Self {
            config: Arc::new(config),
            queues,
            cache,
            observers,
            transport,
            observer_dedup: Arc::new(DashMap::new()),
        }
    }

    /// The process-wide instance, created lazily on first use from
    /// [`NetworkManagerConfig::from_env`] and a default [`HyperTransport`].
    /// Tests that need a fake transport should call [`NetworkManager::set_shared`]
    /// before anything else touches `shared()`.
    pub fn shared() -> NetworkManager {
        SHARED
            .get_or_init(|| NetworkManager::new(NetworkManagerConfig::from_env(), Arc::new(HyperTransport::new())))
            .clone()
    }

    /// Installs `manager` as the process-wide singleton. Fails (returning the
    /// rejected manager) if `shared()` has already initialized one — the
    /// singleton can only be set once, the same as `OnceCell::set`.
    pub fn set_shared(manager: NetworkManager) -> Result<(), NetworkManager> {
        SHARED.set(manager)
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Current scheduling priority of the task identified by `fp`, if any
    /// queue still knows about it (pending or running). Exposed mainly for
    /// tests watching priority demotion after an observer cancels.
    pub async fn priority_of(&self, fp: &Fingerprint) -> Option<crate::task::PriorityOrdinal> {
        self.queues.priority_of(fp).await
    }

    /// Fire-and-forget entry point: `callback` is invoked exactly once, from
    /// a background task, with the outcome.
    pub fn request<D>(&self, descriptor: Arc<D>, params: D::Params, callback: impl Fn(Result<Arc<D::Response>, Arc<Error>>) + Send + Sync + 'static)
    where
        D: Requestable,
    {
        let manager = self.clone();
        let callback: ResultCallback<D::Response> = Arc::new(callback);
        tokio::spawn(async move {
            manager.request_inner(descriptor, params, Some(callback)).await;
        });
    }

    /// Async entry point built on [`NetworkManager::request`]: resolves once
    /// the underlying task (or cache hit) produces a result.
    pub async fn request_async<D>(&self, descriptor: Arc<D>, params: D::Params) -> Result<Arc<D::Response>, Arc<Error>>
    where
        D: Requestable,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = parking_lot::Mutex::new(Some(tx));
        self.request(descriptor, params, move |result| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(result);
            }
        });
        rx.await.unwrap_or_else(|_| Err(Arc::new(Error::NoResponse)))
    }

    /// Subscribes `target` to every future value produced for this
    /// descriptor/params pair, delivering the current cached value (if any)
    /// immediately and triggering a fetch when the cache is empty or stale.
    ///
    /// Registering the same `target` twice for the same fingerprint returns
    /// the existing token instead of adding a second delivery path.
    pub fn observe<D, O>(
        &self,
        descriptor: Arc<D>,
        params: D::Params,
        target: &Arc<O>,
        callback: impl Fn(&D::Response) + Send + Sync + 'static,
    ) -> CancellationToken
    where
        D: Requestable,
        O: Any + Send + Sync,
    {
        let (fp, url_result) = fingerprint_and_url(descriptor.as_ref(), &params);

        if let Some(token) = self.existing_observer_token(&fp, target) {
            return token;
        }

        let callback: Arc<dyn Fn(&D::Response) + Send + Sync> = Arc::new(callback);
        let decode_descriptor = descriptor.clone();
        let wire_callback = callback.clone();
        let token = self.observers.add_observer(fp.clone(), target, move |bytes| match decode_descriptor.decode(bytes) {
            Ok(value) => wire_callback(&value),
            Err(err) => tracing::debug!(error = %err, "observer callback skipped: undecodable payload"),
        });

        self.observer_dedup
            .entry(fp.clone())
            .or_default()
            .push((Arc::downgrade(target) as AnyWeak, token.clone()));

        let manager = self.clone();
        tokio::spawn(async move {
            let cache_policy = descriptor.cache_policy();
            let mut needs_fetch = true;
            if let Some(policy) = cache_policy {
                match manager.cache_lookup(&descriptor, &fp, policy).await {
                    CacheLookup::Fresh(value) => {
                        callback(&value);
                        needs_fetch = false;
                    }
                    CacheLookup::Stale(value) => callback(&value),
                    CacheLookup::Miss => {}
                }
            }
            if needs_fetch {
                manager.dispatch_network_task(descriptor, params, fp, url_result, cache_policy, None).await;
            }
        });

        token
    }

    fn existing_observer_token<O: Any + Send + Sync>(&self, fp: &Fingerprint, target: &Arc<O>) -> Option<CancellationToken> {
        let target_weak: AnyWeak = Arc::downgrade(target);
        let mut entries = self.observer_dedup.get_mut(fp)?;
        entries.retain(|(weak, token)| weak.strong_count() > 0 && !token.is_cancelled());
        entries.iter().find(|(weak, _)| Weak::ptr_eq(weak, &target_weak)).map(|(_, token)| token.clone())
    }

    async fn request_inner<D: Requestable>(&self, descriptor: Arc<D>, params: D::Params, callback: Option<ResultCallback<D::Response>>) {
        let (fp, url_result) = fingerprint_and_url(descriptor.as_ref(), &params);
        let cache_policy = descriptor.cache_policy();

        if let Some(policy) = cache_policy {
            match self.cache_lookup(&descriptor, &fp, policy).await {
                CacheLookup::Fresh(value) => {
                    if let Some(cb) = callback {
                        cb(Ok(value));
                    }
                    return;
                }
                CacheLookup::Stale(value) => {
                    if let Some(cb) = &callback {
                        cb(Ok(value));
                    }
                    self.dispatch_network_task(descriptor, params, fp, url_result, cache_policy, None).await;
                    return;
                }
                CacheLookup::Miss => {}
            }
        }

        self.dispatch_network_task(descriptor, params, fp, url_result, cache_policy, callback).await;
    }

    /// Reads through the cache, applying the shorter-policy-forces-refresh
    /// rule and `return_cached_data_if_expired` before deciding whether a
    /// cached value is usable.
    async fn cache_lookup<D: Requestable>(&self, descriptor: &Arc<D>, fp: &Fingerprint, policy: CachePolicy) -> CacheLookup<Arc<D::Response>> {
        let Some(expiry) = self.cache.expiry(fp).await else {
            return CacheLookup::Miss;
        };
        let now = Instant::now();
        if shorter_policy_forces_refresh(&policy, expiry, now) {
            return CacheLookup::Miss;
        }
        let Some(bytes) = self.cache.get(fp).await else {
            return CacheLookup::Miss;
        };
        match descriptor.decode(&bytes) {
            Ok(value) if expiry.is_expired(now) => {
                if descriptor.return_cached_data_if_expired() {
                    CacheLookup::Stale(Arc::new(value))
                } else {
                    CacheLookup::Miss
                }
            }
            Ok(value) => CacheLookup::Fresh(Arc::new(value)),
            Err(err) => {
                tracing::debug!(fingerprint = %fp, error = %err, "cache entry no longer decodes, forcing refresh");
                self.cache.remove(fp).await;
                CacheLookup::Miss
            }
        }
    }

    /// Builds the `NetworkTask` for a miss/stale lookup, attempts to fold it
    /// into an already in-flight task of the same fingerprint, and falls
    /// back to enqueueing it independently.
    async fn dispatch_network_task<D: Requestable>(
        &self,
        descriptor: Arc<D>,
        params: D::Params,
        fp: Fingerprint,
        url_result: Result<url::Url, Error>,
        cache_policy: Option<CachePolicy>,
        callback: Option<ResultCallback<D::Response>>,
    ) {
        if let Err(err) = url_result {
            if let Some(cb) = callback {
                cb(Err(Arc::new(err)));
            }
            return;
        }

        let merge_policy = descriptor.merge_policy();
        let queue_def = descriptor.queue();
        let deps = NetworkTaskDeps {
            transport: self.transport.clone(),
            cache: self.cache.clone(),
            request_timeout: self.config.request_timeout,
        };

        let task = Arc::new(NetworkTask::new(fp.clone(), descriptor, params, cache_policy, deps));
        if let Some(cb) = callback {
            task.add_result_callback(move |result| cb(result));
        }

        let queue = self.queues.queue_for(&queue_def);
        if merge_policy.evaluate() {
            // `merge_or_enqueue` holds the queue's lock across both the
            // candidate search and the admission, so two concurrent callers
            // for the same fingerprint can never both see `NotFound`.
            match queue.merge_or_enqueue(task, |candidates, new_task| coalescer::try_merge(candidates, new_task)).await {
                MergeOutcome::Merged | MergeOutcome::NotFound => {}
                MergeOutcome::Incompatible => {
                    tracing::warn!(fingerprint = %fp, "merge target incompatible, admitting independently");
                }
            }
            return;
        }

        queue.enqueue(task).await;
    }
}

fn descriptor_url<D: Requestable>(descriptor: &D, params: &D::Params) -> Result<url::Url, Error> {
    let host = descriptor.host(params);
    let port = descriptor.port(params);
    let path = descriptor.path(params);
    let query = descriptor.as_query(params);
    url_builder::compose(D::SCHEME, &host, port, &path, query.as_ref())
}

/// Computes both the fingerprint and the composed URL in one pass. A URL
/// composition failure still yields a usable (if less specific) fingerprint,
/// falling back to the structural hash the same way [`fingerprint_of`] does
/// for an undigestable parameter set, so a single bad descriptor never
/// aborts the caller — it just fails later, at dispatch time, with
/// [`Error::InvalidUrl`].
fn fingerprint_and_url<D: Requestable>(descriptor: &D, params: &D::Params) -> (Fingerprint, Result<url::Url, Error>) {
    let url_result = descriptor_url(descriptor, params);
    let fp = match &url_result {
        Ok(url) => fingerprint_of(&D::METHOD, url.as_str(), params),
        Err(err) => Fingerprint::from_structural_hash(&D::METHOD, &descriptor.host(params), &err.to_string()),
    };
    (fp, url_result)
}
