//! Black-box integration tests against the public `NetworkManager` façade:
//! each test drives one end-to-end scenario through a stub `Transport`, with
//! no real sockets opened and, where timing matters, a paused tokio clock
//! advanced by hand for determinism.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;

use networkit::config::NetworkManagerConfig;
use networkit::descriptor::{decode_json, Requestable};
use networkit::error::Error;
use networkit::expiry::CachePolicy;
use networkit::fingerprint::fingerprint_of;
use networkit::orchestrator::NetworkManager;
use networkit::task::{Concurrency, PriorityOrdinal, QueueDef};
use networkit::transport::{Transport, TransportRequest, TransportResponse};
use networkit::url_builder::{self, UrlPath};

struct StubTransport {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    bodies: Mutex<VecDeque<&'static [u8]>>,
}

impl StubTransport {
    fn new(delay: Duration, bodies: Vec<&'static [u8]>) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(Self {
            calls: calls.clone(),
            delay,
            bodies: Mutex::new(bodies.into()),
        });
        (transport, calls)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = {
            let mut bodies = self.bodies.lock().unwrap();
            bodies.pop_front().unwrap_or(b"{}")
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let (parts, _) = http::Response::builder().status(200).body(()).unwrap().into_parts();
        Ok(TransportResponse { parts, body: body.to_vec() })
    }
}

fn test_manager(transport: Arc<dyn Transport>) -> NetworkManager {
    let mut config = NetworkManagerConfig::default();
    config.cache_dir = std::env::temp_dir().join(format!("networkit-scenarios-{}", uuid::Uuid::new_v4()));
    NetworkManager::new(config, transport)
}

/// A single reusable descriptor shape: fixed host, a per-test path, and a
/// cache policy chosen by the caller.
struct Item {
    path: &'static str,
    policy: Option<CachePolicy>,
}

impl Requestable for Item {
    type Params = ();
    type Response = serde_json::Value;
    const METHOD: Method = Method::GET;

    fn host(&self, _params: &()) -> String {
        "example.com".to_string()
    }

    fn path(&self, _params: &()) -> UrlPath {
        UrlPath::new(self.path)
    }

    fn decode(&self, data: &[u8]) -> Result<Self::Response, Error> {
        decode_json(data)
    }

    fn cache_policy(&self) -> Option<CachePolicy> {
        self.policy
    }
}

/// Descriptor pair sharing a one-slot queue, used to keep a second task
/// pending behind an already-running one.
struct SlowOccupant;

impl Requestable for SlowOccupant {
    type Params = ();
    type Response = serde_json::Value;
    const METHOD: Method = Method::GET;

    fn host(&self, _params: &()) -> String {
        "example.com".to_string()
    }

    fn path(&self, _params: &()) -> UrlPath {
        UrlPath::new("occupant")
    }

    fn decode(&self, data: &[u8]) -> Result<Self::Response, Error> {
        decode_json(data)
    }

    fn queue(&self) -> QueueDef {
        QueueDef::new("one-slot", 0, Concurrency::Limit(1))
    }
}

struct SlowTarget;

impl Requestable for SlowTarget {
    type Params = ();
    type Response = serde_json::Value;
    const METHOD: Method = Method::GET;

    fn host(&self, _params: &()) -> String {
        "example.com".to_string()
    }

    fn path(&self, _params: &()) -> UrlPath {
        UrlPath::new("target")
    }

    fn decode(&self, data: &[u8]) -> Result<Self::Response, Error> {
        decode_json(data)
    }

    fn queue(&self) -> QueueDef {
        QueueDef::new("one-slot", 0, Concurrency::Limit(1))
    }
}

fn fp_for(path: &str) -> networkit::Fingerprint {
    let url = url_builder::compose("https", "example.com", None, &UrlPath::new(path), None).unwrap();
    fingerprint_of(&Method::GET, url.as_str(), &())
}

async fn drain() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn cache_hit_delivers_synchronously_without_transport_call() {
    let (transport, calls) = StubTransport::new(Duration::ZERO, vec![]);
    let manager = test_manager(transport);

    let fp = fp_for("cache-hit");
    manager
        .cache()
        .put(&fp, Bytes::from_static(br#"{"ok":true}"#), CachePolicy::Timed(Duration::from_secs(60)))
        .await;

    let descriptor = Arc::new(Item {
        path: "cache-hit",
        policy: Some(CachePolicy::Timed(Duration::from_secs(60))),
    });
    let value = manager.request_async(descriptor, ()).await.unwrap();

    assert_eq!(*value, serde_json::json!({"ok": true}));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_on_the_same_fingerprint_coalesce_into_one_transport_call() {
    let (transport, calls) = StubTransport::new(Duration::from_millis(30), vec![br#"{"ok":true}"#]);
    let manager = test_manager(transport);
    let descriptor = Arc::new(Item { path: "coalesce", policy: None });

    let results = futures_util::future::join_all((0..6).map(|_| manager.request_async(descriptor.clone(), ()))).await;

    for r in results {
        assert_eq!(*r.unwrap(), serde_json::json!({"ok": true}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn observer_delivers_stale_value_then_fresh_value_after_refresh() {
    tokio::time::pause();

    let (transport, calls) = StubTransport::new(Duration::from_millis(50), vec![br#"{"value":"new"}"#]);
    let manager = test_manager(transport);

    let fp = fp_for("refresh");
    manager.cache().put(&fp, Bytes::from_static(br#"{"value":"old"}"#), CachePolicy::ExpireImmediately).await;

    let descriptor = Arc::new(Item {
        path: "refresh",
        policy: Some(CachePolicy::Timed(Duration::from_secs(60))),
    });
    let target = Arc::new(());
    let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let _token = manager.observe(descriptor, (), &target, move |value| {
        sink.lock().unwrap().push(value.clone());
    });

    drain().await;
    assert_eq!(*received.lock().unwrap(), vec![serde_json::json!({"value": "old"})]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(60)).await;
    drain().await;

    assert_eq!(
        *received.lock().unwrap(),
        vec![serde_json::json!({"value": "old"}), serde_json::json!({"value": "new"})]
    );
}

#[tokio::test]
async fn a_shorter_policy_forces_refresh_even_though_the_stored_entry_is_fresh() {
    let (transport, calls) = StubTransport::new(Duration::ZERO, vec![br#"{"ok":true}"#]);
    let manager = test_manager(transport);

    let fp = fp_for("shorter-policy");
    manager
        .cache()
        .put(&fp, Bytes::from_static(br#"{"ok":true}"#), CachePolicy::Timed(Duration::from_secs(3600)))
        .await;

    let descriptor = Arc::new(Item {
        path: "shorter-policy",
        policy: Some(CachePolicy::Timed(Duration::from_secs(60))),
    });
    manager.request_async(descriptor, ()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelling_the_sole_observer_demotes_a_still_pending_tasks_priority() {
    let (transport, _calls) = StubTransport::new(Duration::from_millis(200), vec![br#"{"ok":true}"#, br#"{"ok":true}"#]);
    let manager = test_manager(transport);

    manager.request(Arc::new(SlowOccupant), (), |_| {});
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fp = fp_for("target");
    let target = Arc::new(());
    let token = manager.observe(Arc::new(SlowTarget), (), &target, |_| {});
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(manager.priority_of(&fp).await, Some(PriorityOrdinal::NORMAL));

    token.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(manager.priority_of(&fp).await, Some(PriorityOrdinal::VERY_LOW));
}

#[tokio::test]
async fn registering_the_same_target_twice_reuses_the_first_token() {
    let (transport, _calls) = StubTransport::new(Duration::from_millis(10), vec![br#"{"ok":true}"#]);
    let manager = test_manager(transport);
    let descriptor = Arc::new(Item { path: "duplicate-observer", policy: None });
    let target = Arc::new(());

    let t1 = manager.observe(descriptor.clone(), (), &target, |_| {});
    let t2 = manager.observe(descriptor, (), &target, |_| {});

    assert!(t1.fingerprint() == t2.fingerprint());
    t1.cancel();
    assert!(t2.is_cancelled());
}
