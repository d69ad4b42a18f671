#![cfg_attr(docsrs, feature(doc_cfg))]

//! A declarative networking core: request fingerprinting, coalescing,
//! two-tier caching, priority-scheduled dispatch, and observer fan-out for
//! client-side HTTP.
//!
//! A caller declares *what* a request is — method, host, path, parameters,
//! how to decode the response, and whether the result belongs in the cache —
//! by implementing [`descriptor::Requestable`], then drives it through
//! [`orchestrator::NetworkManager`]. The manager fingerprints the request,
//! folds it into any identical in-flight call, schedules it onto a priority
//! queue, runs it through a pluggable [`transport::Transport`], and fans the
//! result out to every caller that asked for it — either once (`request`)
//! or continuously (`observe`).
//!
//! # High-level features
//! - Deterministic SHA-256 request fingerprinting over method, URL, and
//!   canonical parameters
//! - Request coalescing: duplicate in-flight calls merge instead of
//!   re-issuing the request
//! - Two-tier (memory + disk) response cache with per-descriptor expiry
//!   policies
//! - Weak-referenced observer registry for long-lived subscriptions
//! - Priority-ordered, per-queue concurrency-bounded task scheduling
//!
//! # Compatibility
//! - Runtime: `tokio`
//! - HTTP: `hyper` 1.x (pluggable via [`transport::Transport`])
//!
//! # Quickstart
//!
//! ```rust,no_run
//! use networkit::descriptor::Requestable;
//! use networkit::error::Error;
//! use networkit::orchestrator::NetworkManager;
//! use networkit::url_builder::UrlPath;
//! use http::Method;
//! use std::sync::Arc;
//!
//! struct GetUser;
//!
//! impl Requestable for GetUser {
//!     type Params = u64;
//!     type Response = serde_json::Value;
//!     const METHOD: Method = Method::GET;
//!
//!     fn host(&self, _params: &u64) -> String {
//!         "api.example.com".to_string()
//!     }
//!
//!     fn path(&self, id: &u64) -> UrlPath {
//!         UrlPath::root() / "users" / id.to_string()
//!     }
//!
//!     fn decode(&self, data: &[u8]) -> Result<Self::Response, Error> {
//!         networkit::descriptor::decode_json(data)
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = NetworkManager::shared();
//! let user = manager.request_async(Arc::new(GetUser), 42).await?;
//! println!("{user}");
//! # Ok(())
//! # }
//! ```
//!
//! # Key concepts
//! - [descriptor::Requestable] declares a request and its decode/cache/merge behavior.
//! - [orchestrator::NetworkManager] is the façade callers interact with.
//! - [fingerprint] derives the identity two requests are considered "the same" under.
//! - [cache] is the two-tier response store.
//! - [observer] and [delegate] back long-lived subscriptions and lifecycle fan-out.
//! - [queue] and [task] implement priority-ordered, concurrency-bounded scheduling.
//! - [coalescer] folds duplicate in-flight requests together.
//! - [transport] abstracts the actual HTTP client.
//!
//! # Feature flags
//! - `tls` — TLS support (rustls) in the default [`transport::HyperTransport`]
//! - `networkit-tracing` — structured tracing subscriber via [`logging::init_tracing`]

/// Two-tier (memory + disk) response cache.
pub mod cache;

/// Request coalescing: folding a new call into an already in-flight one.
pub mod coalescer;

/// Process-wide configuration.
pub mod config;

/// Declarative request contract (`Requestable`).
pub mod descriptor;

/// Weak-reference multicast delegate used for lifecycle and change events.
pub mod delegate;

/// Crate-wide error type.
pub mod error;

/// Cache policy and expiry-deadline model.
pub mod expiry;

/// Deterministic request fingerprinting.
pub mod fingerprint;

/// Structured tracing setup.
#[cfg(feature = "networkit-tracing")]
#[cfg_attr(docsrs, doc(cfg(feature = "networkit-tracing")))]
pub mod logging;

/// `NetworkTask`: one descriptor execution through transport, decode, and
/// callback fan-out.
pub mod network_task;

/// Fingerprint-keyed observer registry with weak targets and cancellation.
pub mod observer;

/// `NetworkManager`: the façade tying fingerprinting, caching, coalescing,
/// the observer registry, and scheduling together.
pub mod orchestrator;

/// Priority queues and per-queue concurrency-bounded scheduling.
pub mod queue;

/// Task lifecycle state machine, priority ordinals, and the `TaskOp` trait.
pub mod task;

/// Pluggable HTTP transport and its default hyper/rustls implementation.
pub mod transport;

/// URL path composition.
pub mod url_builder;

pub use descriptor::Requestable;
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use orchestrator::NetworkManager;
