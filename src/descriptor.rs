//! Descriptor contract: what a declarative request type must supply so the
//! core can fingerprint, dispatch, decode, and (optionally) cache it.
//!
//! This is the external interface the core is built around — it only ever
//! calls through these trait methods, never downcasts into a concrete
//! descriptor.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::error::Error;
use crate::expiry::CachePolicy;
use crate::task::{MergePolicy, QueueDef};

/// A declarative definition of a request: method, host, path, parameters,
/// and how to turn a response into a value.
///
/// `Params` must be hashable and JSON-serializable so it can both identify
/// the request structurally and feed the fingerprint's canonical encoder.
pub trait Requestable: Send + Sync + 'static {
    type Params: serde::Serialize + Send + Sync + Clone + 'static;
    type Response: Send + Sync + 'static;

    const METHOD: Method;
    const SCHEME: &'static str = "https";

    fn host(&self, params: &Self::Params) -> String;
    fn port(&self, params: &Self::Params) -> Option<u16> {
        let _ = params;
        None
    }
    fn path(&self, params: &Self::Params) -> crate::url_builder::UrlPath;

    /// Query parameters, flattened to string pairs. Default: none.
    fn as_query(&self, params: &Self::Params) -> Option<BTreeMap<String, String>> {
        let _ = params;
        None
    }

    /// Request body bytes. Default: none (a query-only / bodyless request).
    fn as_body(&self, params: &Self::Params) -> Option<Bytes> {
        let _ = params;
        None
    }

    /// Extra headers beyond the transport's own defaults. Default: none.
    fn headers(&self, params: &Self::Params) -> Option<HeaderMap> {
        let _ = params;
        None
    }

    /// Inspects the raw response before decoding; returning `Some` fails
    /// the task with that error (e.g. mapping non-2xx statuses).
    fn handle(&self, response: &http::response::Parts, data: &[u8]) -> Option<Error> {
        let _ = (response, data);
        None
    }

    /// Decodes the raw response body into `Response`.
    fn decode(&self, data: &[u8]) -> Result<Self::Response, Error>;

    fn queue(&self) -> QueueDef {
        QueueDef::network_default()
    }

    fn merge_policy(&self) -> MergePolicy {
        MergePolicy::Always
    }

    /// Opt-in: a descriptor that returns `Some` here is `Cacheable` in the
    /// glossary sense — its successful responses are persisted to the
    /// two-tier cache under this policy. Default: not cached. Folded into
    /// `Requestable` rather than kept as a separate trait so the
    /// orchestrator's generic entry points don't need two bound sets for
    /// what is, structurally, one optional capability.
    fn cache_policy(&self) -> Option<CachePolicy> {
        None
    }

    /// Whether `observe` should deliver a stale-but-present cache entry
    /// synchronously while a refresh is in flight. Only consulted when
    /// `cache_policy` is `Some`. Default: true.
    fn return_cached_data_if_expired(&self) -> bool {
        true
    }
}

/// Default JSON decoding helper descriptors can delegate to from `decode`.
pub fn decode_json<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(data).map_err(Error::decode)
}
