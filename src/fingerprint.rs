//! Deterministic request fingerprinting.
//!
//! A fingerprint is the primary key shared by the cache, the observer
//! registry, and the in-flight task set. It must be a pure function of its
//! inputs: same method, URL and canonical parameter bytes always produce the
//! same fingerprint, with no clock, nonce, or per-process salt involved.
//! Generalizes the payload-signature step of `plugins::idempotency` (there a
//! SHA-1 digest over method+path+body) to a full SHA-256 digest over
//! method+URL+canonical parameter JSON.

use http::Method;
use sha2::{Digest, Sha256};

/// Opaque, comparable, hashable request identifier.
///
/// Renders as `{url}#{hex digest}` so fingerprints stay useful in logs
/// without needing a side lookup table.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    url: String,
    digest: [u8; 32],
}

impl Fingerprint {
    /// Computes the fingerprint for a `(method, url, params)` triple.
    ///
    /// `params` must already be canonical bytes (typically sorted-key JSON
    /// produced by the descriptor's encoder). If a descriptor cannot produce
    /// canonical bytes, callers should fall back to
    /// [`Fingerprint::from_structural_hash`] rather than failing outright.
    pub fn new(method: &Method, url: &str, canonical_params: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(url.as_bytes());
        hasher.update(b"\0");
        hasher.update(canonical_params);
        let digest: [u8; 32] = hasher.finalize().into();

        Self {
            url: url.to_string(),
            digest,
        }
    }

    /// Fallback fingerprint used when the descriptor's parameter encoder
    /// fails to serialize. The digest is a documented 64-bit structural hash
    /// (FNV-1a) over the method, URL, and a debug rendering of the failure,
    /// widened into the 32-byte digest slot so `Fingerprint` stays one type.
    /// Construction never aborts; callers are expected to log a warning when
    /// they reach for this path (the encoder failure itself is the thing
    /// worth logging, not the fallback).
    pub fn from_structural_hash(method: &Method, url: &str, reason: &str) -> Self {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in method
            .as_str()
            .bytes()
            .chain(url.bytes())
            .chain(reason.bytes())
        {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        let mut digest = [0u8; 32];
        digest[..8].copy_from_slice(&hash.to_be_bytes());

        Self {
            url: url.to_string(),
            digest,
        }
    }

    /// Lowercase hex rendering of the digest, with no URL prefix.
    pub fn hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Human-readable form used in logs: `{url}#{hex}`.
    pub fn display(&self) -> String {
        format!("{}#{}", self.url, self.hex())
    }

    /// The raw 32-byte digest, usable as a cache/observer map key alongside
    /// [`Fingerprint`] itself.
    pub fn digest_bytes(&self) -> &[u8; 32] {
        &self.digest
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self.display())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Serializes `params` via serde's canonical (sorted-key) JSON encoding.
/// Falls back to a structural hash fingerprint on serialization failure so
/// fingerprint generation never aborts, per the purity/totality contract.
pub fn fingerprint_of<P: serde::Serialize>(method: &Method, url: &str, params: &P) -> Fingerprint {
    match canonical_json(params) {
        Ok(bytes) => Fingerprint::new(method, url, &bytes),
        Err(err) => {
            tracing::warn!(url, error = %err, "parameter serialization failed, falling back to structural hash");
            Fingerprint::from_structural_hash(method, url, &err.to_string())
        }
    }
}

/// Sorted-key JSON encoding: serialize to a `serde_json::Value`, which
/// canonicalizes object key order via `BTreeMap` under `preserve_order`
/// being disabled (the crate's default), then serialize that value.
fn canonical_json<P: serde::Serialize>(params: &P) -> serde_json::Result<Vec<u8>> {
    let value = serde_json::to_value(params)?;
    serde_json::to_vec(&value)
}
