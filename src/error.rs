//! Crate-wide error type.
//!
//! Every fallible seam named in the design (URL composition, transport, the
//! descriptor's `handle` hook, decoding, cache I/O, merging) surfaces through
//! this single enum so callers can match on `Error::kind()`-style variants or
//! simply print the chain via `source()`.

use std::fmt;

/// All error kinds the core can raise.
///
/// Variants map 1:1 onto the error table in the design: most fail the task
/// outright (and are reported to every merged callback), a few are purely
/// local recovery signals (`CacheDecodeFailure`) or are logged and swallowed
/// by the caller (`CacheIoError`, `MergeIncompatible`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// URL composition failed (bad host, invalid path segment, ...).
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The transport completed without yielding a response or any data.
    #[error("no response received from transport")]
    NoResponse,

    /// The underlying HTTP transport failed (connect, send, I/O, timeout).
    #[error("transport error: {0}")]
    TransportError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The descriptor's `handle(response, data)` hook returned an error.
    #[error("request handling failed: {0}")]
    HandledError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The response decoder failed to produce a value from the raw bytes.
    #[error("failed to decode response: {0}")]
    DecodeError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Bytes read back from the cache no longer decode; the entry has been
    /// removed and a refresh forced. Carries no cause — it is a local
    /// recovery signal, not a transport/decoder failure.
    #[error("cached bytes no longer decode for this fingerprint")]
    CacheDecodeFailure,

    /// Disk I/O failed while persisting a cache entry. The write to the
    /// memory tier still succeeded; this is logged, never surfaced to task
    /// callbacks.
    #[error("cache I/O error: {0}")]
    CacheIoError(#[source] std::io::Error),

    /// `merge(into:)` was attempted between tasks whose descriptor response
    /// types are incompatible.
    #[error("cannot merge tasks with incompatible response types")]
    MergeIncompatible,
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps an arbitrary transport-layer cause.
    pub fn transport(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::TransportError(Box::new(cause))
    }

    /// Wraps an arbitrary decode-layer cause.
    pub fn decode(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::DecodeError(Box::new(cause))
    }

    /// True for errors that should still be delivered to every merged
    /// callback (i.e. everything except the purely-local recovery signal).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Error::CacheDecodeFailure)
    }
}

/// Lightweight copyable discriminant for logging and tests, since `Error`
/// itself carries non-`Clone` boxed causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUrl,
    NoResponse,
    TransportError,
    HandledError,
    DecodeError,
    CacheDecodeFailure,
    CacheIoError,
    MergeIncompatible,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Error {
    /// Returns the error's kind without requiring a clone of its cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Error::NoResponse => ErrorKind::NoResponse,
            Error::TransportError(_) => ErrorKind::TransportError,
            Error::HandledError(_) => ErrorKind::HandledError,
            Error::DecodeError(_) => ErrorKind::DecodeError,
            Error::CacheDecodeFailure => ErrorKind::CacheDecodeFailure,
            Error::CacheIoError(_) => ErrorKind::CacheIoError,
            Error::MergeIncompatible => ErrorKind::MergeIncompatible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_decode_failure_is_not_terminal() {
        assert!(!Error::CacheDecodeFailure.is_terminal());
    }

    #[test]
    fn transport_errors_are_terminal() {
        let err = Error::transport(std::io::Error::other("boom"));
        assert!(err.is_terminal());
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }
}
