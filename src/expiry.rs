//! Cache policy → deadline translation and expiry comparisons.

use std::time::{Duration, Instant};

/// How long a cache entry written under this policy remains valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Valid for zero duration: readable immediately after write, but
    /// already expired the instant it lands.
    ExpireImmediately,
    /// Valid for `Duration` after the write.
    Timed(Duration),
    /// Never expires.
    Forever,
}

impl CachePolicy {
    /// Builds a [`CachePolicy::Timed`] policy, rejecting a zero duration —
    /// callers that want "expired on arrival" semantics should use
    /// [`CachePolicy::ExpireImmediately`] instead.
    pub fn timed_seconds(seconds: u64) -> Option<Self> {
        if seconds == 0 {
            None
        } else {
            Some(CachePolicy::Timed(Duration::from_secs(seconds)))
        }
    }

    /// Translates this policy into a concrete deadline relative to `now`.
    pub fn deadline(&self, now: Instant) -> Expiry {
        match self {
            CachePolicy::ExpireImmediately => Expiry::At(now),
            CachePolicy::Timed(d) => Expiry::At(now + *d),
            CachePolicy::Forever => Expiry::Never,
        }
    }
}

/// A concrete deadline, as stored on a `CacheEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Expires at the given instant.
    At(Instant),
    /// Never expires.
    Never,
}

impl Expiry {
    /// Whether this deadline has passed as of `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(deadline) => *deadline <= now,
        }
    }

    /// Whether `self` represents a strictly earlier deadline than `other`.
    /// `Never` is treated as the latest possible deadline, so it is never
    /// "shorter" than any `At(_)`.
    pub fn is_shorter_than(&self, other: &Expiry) -> bool {
        match (self, other) {
            (Expiry::Never, _) => false,
            (Expiry::At(_), Expiry::Never) => true,
            (Expiry::At(a), Expiry::At(b)) => a < b,
        }
    }
}

/// Implements the "shorter policy wins" rule: a newly-requested policy whose
/// deadline would land earlier than the entry's stored deadline forces the
/// entry to be treated as expired, even if it is nominally still fresh.
pub fn shorter_policy_forces_refresh(new_policy: &CachePolicy, stored: Expiry, now: Instant) -> bool {
    let new_deadline = new_policy.deadline(now);
    new_deadline.is_shorter_than(&stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_zero_is_rejected() {
        assert!(CachePolicy::timed_seconds(0).is_none());
    }

    #[test]
    fn expire_immediately_is_expired_at_write_time() {
        let now = Instant::now();
        let expiry = CachePolicy::ExpireImmediately.deadline(now);
        assert!(expiry.is_expired(now));
    }

    #[test]
    fn forever_is_never_expired() {
        let now = Instant::now();
        let expiry = CachePolicy::Forever.deadline(now);
        assert!(!expiry.is_expired(now));
        assert!(!expiry.is_expired(now + Duration::from_secs(3600 * 24 * 365)));
    }

    #[test]
    fn timed_expiry_monotonicity() {
        let t0 = Instant::now();
        let policy = CachePolicy::timed_seconds(10).unwrap();
        let expiry = policy.deadline(t0);
        assert!(!expiry.is_expired(t0));
        assert!(!expiry.is_expired(t0 + Duration::from_secs(9)));
        assert!(expiry.is_expired(t0 + Duration::from_secs(10)));
        assert!(expiry.is_expired(t0 + Duration::from_secs(11)));
    }

    #[test]
    fn shorter_policy_forces_refresh_even_if_fresh() {
        let now = Instant::now();
        let stored = CachePolicy::Timed(Duration::from_secs(3600)).deadline(now);
        let forces = shorter_policy_forces_refresh(&CachePolicy::Timed(Duration::from_secs(60)), stored, now);
        assert!(forces);
    }

    #[test]
    fn longer_policy_does_not_force_refresh() {
        let now = Instant::now();
        let stored = CachePolicy::Timed(Duration::from_secs(60)).deadline(now);
        let forces = shorter_policy_forces_refresh(&CachePolicy::Timed(Duration::from_secs(3600)), stored, now);
        assert!(!forces);
    }
}
