//! Concurrency-bounded runner for one `QueueDef`.
//!
//! Enqueue and admission bookkeeping are serialized through a
//! `tokio::sync::Mutex` standing in for the design's "dedicated dispatcher" —
//! one queue's admission decisions never race another's, and a single
//! `enqueue` call's read-modify-write of `in_flight` is never interleaved
//! with another.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::coalescer::MergeOutcome;
use crate::fingerprint::Fingerprint;
use crate::queue::priority::PriorityQueue;
use crate::task::{Concurrency, PriorityOrdinal, QueueDef, TaskOp};

struct State {
    pending: PriorityQueue,
    in_flight: usize,
    live: Vec<Arc<dyn TaskOp>>,
}

/// One Named Queue: a bounded worker pool fed by a priority queue.
pub struct NamedQueue {
    def: QueueDef,
    cap: usize,
    state: Mutex<State>,
}

impl NamedQueue {
    pub fn new(def: QueueDef, default_queue_concurrency: usize) -> Self {
        let cap = Concurrency::from(def.concurrency).cap(default_queue_concurrency);
        Self {
            def,
            cap,
            state: Mutex::new(State {
                pending: PriorityQueue::new(),
                in_flight: 0,
                live: Vec::new(),
            }),
        }
    }

    pub fn def(&self) -> &QueueDef {
        &self.def
    }

    /// Admits `op` for this queue: starts it immediately if under the
    /// concurrency cap, otherwise parks it in the pending priority queue.
    pub async fn enqueue(self: &Arc<Self>, op: Arc<dyn TaskOp>) {
        let mut state = self.state.lock().await;
        if state.in_flight < self.cap {
            self.start(&mut state, op);
        } else {
            state.pending.enqueue(op);
        }
    }

    /// Atomic search-then-admit: holds `state` across both the coalescing
    /// search (`merge_fn`, given the current live+pending snapshot) and the
    /// admission decision, so two concurrent callers for the same id can
    /// never both observe `NotFound` and both get admitted. `merge_fn` is
    /// expected to be [`crate::coalescer::try_merge`] bound to `op`'s id.
    pub async fn merge_or_enqueue<T, F>(self: &Arc<Self>, op: Arc<T>, merge_fn: F) -> MergeOutcome
    where
        T: TaskOp + 'static,
        F: FnOnce(&[Arc<dyn TaskOp>], &Arc<T>) -> MergeOutcome,
    {
        let mut state = self.state.lock().await;
        let mut candidates = state.live.clone();
        candidates.extend(state.pending.iter().cloned());

        let outcome = merge_fn(&candidates, &op);
        if matches!(outcome, MergeOutcome::NotFound | MergeOutcome::Incompatible) {
            let op: Arc<dyn TaskOp> = op;
            if state.in_flight < self.cap {
                self.start(&mut state, op);
            } else {
                state.pending.enqueue(op);
            }
        }
        outcome
    }

    fn start(self: &Arc<Self>, state: &mut State, op: Arc<dyn TaskOp>) {
        if !op.lifecycle().start() {
            // Cancelled before it got the chance to run.
            return;
        }
        state.in_flight += 1;
        state.live.push(op.clone());
        let this = self.clone();
        tokio::spawn(async move {
            op.clone().run().await;
            this.on_complete(op).await;
        });
    }

    async fn on_complete(self: &Arc<Self>, finished: Arc<dyn TaskOp>) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        state.live.retain(|op| !Arc::ptr_eq(op, &finished));
        while state.in_flight < self.cap {
            let Some(next) = state.pending.dequeue() else {
                break;
            };
            self.start(&mut state, next);
        }
    }

    /// Propagates a priority change: re-sorts the pending queue if parked,
    /// or just updates the op's own priority cell if already running (it
    /// only affects the next scheduling pass's tie-break, not preemption).
    pub async fn set_priority(&self, id: &Fingerprint, priority: PriorityOrdinal) -> bool {
        let mut state = self.state.lock().await;
        if let Some(op) = find_in_queue(&mut state.pending, id) {
            op.lifecycle().set_priority(priority);
            state.pending.update_priority(id);
            return true;
        }
        if let Some(op) = state.live.iter().find(|op| op.id() == id) {
            op.lifecycle().set_priority(priority);
            return true;
        }
        false
    }

    pub async fn live_count(&self) -> usize {
        self.state.lock().await.in_flight
    }

    /// Current priority of the op identified by `id`, whether parked or
    /// running. `None` if this queue has never heard of it or it already
    /// finished.
    pub async fn priority_of(&self, id: &Fingerprint) -> Option<PriorityOrdinal> {
        let state = self.state.lock().await;
        if let Some(op) = state.pending.iter().find(|op| op.id() == id) {
            return Some(op.lifecycle().priority());
        }
        state.live.iter().find(|op| op.id() == id).map(|op| op.lifecycle().priority())
    }

    /// Snapshot of every op this queue currently knows about (running and
    /// parked), in no particular order. Exposed for introspection and
    /// tests; never mutated through this handle. Coalescing itself goes
    /// through [`NamedQueue::merge_or_enqueue`], which takes the same
    /// snapshot under the same lock it uses to admit.
    pub async fn snapshot_ops(&self) -> Vec<Arc<dyn TaskOp>> {
        let state = self.state.lock().await;
        let mut ops = state.live.clone();
        ops.extend(state.pending.iter().cloned());
        ops
    }
}

fn find_in_queue(pending: &mut PriorityQueue, id: &Fingerprint) -> Option<Arc<dyn TaskOp>> {
    let op = pending.remove(id)?;
    pending.enqueue(op.clone());
    Some(op)
}
