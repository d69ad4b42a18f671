//! Request coalescing: fold a new task's callbacks into an in-flight
//! task of the same fingerprint instead of issuing a second request.
//!
//! Grounded on `plugins::idempotency`'s in-flight/completed `Entry` map: here
//! the "in-flight" half of that pattern is generalized from a string key to
//! a fingerprint and from a single cached response to an arbitrary
//! `NetworkTask`'s live callback list.

use std::any::Any;
use std::sync::Arc;

use crate::fingerprint::Fingerprint;
use crate::task::TaskOp;

/// Result of attempting to fold a new task into an already-admitted one.
pub enum MergeOutcome {
    /// Found a live op with the same id and merged into it; the new task
    /// must not be enqueued.
    Merged,
    /// No op with this id is currently live.
    NotFound,
    /// Found an op with this id but it wraps an incompatible descriptor
    /// type; the caller should log `Error::MergeIncompatible` and admit the
    /// new task independently.
    Incompatible,
}

/// A task concrete type that can receive another instance of itself's
/// pending callbacks and listeners.
pub trait Mergeable: TaskOp + Sized {
    /// Appends `other`'s callbacks/listeners onto `self`.
    fn merge_from(&self, other: &Self);
}

/// Searches `candidates` (a Named Queue's live + pending op snapshot) for
/// the first op whose id matches `new_task`'s, and attempts to merge.
pub fn try_merge<T: Mergeable + 'static>(candidates: &[Arc<dyn TaskOp>], new_task: &Arc<T>) -> MergeOutcome {
    let id = new_task.id();
    let Some(existing) = candidates.iter().find(|op| op.id() == id) else {
        return MergeOutcome::NotFound;
    };

    match existing.as_any().downcast_ref::<T>() {
        Some(mergeable) => {
            mergeable.merge_from(new_task);
            let bumped = mergeable.lifecycle().priority().step_up();
            mergeable.lifecycle().set_priority(bumped);
            MergeOutcome::Merged
        }
        None => MergeOutcome::Incompatible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{PriorityOrdinal, QueueDef, TaskLifecycle};
    use async_trait::async_trait;
    use http::Method;
    use parking_lot::Mutex;

    struct Counting {
        id: Fingerprint,
        queue: QueueDef,
        lifecycle: TaskLifecycle,
        merged_count: Mutex<usize>,
    }

    #[async_trait]
    impl TaskOp for Counting {
        fn id(&self) -> &Fingerprint {
            &self.id
        }
        fn queue(&self) -> &QueueDef {
            &self.queue
        }
        fn lifecycle(&self) -> &TaskLifecycle {
            &self.lifecycle
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        async fn run(self: Arc<Self>) {}
    }

    impl Mergeable for Counting {
        fn merge_from(&self, _other: &Self) {
            *self.merged_count.lock() += 1;
        }
    }

    fn counting(url: &str) -> Arc<Counting> {
        Arc::new(Counting {
            id: crate::fingerprint::fingerprint_of(&Method::GET, url, &()),
            queue: QueueDef::network_default(),
            lifecycle: TaskLifecycle::new(PriorityOrdinal::NORMAL),
            merged_count: Mutex::new(0),
        })
    }

    #[test]
    fn merges_into_matching_live_op_and_bumps_priority() {
        let existing = counting("a");
        let candidates: Vec<Arc<dyn TaskOp>> = vec![existing.clone()];
        let new_task = counting("a");

        match try_merge(&candidates, &new_task) {
            MergeOutcome::Merged => {}
            _ => panic!("expected merge"),
        }
        assert_eq!(*existing.merged_count.lock(), 1);
        assert_eq!(existing.lifecycle.priority(), PriorityOrdinal::NORMAL.step_up());
    }

    #[test]
    fn no_match_returns_not_found() {
        let candidates: Vec<Arc<dyn TaskOp>> = vec![counting("a")];
        let new_task = counting("b");
        assert!(matches!(try_merge(&candidates, &new_task), MergeOutcome::NotFound));
    }
}
