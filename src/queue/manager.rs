//! Thin multiplexer from tasks to their declared Named Queue.

use std::sync::Arc;

use dashmap::DashMap;

use crate::fingerprint::Fingerprint;
use crate::queue::named::NamedQueue;
use crate::task::{PriorityOrdinal, QueueDef, TaskOp};

/// Routes tasks to `queues[task.queue]`, creating the queue lazily on first
/// use. The map itself is the only thing guarded by a lock (the `DashMap`'s
/// shard locks); queue bodies run under their own serialization in
/// [`NamedQueue`].
#[derive(Clone)]
pub struct QueueManager {
    queues: Arc<DashMap<QueueDef, Arc<NamedQueue>>>,
    default_queue_concurrency: usize,
}

impl QueueManager {
    pub fn new(default_queue_concurrency: usize) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            default_queue_concurrency,
        }
    }

    pub(crate) fn queue_for(&self, def: &QueueDef) -> Arc<NamedQueue> {
        if let Some(q) = self.queues.get(def) {
            return q.clone();
        }
        self.queues
            .entry(def.clone())
            .or_insert_with(|| Arc::new(NamedQueue::new(def.clone(), self.default_queue_concurrency)))
            .clone()
    }

    pub async fn enqueue(&self, op: Arc<dyn TaskOp>) {
        let queue = self.queue_for(op.queue());
        queue.enqueue(op).await;
    }

    /// Broadcasts a priority update to every queue. `id` is unique across
    /// queues, so at most one queue will actually find and apply it.
    pub async fn set_priority(&self, id: &Fingerprint, priority: PriorityOrdinal) {
        for entry in self.queues.iter() {
            if entry.value().set_priority(id, priority).await {
                return;
            }
        }
    }

    /// Current priority of the op identified by `id`, searched across every
    /// queue this manager has created so far. `None` if no live queue knows
    /// about it (never enqueued, already finished, or routed through a
    /// queue created after the search started).
    pub async fn priority_of(&self, id: &Fingerprint) -> Option<PriorityOrdinal> {
        for entry in self.queues.iter() {
            if let Some(p) = entry.value().priority_of(id).await {
                return Some(p);
            }
        }
        None
    }

    /// Best-effort demotion hook wired into the Observer Registry: demotes
    /// `id`'s priority to `veryLow` once its last observer is gone. The task
    /// may already be running or finished, in which case this is a no-op.
    pub async fn demote_to_very_low(&self, id: &Fingerprint) {
        self.set_priority(id, PriorityOrdinal::VERY_LOW).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Concurrency, TaskLifecycle};
    use async_trait::async_trait;
    use http::Method;

    struct Noop {
        id: Fingerprint,
        queue: QueueDef,
        lifecycle: TaskLifecycle,
    }

    #[async_trait]
    impl TaskOp for Noop {
        fn id(&self) -> &Fingerprint {
            &self.id
        }
        fn queue(&self) -> &QueueDef {
            &self.queue
        }
        fn lifecycle(&self) -> &TaskLifecycle {
            &self.lifecycle
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        async fn run(self: Arc<Self>) {}
    }

    #[tokio::test]
    async fn creates_queue_lazily_and_routes() {
        let manager = QueueManager::new(4);
        let def = QueueDef::new("images", 0, Concurrency::Serial);
        let op = Arc::new(Noop {
            id: crate::fingerprint::fingerprint_of(&Method::GET, "a", &()),
            queue: def.clone(),
            lifecycle: TaskLifecycle::new(PriorityOrdinal::NORMAL),
        });
        manager.enqueue(op.clone()).await;
        tokio::task::yield_now().await;
        assert_eq!(manager.queues.len(), 1);
    }
}
