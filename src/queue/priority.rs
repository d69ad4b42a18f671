//! Mutable-priority FIFO-stable pending queue.
//!
//! Ordered by priority descending, ties broken by insertion index ascending.
//! Dequeue from the front is amortized O(1) via a head index, compacted
//! periodically rather than on every pop.

use std::sync::Arc;

use crate::fingerprint::Fingerprint;
use crate::task::TaskOp;

struct Slot {
    op: Arc<dyn TaskOp>,
    insertion_index: u64,
}

/// Compact once the dead head space exceeds this fraction of the backing
/// vector and the vector is large enough for the copy to be worth doing.
const COMPACT_RATIO: f64 = 0.25;
const COMPACT_MIN_LEN: usize = 50;

#[derive(Default)]
pub struct PriorityQueue {
    slots: Vec<Slot>,
    head: usize,
    next_insertion_index: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `op`, keeping the backing vector sorted by
    /// `(priority desc, insertion_index asc)`.
    pub fn enqueue(&mut self, op: Arc<dyn TaskOp>) {
        let insertion_index = self.next_insertion_index;
        self.next_insertion_index += 1;

        let priority = op.lifecycle().priority();
        let slot = Slot { op, insertion_index };

        let pos = self.slots[self.head..]
            .binary_search_by(|s| {
                s.op.lifecycle()
                    .priority()
                    .cmp(&priority)
                    .reverse()
                    .then(s.insertion_index.cmp(&insertion_index))
            })
            .unwrap_or_else(|e| e);
        self.slots.insert(self.head + pos, slot);
    }

    /// Removes and returns the highest-priority, oldest-inserted op.
    ///
    /// The slot at `head` is left in place (cloning the `Arc` is cheap) and
    /// only physically dropped once `maybe_compact` drains the dead prefix —
    /// that's what makes this amortized O(1) instead of an O(n) shift.
    pub fn dequeue(&mut self) -> Option<Arc<dyn TaskOp>> {
        if self.head >= self.slots.len() {
            return None;
        }
        let op = self.slots[self.head].op.clone();
        self.head += 1;
        self.maybe_compact();
        Some(op)
    }

    pub fn peek(&self) -> Option<&Arc<dyn TaskOp>> {
        self.slots.get(self.head).map(|s| &s.op)
    }

    /// Non-destructive iteration over pending ops, in current queue order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TaskOp>> {
        self.slots[self.head..].iter().map(|s| &s.op)
    }

    /// Re-sorts after a priority change. O(n); rare by design.
    pub fn update_priority(&mut self, id: &Fingerprint) {
        let Some(pos) = self.slots[self.head..]
            .iter()
            .position(|s| s.op.id() == id)
            .map(|p| p + self.head)
        else {
            return;
        };
        let slot = self.slots.remove(pos);
        let priority = slot.op.lifecycle().priority();
        let insert_pos = self.slots[self.head..]
            .binary_search_by(|s| {
                s.op.lifecycle()
                    .priority()
                    .cmp(&priority)
                    .reverse()
                    .then(s.insertion_index.cmp(&slot.insertion_index))
            })
            .unwrap_or_else(|e| e);
        self.slots.insert(self.head + insert_pos, slot);
    }

    /// Removes the op with the given id, wherever it sits in the pending
    /// list. Used when an op is cancelled before it starts.
    pub fn remove(&mut self, id: &Fingerprint) -> Option<Arc<dyn TaskOp>> {
        let pos = self.slots[self.head..]
            .iter()
            .position(|s| s.op.id() == id)
            .map(|p| p + self.head)?;
        let slot = self.slots.remove(pos);
        Some(slot.op)
    }

    fn maybe_compact(&mut self) {
        if self.slots.len() > COMPACT_MIN_LEN
            && self.head as f64 / self.slots.len() as f64 > COMPACT_RATIO
        {
            self.slots.drain(0..self.head);
            self.head = 0;
        }
    }
}
