//! Task lifecycle state machine and priority ordinals.
//!
//! `Task` generalizes the inheritance hierarchy the design notes call out
//! ("class hierarchy of tasks") into a tagged variant plus a small
//! `TaskOp` trait the scheduler needs: `id`, `queue`, `priority`, `run`.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::fingerprint::Fingerprint;

/// Mutable task priority. Higher sorts first; ties break by insertion order.
///
/// Five canonical steps plus the two extremes used by `lowest`/`highest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityOrdinal(pub i64);

impl PriorityOrdinal {
    pub const VERY_LOW: PriorityOrdinal = PriorityOrdinal(-8);
    pub const LOW: PriorityOrdinal = PriorityOrdinal(-4);
    pub const NORMAL: PriorityOrdinal = PriorityOrdinal(0);
    pub const HIGH: PriorityOrdinal = PriorityOrdinal(4);
    pub const VERY_HIGH: PriorityOrdinal = PriorityOrdinal(8);
    pub const LOWEST: PriorityOrdinal = PriorityOrdinal(i64::MIN);
    pub const HIGHEST: PriorityOrdinal = PriorityOrdinal(i64::MAX);

    /// Bumps this ordinal one canonical step up (used by the coalescer when
    /// folding a new call into an in-flight task), saturating at `VERY_HIGH`.
    pub fn step_up(self) -> PriorityOrdinal {
        const STEPS: [PriorityOrdinal; 5] = [
            PriorityOrdinal::VERY_LOW,
            PriorityOrdinal::LOW,
            PriorityOrdinal::NORMAL,
            PriorityOrdinal::HIGH,
            PriorityOrdinal::VERY_HIGH,
        ];
        match STEPS.iter().position(|s| *s == self) {
            Some(idx) if idx + 1 < STEPS.len() => STEPS[idx + 1],
            Some(_) => PriorityOrdinal::VERY_HIGH,
            None => self,
        }
    }
}

impl Default for PriorityOrdinal {
    fn default() -> Self {
        PriorityOrdinal::NORMAL
    }
}

/// How many concurrent executions a `QueueDef` permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Platform default, taken from `NetworkManagerConfig::default_queue_concurrency`.
    Default,
    /// At most one op running at a time.
    Serial,
    /// No cap.
    Unlimited,
    /// At most `n` ops running at a time.
    Limit(usize),
}

impl Concurrency {
    pub fn cap(self, default_queue_concurrency: usize) -> usize {
        match self {
            Concurrency::Default => default_queue_concurrency,
            Concurrency::Serial => 1,
            Concurrency::Unlimited => usize::MAX,
            Concurrency::Limit(n) => n.max(1),
        }
    }
}

/// Identifies a Named Queue. Used as the Queue Manager's map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueDef {
    pub name: String,
    pub qos: i64,
    pub concurrency: ConcurrencyKey,
}

/// `Concurrency` with `Limit`'s payload folded into the hash/eq key so two
/// `QueueDef`s with the same name and qos but different limits don't collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcurrencyKey {
    Default,
    Serial,
    Unlimited,
    Limit(usize),
}

impl From<Concurrency> for ConcurrencyKey {
    fn from(c: Concurrency) -> Self {
        match c {
            Concurrency::Default => ConcurrencyKey::Default,
            Concurrency::Serial => ConcurrencyKey::Serial,
            Concurrency::Unlimited => ConcurrencyKey::Unlimited,
            Concurrency::Limit(n) => ConcurrencyKey::Limit(n),
        }
    }
}

impl From<ConcurrencyKey> for Concurrency {
    fn from(c: ConcurrencyKey) -> Self {
        match c {
            ConcurrencyKey::Default => Concurrency::Default,
            ConcurrencyKey::Serial => Concurrency::Serial,
            ConcurrencyKey::Unlimited => Concurrency::Unlimited,
            ConcurrencyKey::Limit(n) => Concurrency::Limit(n),
        }
    }
}

impl QueueDef {
    pub fn new(name: impl Into<String>, qos: i64, concurrency: Concurrency) -> Self {
        Self {
            name: name.into(),
            qos,
            concurrency: concurrency.into(),
        }
    }

    /// The default network queue used when a descriptor doesn't declare one.
    pub fn network_default() -> Self {
        Self::new("network.default", 0, Concurrency::Default)
    }
}

/// Observable lifecycle state of a `TaskOp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Finished,
    Cancelled,
}

impl TaskState {
    fn as_u8(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Running => 1,
            TaskState::Finished => 2,
            TaskState::Cancelled => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Finished,
            _ => TaskState::Cancelled,
        }
    }
}

/// Externally-observable state cell shared between a running op and the
/// queue bookkeeping that tracks it.
///
/// `isExecuting`/`isFinished` are derived, never stored independently, so
/// they cannot disagree with the underlying state by construction.
#[derive(Debug, Default)]
pub struct TaskLifecycle {
    state: AtomicU8,
    priority: AtomicI64,
}

impl TaskLifecycle {
    pub fn new(priority: PriorityOrdinal) -> Self {
        Self {
            state: AtomicU8::new(TaskState::Pending.as_u8()),
            priority: AtomicI64::new(priority.0),
        }
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_executing(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state(), TaskState::Finished | TaskState::Cancelled)
    }

    pub fn priority(&self) -> PriorityOrdinal {
        PriorityOrdinal(self.priority.load(Ordering::SeqCst))
    }

    pub fn set_priority(&self, p: PriorityOrdinal) {
        self.priority.store(p.0, Ordering::SeqCst);
    }

    /// Reserved for the Named Queue: transitions Pending -> Running.
    /// Returns `false` if the op was cancelled before it could start.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Pending.as_u8(),
                TaskState::Running.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn finish(&self) {
        self.state.store(TaskState::Finished.as_u8(), Ordering::SeqCst);
    }

    /// Cancels the op if it hasn't started yet. Returns `true` if the
    /// cancellation took effect (i.e. the op was still Pending).
    pub fn cancel_if_pending(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Pending.as_u8(),
                TaskState::Cancelled.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// Whether a new request should be folded into an already in-flight one of
/// equal fingerprint. Evaluated once at enqueue time.
#[derive(Clone)]
pub enum MergePolicy {
    Always,
    Never,
    Custom(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl MergePolicy {
    pub fn evaluate(&self) -> bool {
        match self {
            MergePolicy::Always => true,
            MergePolicy::Never => false,
            MergePolicy::Custom(pred) => pred(),
        }
    }
}

/// What the scheduler needs from any unit of work, regardless of what kind
/// of task it wraps.
///
/// `Any` lets the Coalescer downcast a type-erased op back to its concrete
/// `NetworkTask<D>` when it needs to call `merge_from` on a match.
#[async_trait]
pub trait TaskOp: std::any::Any + Send + Sync {
    fn id(&self) -> &Fingerprint;
    fn queue(&self) -> &QueueDef;
    fn lifecycle(&self) -> &TaskLifecycle;
    fn as_any(&self) -> &dyn std::any::Any;

    /// Runs the op to completion. Called by the Named Queue's worker pool
    /// only after `lifecycle().start()` has succeeded.
    async fn run(self: Arc<Self>);
}
