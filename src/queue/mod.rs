//! Scheduling: priority queue, per-definition runners, and the manager that
//! multiplexes tasks across them.

pub mod manager;
pub mod named;
pub mod priority;

pub use manager::QueueManager;
pub use named::NamedQueue;
pub use priority::PriorityQueue;
