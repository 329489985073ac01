//! Buffers pending workloads and routes them to cluster queues, yielding
//! scheduling candidates (spec §4.3).

pub mod error;
pub mod manager;

pub use error::QueueError;
pub use manager::{Candidate, QueueManager, QueueingStrategy, Queueable};
