//! Process-wide mirror of every cluster queue's declared quota and current
//! usage, with cohort-level aggregation (spec §4.2).
//!
//! This crate knows nothing about Kubernetes informers or CRDs; callers
//! translate watch events into [`cache::ClusterQueueSpec`]/workload calls.

pub mod cache;
pub mod error;
pub mod snapshot;

pub use cache::{ClusterQueueCache, ClusterQueueSpec, QueueingStrategy};
pub use error::CacheError;
pub use snapshot::{ClusterQueueSnapshot, CohortTotals, Snapshot};
