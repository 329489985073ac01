//! Persisted object schema and adapters, external to the admission core.

pub mod adapter;
pub mod crd;
pub mod quantity_parse;

pub use adapter::WorkloadAdapter;
pub use crd::{
    ClusterQueue, ClusterQueueSpec, LocalQueue, LocalQueueSpec, PodSetConversionError, PodSetSpec,
    QueueingStrategy, ResourceFlavors, Workload, WorkloadSpec,
};
