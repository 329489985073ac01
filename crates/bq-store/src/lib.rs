//! Persistence of admission decisions behind one compare-and-set contract
//! (spec §4.4 Stage 5).

pub mod error;
pub mod kube_store;
pub mod memory;
pub mod store;

pub use error::CommitError;
pub use kube_store::KubeWorkloadStore;
pub use memory::InMemoryWorkloadStore;
pub use store::WorkloadStore;
