//! Pure resource arithmetic, flavor matching, and workload metadata helpers.
//!
//! This crate carries no knowledge of Kubernetes API types or persistence —
//! it operates purely on the domain shapes in [`workload`] and [`flavor`] so
//! that adapters (see `bq-api`) can translate any job-framework's notion of
//! a workload into these shapes without this crate depending on them.

pub mod flavor;
pub mod namespace_match;
pub mod quantity;
pub mod workload;

pub use flavor::{flavor_admits, Flavor, FlavorError, FlavorName, MismatchReason, Taint, TaintEffect, Toleration, TolerationOperator};
pub use namespace_match::{selector_matches, SelectorError};
pub use quantity::{ResourceName, ResourceQuantity};
pub use workload::{
    key, total_requests, Admission, AffinityTerm, ClusterQueueName, PodPlacement, PodSetFlavors,
    PodSetRequest, WorkloadLike,
};
