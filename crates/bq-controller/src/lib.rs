//! Kubernetes watch glue: mirrors `ClusterQueue`, `LocalQueue`, `Namespace`,
//! and `Workload` objects into `bq-cache`/`bq-queue`'s in-memory state
//! (spec §4.2, §4.3, §6, §9).

pub mod sync;

pub use sync::{watch_cluster_queues, watch_local_queues, watch_namespaces, watch_workloads, NamespaceLabels};
