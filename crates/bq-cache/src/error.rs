use bq_resources::{ClusterQueueName, FlavorName, ResourceName};
use snafu::Snafu;

/// Errors from the cluster-queue cache (spec §7).
///
/// [`CacheError::InternalInvariantViolation`] is the only fatal variant in
/// the whole admission pipeline — every other error here just means the
/// caller asked about a cluster queue that doesn't exist (yet), which is a
/// normal and expected race between informer event ordering and caller
/// lookups, not a correctness problem.
#[derive(Debug, Snafu)]
pub enum CacheError {
    #[snafu(display("cluster queue {name} is not present in the cache"))]
    UnknownClusterQueue { name: ClusterQueueName },

    #[snafu(display(
        "workload admission references flavor {flavor} of resource {resource} which cluster queue {cluster_queue} does not declare"
    ))]
    InternalInvariantViolation {
        cluster_queue: ClusterQueueName,
        resource: ResourceName,
        flavor: FlavorName,
    },
}

impl CacheError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, CacheError::InternalInvariantViolation { .. })
    }
}

/// Aborts the process, per spec §7: `InternalInvariantViolation` must never
/// be silently absorbed, since continuing risks committing further
/// decisions on top of already-corrupted quota accounting.
pub fn abort_on_invariant_violation(err: &CacheError) -> ! {
    tracing::error!(error = %err, "internal invariant violation in cluster-queue cache, aborting");
    std::process::abort();
}
