use bq_resources::ClusterQueueName;
use snafu::Snafu;

/// Errors from the queue manager (spec §7). Both variants describe a
/// workload sitting in a side bucket, waiting on routing to resolve — an
/// expected, transient state rather than a fault.
#[derive(Debug, Snafu)]
pub enum QueueError {
    #[snafu(display("local queue {namespace}/{queue_name} does not exist"))]
    MissingLocalQueue { namespace: String, queue_name: String },

    #[snafu(display("cluster queue {cluster_queue} referenced by a local queue is not in the cache"))]
    UnroutedClusterQueue { cluster_queue: ClusterQueueName },
}
