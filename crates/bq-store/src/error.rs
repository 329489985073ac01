use snafu::Snafu;

/// Stage 5 commit failures (spec §7). Both dispositions are the same at
/// the scheduler: revoke the working-copy delta, then `Requeue` — the
/// difference matters only for observability.
#[derive(Debug, Snafu)]
pub enum CommitError {
    #[snafu(display("workload {key} already has an admission recorded"))]
    Conflict { key: String },

    #[snafu(display("workload {key} no longer exists"))]
    NotFound { key: String },

    #[snafu(display("transport error persisting admission for {key}: {source}"))]
    Transport { key: String, source: kube::Error },
}
