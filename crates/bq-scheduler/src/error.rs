use bq_cache::CacheError;
use bq_store::CommitError;
use snafu::Snafu;

/// Composed error type for the scheduling loop (spec §7), following the
/// teacher's per-module-then-composed error style:
/// [`ScheduleError::InternalInvariantViolation`] is the only variant whose
/// handler aborts the process; everything else is handled within the pass
/// (conflict/not-found/transport → revoke & requeue).
#[derive(Debug, Snafu)]
pub enum ScheduleError {
    #[snafu(display("cluster-queue cache error: {source}"))]
    Cache { source: CacheError },

    #[snafu(display("commit failed: {source}"))]
    Commit { source: CommitError },

    #[snafu(display("internal invariant violation: {detail}"))]
    InternalInvariantViolation { detail: String },
}

impl ScheduleError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ScheduleError::InternalInvariantViolation { .. }
                | ScheduleError::Cache {
                    source: CacheError::InternalInvariantViolation { .. }
                }
        )
    }
}

/// Aborts the process on an unrecoverable invariant violation (spec §7),
/// matching [`bq_cache::error::abort_on_invariant_violation`]'s posture at
/// the scheduler level.
pub fn abort_on_invariant_violation(err: &ScheduleError) -> ! {
    tracing::error!(error = %err, "internal invariant violation in scheduler, aborting");
    std::process::abort();
}
