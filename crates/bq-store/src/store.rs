//! The [`WorkloadStore`] abstraction: compare-and-set persistence of a
//! workload's admission (spec §4.4 Stage 5).

use async_trait::async_trait;
use bq_resources::Admission;

use crate::error::CommitError;

/// Persists a scheduling decision. `commit` is a compare-and-set against
/// the workload record's current (nil) `Admission`: it must fail with
/// [`CommitError::Conflict`] if the record already carries one, so a
/// workload is never admitted twice (spec §8 "Laws").
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn commit(
        &self,
        namespace: &str,
        name: &str,
        admission: Admission,
    ) -> Result<(), CommitError>;
}
