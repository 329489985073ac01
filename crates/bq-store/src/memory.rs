//! In-memory [`WorkloadStore`] fake used by `bq-scheduler`'s tests — same
//! compare-and-set contract as [`crate::kube_store::KubeWorkloadStore`]
//! without a live API server.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bq_resources::Admission;

use crate::{
    error::{CommitError, ConflictSnafu, NotFoundSnafu},
    store::WorkloadStore,
};

#[derive(Clone, Default)]
pub struct InMemoryWorkloadStore {
    records: Arc<Mutex<BTreeMap<String, Option<Admission>>>>,
}

impl InMemoryWorkloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a workload with no admission, as if freshly created.
    pub fn insert(&self, namespace: &str, name: &str) {
        let key = format!("{namespace}/{name}");
        self.records.lock().expect("store lock poisoned").insert(key, None);
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        let key = format!("{namespace}/{name}");
        self.records.lock().expect("store lock poisoned").remove(&key);
    }

    pub fn admission(&self, namespace: &str, name: &str) -> Option<Admission> {
        let key = format!("{namespace}/{name}");
        self.records
            .lock()
            .expect("store lock poisoned")
            .get(&key)
            .cloned()
            .flatten()
    }
}

#[async_trait]
impl WorkloadStore for InMemoryWorkloadStore {
    async fn commit(
        &self,
        namespace: &str,
        name: &str,
        admission: Admission,
    ) -> Result<(), CommitError> {
        let key = format!("{namespace}/{name}");
        let mut records = self.records.lock().expect("store lock poisoned");
        let Some(slot) = records.get_mut(&key) else {
            return NotFoundSnafu { key }.fail();
        };
        if slot.is_some() {
            return ConflictSnafu { key }.fail();
        }
        *slot = Some(admission);
        Ok(())
    }
}
