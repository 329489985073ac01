//! Adapts the persisted [`Workload`] CRD to the core's [`WorkloadLike`]/
//! [`Queueable`] capability set (spec §9).

use std::collections::BTreeMap;

use bq_queue::Queueable;
use bq_resources::{Admission, PodSetRequest, WorkloadLike};

use crate::crd::{PodSetConversionError, Workload};

/// A `Workload` with its pod-sets parsed into canonical quantities once, at
/// construction, rather than on every scheduling pass.
///
/// `namespace_labels` comes from the `Namespace` object the workload lives
/// in, not from the workload's own labels — the informer glue that builds
/// this adapter is expected to keep a `namespace -> labels` cache alongside
/// its `Workload` watch and pass the right entry in here.
#[derive(Clone, Debug)]
pub struct WorkloadAdapter {
    namespace: String,
    name: String,
    queue_name: String,
    pod_sets: Vec<PodSetRequest>,
    admission: Option<Admission>,
    created_at_unix_nanos: i64,
    namespace_labels: BTreeMap<String, String>,
}

impl WorkloadAdapter {
    pub fn try_new(
        workload: Workload,
        namespace_labels: BTreeMap<String, String>,
    ) -> Result<Self, PodSetConversionError> {
        let namespace = workload.metadata.namespace.clone().unwrap_or_default();
        let name = workload.metadata.name.clone().unwrap_or_default();
        let created_at_unix_nanos = workload
            .metadata
            .creation_timestamp
            .as_ref()
            .and_then(|t| t.0.timestamp_nanos_opt())
            .unwrap_or(0);
        let pod_sets = workload
            .spec
            .pod_sets
            .into_iter()
            .map(crate::crd::PodSetSpec::into_domain)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            namespace,
            name,
            queue_name: workload.spec.queue_name,
            pod_sets,
            admission: workload.spec.admission,
            created_at_unix_nanos,
            namespace_labels,
        })
    }
}

impl WorkloadLike for WorkloadAdapter {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn pod_sets(&self) -> &[PodSetRequest] {
        &self.pod_sets
    }

    fn admission(&self) -> Option<&Admission> {
        self.admission.as_ref()
    }
}

impl Queueable for WorkloadAdapter {
    fn created_at_unix_nanos(&self) -> i64 {
        self.created_at_unix_nanos
    }

    fn namespace_labels(&self) -> &BTreeMap<String, String> {
        &self.namespace_labels
    }
}
