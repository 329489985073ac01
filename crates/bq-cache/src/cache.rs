//! The process-wide cluster-queue cache (spec §4.2).

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, RwLock},
};

use bq_resources::{
    total_requests, Admission, ClusterQueueName, Flavor, FlavorName, ResourceName, ResourceQuantity,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::{
    error::{CacheError, InternalInvariantViolationSnafu, UnknownClusterQueueSnafu},
    snapshot::{ClusterQueueSnapshot, CohortTotals, Snapshot},
};

pub type UsageKey = (ResourceName, FlavorName);

/// Queueing strategy, mirrored from `bq-api::QueueingStrategy` so this crate
/// doesn't depend on the CRD crate — the cache only needs to remember which
/// strategy a cluster queue declared, not parse or validate it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum QueueingStrategy {
    #[default]
    StrictFifo,
    BestEffortFifo,
}

/// The static (operator-declared) shape of a cluster queue: its namespace
/// selector, queueing strategy, cohort membership, and the flavors
/// available per resource, in declared order (Stage 2 walks flavors "in
/// their declared order").
#[derive(Clone, Debug)]
pub struct ClusterQueueSpec {
    pub name: ClusterQueueName,
    pub namespace_selector: LabelSelector,
    pub queueing_strategy: QueueingStrategy,
    pub cohort: Option<String>,
    pub resources: BTreeMap<ResourceName, Vec<Flavor>>,
}

/// What one admitted workload contributed to a cluster queue's usage —
/// recorded so [`ClusterQueueCache::delete_workload`] and a cluster-queue
/// change on [`ClusterQueueCache::add_or_update_workload`] can subtract
/// exactly what was added, rather than reconstructing it from a possibly
/// stale admission record.
#[derive(Clone, Debug, Default)]
struct WorkloadUsage {
    cluster_queue: ClusterQueueName,
    per_flavor: BTreeMap<UsageKey, ResourceQuantity>,
}

#[derive(Clone, Debug, Default)]
struct ClusterQueueState {
    spec: Option<ClusterQueueSpec>,
    usage: BTreeMap<UsageKey, ResourceQuantity>,
    workloads: BTreeSet<String>,
}

#[derive(Default)]
struct State {
    cluster_queues: BTreeMap<ClusterQueueName, ClusterQueueState>,
    workload_usage: BTreeMap<String, WorkloadUsage>,
}

/// Process-wide mirror of every cluster queue (spec §4.2). Cheaply
/// cloneable — clones share the same underlying lock.
#[derive(Clone, Default)]
pub struct ClusterQueueCache {
    state: Arc<RwLock<State>>,
}

impl ClusterQueueCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self), fields(cluster_queue = %spec.name))]
    pub fn add_cluster_queue(&self, spec: ClusterQueueSpec) {
        self.upsert_cluster_queue(spec);
    }

    #[tracing::instrument(skip(self), fields(cluster_queue = %spec.name))]
    pub fn update_cluster_queue(&self, spec: ClusterQueueSpec) {
        self.upsert_cluster_queue(spec);
    }

    fn upsert_cluster_queue(&self, spec: ClusterQueueSpec) {
        let mut state = self.state.write().expect("cache lock poisoned");
        let entry = state.cluster_queues.entry(spec.name.clone()).or_default();
        entry.spec = Some(spec);
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_cluster_queue(&self, name: &ClusterQueueName) {
        let mut state = self.state.write().expect("cache lock poisoned");
        state.cluster_queues.remove(name);
    }

    /// Idempotent: applying the same `(key, admission)` twice leaves usage
    /// unchanged (spec §8 "Laws").
    #[tracing::instrument(skip(self, admission_source), fields(workload = %key))]
    pub fn add_or_update_workload(
        &self,
        key: &str,
        admission: &Admission,
        admission_source: &[bq_resources::PodSetRequest],
    ) -> Result<(), CacheError> {
        let new_usage = self.compute_usage(admission, admission_source)?;

        let mut state = self.state.write().expect("cache lock poisoned");

        if let Some(previous) = state.workload_usage.get(key).cloned() {
            if previous.cluster_queue == admission.cluster_queue && previous.per_flavor == new_usage {
                return Ok(());
            }
            Self::apply_delta(&mut state, &previous.cluster_queue, &previous.per_flavor, false);
        }

        Self::apply_delta(&mut state, &admission.cluster_queue, &new_usage, true);
        if let Some(cq) = state.cluster_queues.get_mut(&admission.cluster_queue) {
            cq.workloads.insert(key.to_owned());
        }
        state.workload_usage.insert(
            key.to_owned(),
            WorkloadUsage {
                cluster_queue: admission.cluster_queue.clone(),
                per_flavor: new_usage,
            },
        );
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_workload(&self, key: &str) {
        let mut state = self.state.write().expect("cache lock poisoned");
        let Some(previous) = state.workload_usage.remove(key) else {
            return;
        };
        Self::apply_delta(&mut state, &previous.cluster_queue, &previous.per_flavor, false);
        if let Some(cq) = state.cluster_queues.get_mut(&previous.cluster_queue) {
            cq.workloads.remove(key);
        }
    }

    fn apply_delta(
        state: &mut State,
        cluster_queue: &ClusterQueueName,
        delta: &BTreeMap<UsageKey, ResourceQuantity>,
        add: bool,
    ) {
        let Some(cq) = state.cluster_queues.get_mut(cluster_queue) else {
            // The cluster queue was deleted out from under an admitted
            // workload; there is nothing left to adjust.
            return;
        };
        for (usage_key, amount) in delta {
            let entry = cq.usage.entry(usage_key.clone()).or_default();
            *entry = if add { *entry + *amount } else { *entry - *amount };
        }
    }

    fn compute_usage(
        &self,
        admission: &Admission,
        pod_sets: &[bq_resources::PodSetRequest],
    ) -> Result<BTreeMap<UsageKey, ResourceQuantity>, CacheError> {
        let state = self.state.read().expect("cache lock poisoned");
        let cq = state
            .cluster_queues
            .get(&admission.cluster_queue)
            .context_unknown(&admission.cluster_queue)?;
        let spec = cq.spec.as_ref().context_unknown(&admission.cluster_queue)?;

        let mut usage: BTreeMap<UsageKey, ResourceQuantity> = BTreeMap::new();
        for pod_set in pod_sets {
            let Some(chosen) = admission
                .pod_set_flavors
                .iter()
                .find(|psf| psf.name == pod_set.name)
            else {
                continue;
            };
            for (resource, quantity) in total_requests(pod_set) {
                let Some(flavor) = chosen.flavors.get(&resource) else {
                    continue;
                };
                if !spec
                    .resources
                    .get(&resource)
                    .is_some_and(|flavors| flavors.iter().any(|f| &f.name == flavor))
                {
                    return InternalInvariantViolationSnafu {
                        cluster_queue: admission.cluster_queue.clone(),
                        resource: resource.clone(),
                        flavor: flavor.clone(),
                    }
                    .fail();
                }
                let key = (resource, flavor.clone());
                let entry = usage.entry(key).or_default();
                *entry += quantity;
            }
        }
        Ok(usage)
    }

    /// Returns a deep, immutable point-in-time copy (spec §4.2). Copying
    /// happens entirely under the read lock; callers do their scheduling
    /// computation against the returned value without holding it.
    #[tracing::instrument(skip(self))]
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read().expect("cache lock poisoned");

        let mut cohort_guaranteed: BTreeMap<String, BTreeMap<UsageKey, ResourceQuantity>> = BTreeMap::new();
        let mut cohort_used: BTreeMap<String, BTreeMap<UsageKey, ResourceQuantity>> = BTreeMap::new();

        for cq in state.cluster_queues.values() {
            let Some(spec) = &cq.spec else { continue };
            let Some(cohort) = &spec.cohort else { continue };
            for (resource, flavors) in &spec.resources {
                for flavor in flavors {
                    let usage_key = (resource.clone(), flavor.name.clone());
                    *cohort_guaranteed
                        .entry(cohort.clone())
                        .or_default()
                        .entry(usage_key.clone())
                        .or_default() += flavor.guaranteed;
                    let used = cq.usage.get(&usage_key).copied().unwrap_or_default();
                    *cohort_used.entry(cohort.clone()).or_default().entry(usage_key).or_default() += used;
                }
            }
        }

        let cluster_queues = state
            .cluster_queues
            .iter()
            .filter_map(|(name, cq)| {
                let spec = cq.spec.clone()?;
                let cohort_totals = spec.cohort.as_ref().map(|cohort| CohortTotals {
                    guaranteed: cohort_guaranteed.get(cohort).cloned().unwrap_or_default(),
                    used: cohort_used.get(cohort).cloned().unwrap_or_default(),
                });
                Some((
                    name.clone(),
                    ClusterQueueSnapshot {
                        name: name.clone(),
                        namespace_selector: spec.namespace_selector,
                        queueing_strategy: spec.queueing_strategy,
                        cohort: spec.cohort,
                        resources: spec.resources,
                        usage: cq.usage.clone(),
                        workloads: cq.workloads.clone(),
                        cohort_totals,
                    },
                ))
            })
            .collect();

        Snapshot { cluster_queues }
    }
}

trait OptionExt<T> {
    fn context_unknown(self, name: &ClusterQueueName) -> Result<T, CacheError>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context_unknown(self, name: &ClusterQueueName) -> Result<T, CacheError> {
        self.ok_or_else(|| {
            UnknownClusterQueueSnafu { name: name.clone() }.build()
        })
    }
}
