//! Capability set for workload-like job-framework adapters (spec §4.5, §9).
//!
//! Instead of committing the core to one concrete workload type, callers
//! implement [`WorkloadLike`] for whatever their job framework represents a
//! workload as. `bq-api` provides the implementation for the CRD-backed
//! `Workload` this repository persists; other adapters can supply their own
//! without this crate (or `bq-cache`/`bq-queue`/`bq-scheduler`, which only
//! depend on the trait) ever knowing the difference.

use std::{collections::BTreeMap, fmt};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{flavor::FlavorName, quantity::ResourceName, ResourceQuantity};

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, JsonSchema, Serialize)]
#[serde(transparent)]
pub struct ClusterQueueName(pub String);

impl fmt::Display for ClusterQueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterQueueName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A required node-affinity term, reduced to the label equalities it
/// requires (spec §4.1 (c)). Preferred terms and weighted scoring are a
/// node-scoring concern and out of scope here (spec §1).
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct AffinityTerm {
    pub match_labels: BTreeMap<String, String>,
}

/// The placement constraints of a pod-set: node selector, taints it
/// tolerates, and required affinity terms.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct PodPlacement {
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub tolerations: Vec<crate::flavor::Toleration>,
    #[serde(default)]
    pub affinity_terms: Vec<AffinityTerm>,
}

/// A homogeneous group within a workload: `count` pods, each requesting
/// `requests_per_pod` of every resource, with common placement constraints.
#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct PodSetRequest {
    pub name: String,
    pub count: u32,
    pub requests_per_pod: BTreeMap<ResourceName, ResourceQuantity>,
    #[serde(default)]
    pub placement: PodPlacement,
}

/// The per-pod-set flavor choice persisted once a workload is admitted.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct PodSetFlavors {
    pub name: String,
    pub flavors: BTreeMap<ResourceName, FlavorName>,
}

/// The scheduler's durable decision (spec §3 `Admission`): the chosen
/// cluster queue plus, per pod-set, the resource→flavor map.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct Admission {
    pub cluster_queue: ClusterQueueName,
    pub pod_set_flavors: Vec<PodSetFlavors>,
}

/// The capability set a job-framework adapter must supply to make its
/// workloads schedulable by this core (spec §9 "runtime polymorphism over
/// job kinds").
pub trait WorkloadLike {
    fn namespace(&self) -> &str;
    fn name(&self) -> &str;
    fn queue_name(&self) -> &str;
    fn pod_sets(&self) -> &[PodSetRequest];
    fn admission(&self) -> Option<&Admission>;
}

/// `Key(w) = namespace + "/" + name` (spec §4.5).
pub fn key(workload: &impl WorkloadLike) -> String {
    format!("{}/{}", workload.namespace(), workload.name())
}

/// `TotalRequests(w)`: per pod-set, the resource→quantity map for the
/// pod-set's full count (spec §4.1, §4.5). The spec notes this is "computed
/// once and cached on the entry" — the entry in question is the scheduler's
/// candidate record (see `bq-scheduler`), not the workload itself, so this
/// function stays a pure, side-effect-free computation and callers decide
/// whether/where to memoize it.
pub fn total_requests(pod_set: &PodSetRequest) -> BTreeMap<ResourceName, ResourceQuantity> {
    pod_set
        .requests_per_pod
        .iter()
        .map(|(resource, per_pod)| (resource.clone(), per_pod.saturating_mul(pod_set.count)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    struct Fixture {
        namespace: String,
        name: String,
        queue: String,
        pod_sets: Vec<PodSetRequest>,
        admission: Option<Admission>,
    }

    impl WorkloadLike for Fixture {
        fn namespace(&self) -> &str {
            &self.namespace
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn queue_name(&self) -> &str {
            &self.queue
        }

        fn pod_sets(&self) -> &[PodSetRequest] {
            &self.pod_sets
        }

        fn admission(&self) -> Option<&Admission> {
            self.admission.as_ref()
        }
    }

    #[test]
    fn key_joins_namespace_and_name() {
        let w = Fixture {
            namespace: "sales".to_string(),
            name: "foo".to_string(),
            queue: "team-queue".to_string(),
            pod_sets: vec![],
            admission: None,
        };
        assert_eq!(key(&w), "sales/foo");
    }

    #[test]
    fn total_requests_multiplies_by_count() {
        let pod_set = PodSetRequest {
            name: "main".to_string(),
            count: 10,
            requests_per_pod: BTreeMap::from([("cpu".into(), ResourceQuantity::new(1))]),
            placement: PodPlacement::default(),
        };
        let totals = total_requests(&pod_set);
        assert_eq!(totals[&ResourceName::from("cpu")], ResourceQuantity::new(10));
    }
}
