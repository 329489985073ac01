//! Persisted object schema (spec §6): `Workload`, `LocalQueue`, `ClusterQueue`.
//!
//! These follow the plain [`kube::CustomResource`] derive pattern
//! `stackable_operator::cli`'s own module-level doc example uses, rather
//! than the teacher's `#[versioned]` macro: every type here has exactly one
//! version and no migration story, so the extra machinery has nothing to
//! do (see DESIGN.md).

use std::collections::BTreeMap;

use bq_resources::{Admission, AffinityTerm, PodPlacement, PodSetRequest};
use k8s_openapi::{
    apimachinery::pkg::api::resource::Quantity, apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::quantity_parse::{self, QuantityParseError};

/// One pod-set as declared on the wire: requests are raw Kubernetes
/// quantity strings, parsed into [`bq_resources::PodSetRequest`] by
/// [`PodSetSpec::into_domain`].
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSetSpec {
    pub name: String,
    pub count: u32,
    #[serde(default)]
    pub requests: BTreeMap<String, Quantity>,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub tolerations: Vec<bq_resources::Toleration>,
    #[serde(default)]
    pub affinity_terms: Vec<AffinityTerm>,
}

#[derive(Debug, Snafu)]
pub enum PodSetConversionError {
    #[snafu(display("pod-set {pod_set:?} has an unparseable request for {resource:?}"))]
    InvalidRequest {
        pod_set: String,
        resource: String,
        source: QuantityParseError,
    },
}

impl PodSetSpec {
    pub fn into_domain(self) -> Result<PodSetRequest, PodSetConversionError> {
        let mut requests_per_pod = BTreeMap::new();
        for (resource, raw) in &self.requests {
            let quantity = quantity_parse::parse_canonical(resource, raw).with_context(|_| {
                InvalidRequestSnafu {
                    pod_set: self.name.clone(),
                    resource: resource.clone(),
                }
            })?;
            requests_per_pod.insert(resource.as_str().into(), quantity);
        }
        Ok(PodSetRequest {
            name: self.name,
            count: self.count,
            requests_per_pod,
            placement: PodPlacement {
                node_selector: self.node_selector,
                tolerations: self.tolerations,
                affinity_terms: self.affinity_terms,
            },
        })
    }
}

#[derive(Clone, CustomResource, Debug, Deserialize, JsonSchema, Serialize)]
#[kube(
    group = "batch.quota.example.org",
    version = "v1alpha1",
    kind = "Workload",
    plural = "workloads",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub pod_sets: Vec<PodSetSpec>,
    pub queue_name: String,
    pub admission: Option<Admission>,
}

#[derive(Clone, CustomResource, Debug, Deserialize, JsonSchema, Serialize)]
#[kube(
    group = "batch.quota.example.org",
    version = "v1alpha1",
    kind = "LocalQueue",
    plural = "localqueues",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LocalQueueSpec {
    pub cluster_queue: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, JsonSchema, Serialize, strum::Display)]
#[serde(rename_all = "PascalCase")]
pub enum QueueingStrategy {
    #[default]
    StrictFifo,
    BestEffortFifo,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFlavors {
    pub name: String,
    pub flavors: Vec<bq_resources::Flavor>,
}

#[derive(Clone, CustomResource, Debug, Deserialize, JsonSchema, Serialize)]
#[kube(
    group = "batch.quota.example.org",
    version = "v1alpha1",
    kind = "ClusterQueue",
    plural = "clusterqueues"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterQueueSpec {
    pub namespace_selector: LabelSelector,
    #[serde(default)]
    pub queueing_strategy: QueueingStrategy,
    pub cohort: Option<String>,
    pub requestable_resources: Vec<ResourceFlavors>,
}
