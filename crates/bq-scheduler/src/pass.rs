//! One schedule cycle: Stages 1–4 of spec §4.4 (snapshot is taken by the
//! caller; Stage 5/6 live in [`crate::scheduler`]).

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use bq_cache::Snapshot;
use bq_queue::{Candidate, Queueable};
use bq_resources::{
    flavor_admits, total_requests, Admission, ClusterQueueName, FlavorName, PodSetFlavors,
    ResourceName, ResourceQuantity,
};

type UsageKey = (ResourceName, FlavorName);

/// Why a candidate didn't make it into this pass's admitted set.
#[derive(Debug)]
pub enum Blocked {
    /// Pre-enqueue (spec §6/§7): the workload's namespace doesn't satisfy
    /// its local queue's cluster queue's namespace selector.
    NamespaceMismatch(String),
    /// Stage 2: no flavor satisfies some resource of some pod-set.
    NoFit(String),
    /// Stage 4: fit the snapshot taken at Stage 1, but lost the race
    /// against other entries admitted earlier in the same pass.
    Conflict(String),
}

impl Blocked {
    pub fn reason(&self) -> &str {
        match self {
            Blocked::NamespaceMismatch(reason) | Blocked::NoFit(reason) | Blocked::Conflict(reason) => reason,
        }
    }
}

/// A candidate that fit a flavor against the Stage-1 snapshot, carrying
/// everything Stage 3/4 need.
pub struct FittingEntry<W> {
    pub key: String,
    pub cluster_queue: ClusterQueueName,
    pub cohort: Option<String>,
    pub workload: Arc<W>,
    pub created_at: i64,
    pub pod_set_flavors: Vec<PodSetFlavors>,
    pub per_flavor_need: BTreeMap<UsageKey, ResourceQuantity>,
    pub borrows: BTreeMap<UsageKey, ResourceQuantity>,
}

/// Stage 2: flavor assignment against the immutable Stage-1 snapshot.
///
/// Returns fitting entries and, separately, the first blocking reason for
/// every candidate that didn't fit.
pub fn assign_flavors<W: Queueable>(
    snapshot: &Snapshot,
    heads: Vec<Candidate<W>>,
) -> (Vec<FittingEntry<W>>, Vec<(String, Blocked)>) {
    let mut fitting = Vec::new();
    let mut blocked = Vec::new();

    for candidate in heads {
        match assign_one(snapshot, &candidate) {
            Ok(entry) => fitting.push(entry),
            Err(reason) => blocked.push((candidate.key.clone(), reason)),
        }
    }

    (fitting, blocked)
}

fn assign_one<W: Queueable>(snapshot: &Snapshot, candidate: &Candidate<W>) -> Result<FittingEntry<W>, Blocked> {
    let cq = snapshot.cluster_queue(&candidate.cluster_queue).ok_or_else(|| {
        Blocked::NoFit(format!("cluster queue {} is no longer in the cache", candidate.cluster_queue))
    })?;

    match bq_resources::selector_matches(&cq.namespace_selector, candidate.workload.namespace_labels()) {
        Ok(true) => {}
        Ok(false) => {
            return Err(Blocked::NamespaceMismatch(format!(
                "namespace {} does not satisfy cluster queue {}'s namespace selector",
                candidate.workload.namespace(),
                candidate.cluster_queue
            )))
        }
        Err(err) => return Err(Blocked::NamespaceMismatch(format!("malformed namespace selector: {err}"))),
    }

    let mut pod_set_flavors = Vec::new();
    let mut per_flavor_need: BTreeMap<UsageKey, ResourceQuantity> = BTreeMap::new();
    let mut borrows: BTreeMap<UsageKey, ResourceQuantity> = BTreeMap::new();

    for pod_set in candidate.workload.pod_sets() {
        let mut flavors_for_pod_set = BTreeMap::new();
        for (resource, need) in total_requests(pod_set) {
            let Some(candidate_flavors) = cq.resources.get(&resource) else {
                return Err(Blocked::NoFit(format!("cluster queue declares no flavors for resource {resource}")));
            };
            let declared_keys: BTreeSet<String> = candidate_flavors
                .iter()
                .flat_map(|f| f.node_labels.keys().cloned())
                .collect();

            let chosen = candidate_flavors.iter().find_map(|flavor| {
                if flavor_admits(flavor, &pod_set.name, &pod_set.placement, &declared_keys).is_err() {
                    return None;
                }
                let usage_key = (resource.clone(), flavor.name.clone());
                // Fold in whatever this same candidate's earlier pod-sets
                // already claimed against this flavor — two pod-sets sharing
                // one flavor's remaining capacity must sum-check against
                // each other, not just against the pre-pass snapshot.
                let already_claimed = per_flavor_need.get(&usage_key).copied().unwrap_or_default();
                let used = cq.used(&usage_key) + already_claimed;

                if used + need <= flavor.guaranteed {
                    return Some((usage_key, false));
                }

                if let Some(totals) = &cq.cohort_totals {
                    let already_borrowed = borrows.get(&usage_key).copied().unwrap_or_default();
                    let cohort_used = totals.used.get(&usage_key).copied().unwrap_or_default() + already_borrowed;
                    let cohort_requestable = totals.guaranteed.get(&usage_key).copied().unwrap_or_default();
                    if cohort_used + need <= cohort_requestable && used + need <= flavor.ceiling {
                        return Some((usage_key, true));
                    }
                }
                None
            });

            let Some((usage_key, borrowed)) = chosen else {
                return Err(Blocked::NoFit(format!(
                    "pod-set {:?} has no flavor of {resource} with enough {}",
                    pod_set.name,
                    if cq.cohort.is_some() { "guarantee or cohort headroom" } else { "guarantee" }
                )));
            };

            flavors_for_pod_set.insert(resource.clone(), usage_key.1.clone());
            *per_flavor_need.entry(usage_key.clone()).or_default() += need;
            if borrowed {
                *borrows.entry(usage_key).or_default() += need;
            }
        }
        pod_set_flavors.push(PodSetFlavors {
            name: pod_set.name.clone(),
            flavors: flavors_for_pod_set,
        });
    }

    Ok(FittingEntry {
        key: candidate.key.clone(),
        cluster_queue: candidate.cluster_queue.clone(),
        cohort: cq.cohort.clone(),
        workload: Arc::clone(&candidate.workload),
        created_at: candidate.workload.created_at_unix_nanos(),
        pod_set_flavors,
        per_flavor_need,
        borrows,
    })
}

/// Stage 3: non-borrowing first, then `creationTimestamp` ascending, then
/// `(namespace, name)` lexicographically.
pub fn order_entries<W: Queueable>(mut entries: Vec<FittingEntry<W>>) -> Vec<FittingEntry<W>> {
    entries.sort_by(|a, b| {
        a.borrows
            .is_empty()
            .cmp(&b.borrows.is_empty())
            .reverse()
            .then(a.created_at.cmp(&b.created_at))
            .then_with(|| (a.workload.namespace(), a.workload.name()).cmp(&(b.workload.namespace(), b.workload.name())))
    });
    entries
}

/// Per-cluster-queue working copy of usage, mutated as Stage 4 admits
/// entries so subsequent entries in the same pass see updated usage (spec
/// §4.4 "update the working copy ... so subsequent entries see the new
/// usage").
struct WorkingUsage {
    per_cluster_queue: BTreeMap<ClusterQueueName, BTreeMap<UsageKey, ResourceQuantity>>,
    cohort_used: BTreeMap<String, BTreeMap<UsageKey, ResourceQuantity>>,
}

impl WorkingUsage {
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut per_cluster_queue = BTreeMap::new();
        let mut cohort_used = BTreeMap::new();
        for (name, cq) in &snapshot.cluster_queues {
            per_cluster_queue.insert(name.clone(), cq.usage.clone());
            if let Some(cohort) = &cq.cohort {
                cohort_used.entry(cohort.clone()).or_insert_with(|| {
                    cq.cohort_totals.as_ref().map(|t| t.used.clone()).unwrap_or_default()
                });
            }
        }
        Self { per_cluster_queue, cohort_used }
    }

    fn used(&self, cq: &ClusterQueueName, key: &UsageKey) -> ResourceQuantity {
        self.per_cluster_queue
            .get(cq)
            .and_then(|m| m.get(key))
            .copied()
            .unwrap_or_default()
    }

    fn cohort_used(&self, cohort: &str, key: &UsageKey) -> ResourceQuantity {
        self.cohort_used.get(cohort).and_then(|m| m.get(key)).copied().unwrap_or_default()
    }

    fn admit(&mut self, cq: &ClusterQueueName, cohort: Option<&str>, need: &BTreeMap<UsageKey, ResourceQuantity>) {
        let usage = self.per_cluster_queue.entry(cq.clone()).or_default();
        for (key, amount) in need {
            *usage.entry(key.clone()).or_default() += *amount;
        }
        if let Some(cohort) = cohort {
            let used = self.cohort_used.entry(cohort.to_owned()).or_default();
            for (key, amount) in need {
                *used.entry(key.clone()).or_default() += *amount;
            }
        }
    }
}

/// Stage 4: conflict resolution across cohorts. Re-validates each entry's
/// Stage-2 assignment against the working copy (entries admitted earlier in
/// the same pass have already grown `used`), then enforces "at most one
/// borrowing admission per cohort per pass" (spec §4.4, preserving I4
/// against stale snapshot reads).
pub fn resolve_conflicts<W: Queueable>(
    snapshot: &Snapshot,
    ordered: Vec<FittingEntry<W>>,
) -> (Vec<FittingEntry<W>>, Vec<(String, Blocked)>) {
    let mut working = WorkingUsage::from_snapshot(snapshot);
    let mut assigned_cohorts: BTreeSet<String> = BTreeSet::new();
    let mut admitted = Vec::new();
    let mut blocked = Vec::new();

    for entry in ordered {
        let cq_snapshot = snapshot.cluster_queue(&entry.cluster_queue);

        let still_fits = entry.per_flavor_need.iter().all(|(key, need)| {
            let used = working.used(&entry.cluster_queue, key);
            let Some(flavor) = cq_snapshot
                .and_then(|cq| cq.resources.get(&key.0))
                .and_then(|flavors| flavors.iter().find(|f| &f.name == &key.1))
            else {
                return false;
            };
            if let Some(borrowed_amount) = entry.borrows.get(key) {
                let cohort_ok = entry.cohort.as_deref().is_some_and(|cohort| {
                    let cohort_requestable = snapshot
                        .cluster_queue(&entry.cluster_queue)
                        .and_then(|cq| cq.cohort_totals.as_ref())
                        .and_then(|t| t.guaranteed.get(key).copied())
                        .unwrap_or_default();
                    working.cohort_used(cohort, key) + *borrowed_amount <= cohort_requestable
                });
                cohort_ok && used + *need <= flavor.ceiling
            } else {
                used + *need <= flavor.guaranteed
            }
        });

        if !still_fits {
            blocked.push((entry.key.clone(), Blocked::Conflict("usage shifted under concurrent admissions this pass".to_string())));
            continue;
        }

        if !entry.borrows.is_empty() {
            if let Some(cohort) = &entry.cohort {
                if assigned_cohorts.contains(cohort) {
                    blocked.push((
                        entry.key.clone(),
                        Blocked::Conflict(format!("cohort {cohort} already admitted a borrowing entry this pass")),
                    ));
                    continue;
                }
            }
        }

        working.admit(&entry.cluster_queue, entry.cohort.as_deref(), &entry.per_flavor_need);
        if let Some(cohort) = &entry.cohort {
            assigned_cohorts.insert(cohort.clone());
        }
        admitted.push(entry);
    }

    (admitted, blocked)
}

pub fn to_admission<W>(entry: &FittingEntry<W>) -> Admission {
    Admission {
        cluster_queue: entry.cluster_queue.clone(),
        pod_set_flavors: entry.pod_set_flavors.clone(),
    }
}
