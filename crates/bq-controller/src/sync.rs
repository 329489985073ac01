//! Kubernetes watch glue: turns `ClusterQueue`/`LocalQueue`/`Namespace`/
//! `Workload` watch events into calls against the admission core's
//! in-memory state (spec §4.2, §4.3, §6, §9).
//!
//! Each `watch_*` function runs one watch loop until its stream ends; kube's
//! own watcher restarts the underlying `list`/`watch` on transient API
//! errors, so a loop only returns for good on client shutdown.

use std::{collections::BTreeMap, sync::Arc};

use bq_api::{ClusterQueue, LocalQueue, QueueingStrategy as WireQueueingStrategy, Workload, WorkloadAdapter};
use bq_cache::{ClusterQueueCache, ClusterQueueSpec, QueueingStrategy as CacheQueueingStrategy};
use bq_queue::{QueueManager, QueueingStrategy as QueueQueueingStrategy};
use bq_resources::{ClusterQueueName, ResourceName, WorkloadLike};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    runtime::watcher::{self, Event},
    Api, Client, ResourceExt,
};
use tokio::sync::RwLock;
use tracing::warn;

/// Live mirror of every `Namespace`'s labels, kept current by
/// [`watch_namespaces`] and consulted by [`watch_workloads`] when building
/// each [`WorkloadAdapter`] — namespace selectors match against the
/// `Namespace` object's own labels, not the workload's (spec §6).
#[derive(Clone, Default)]
pub struct NamespaceLabels(Arc<RwLock<BTreeMap<String, BTreeMap<String, String>>>>);

impl NamespaceLabels {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, namespace: &str) -> BTreeMap<String, String> {
        self.0.read().await.get(namespace).cloned().unwrap_or_default()
    }

    async fn set(&self, namespace: String, labels: BTreeMap<String, String>) {
        self.0.write().await.insert(namespace, labels);
    }

    async fn forget(&self, namespace: &str) {
        self.0.write().await.remove(namespace);
    }
}

/// `bq-cache` and `bq-queue` each carry their own copy of this enum so
/// neither depends on `bq-api` (see DESIGN.md); this is the one place that
/// translates between all three.
fn map_strategy(strategy: WireQueueingStrategy) -> (CacheQueueingStrategy, QueueQueueingStrategy) {
    match strategy {
        WireQueueingStrategy::StrictFifo => (CacheQueueingStrategy::StrictFifo, QueueQueueingStrategy::StrictFifo),
        WireQueueingStrategy::BestEffortFifo => {
            (CacheQueueingStrategy::BestEffortFifo, QueueQueueingStrategy::BestEffortFifo)
        }
    }
}

#[tracing::instrument(skip(client, labels))]
pub async fn watch_namespaces(client: Client, labels: NamespaceLabels) {
    let api: Api<Namespace> = Api::all(client);
    let mut events = watcher::watcher(api, watcher::Config::default()).boxed();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "namespace watch failed, will retry");
                continue;
            }
        };
        match event {
            Event::Apply(ns) | Event::InitApply(ns) => {
                labels.set(ns.name_any(), ns.labels().clone()).await;
            }
            Event::Delete(ns) => labels.forget(&ns.name_any()).await,
            Event::Init | Event::InitDone => {}
        }
    }
}

#[tracing::instrument(skip(client, cache, queue))]
pub async fn watch_cluster_queues<W>(client: Client, cache: ClusterQueueCache, queue: QueueManager<W>)
where
    W: bq_queue::Queueable,
{
    let api: Api<ClusterQueue> = Api::all(client);
    let mut events = watcher::watcher(api, watcher::Config::default()).boxed();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "cluster queue watch failed, will retry");
                continue;
            }
        };
        match event {
            Event::Apply(cq) | Event::InitApply(cq) => apply_cluster_queue(&cache, &queue, &cq),
            Event::Delete(cq) => {
                let name = ClusterQueueName(cq.name_any());
                cache.delete_cluster_queue(&name);
                queue.delete_cluster_queue(&name);
            }
            Event::Init | Event::InitDone => {}
        }
    }
}

fn apply_cluster_queue<W: bq_queue::Queueable>(cache: &ClusterQueueCache, queue: &QueueManager<W>, cq: &ClusterQueue) {
    let name = ClusterQueueName(cq.name_any());
    let (cache_strategy, queue_strategy) = map_strategy(cq.spec.queueing_strategy);

    let mut resources = BTreeMap::new();
    for entry in &cq.spec.requestable_resources {
        resources.insert(ResourceName(entry.name.clone()), entry.flavors.clone());
    }

    cache.add_cluster_queue(ClusterQueueSpec {
        name: name.clone(),
        namespace_selector: cq.spec.namespace_selector.clone(),
        queueing_strategy: cache_strategy,
        cohort: cq.spec.cohort.clone(),
        resources,
    });
    queue.sync_cluster_queue(&name, queue_strategy);
}

#[tracing::instrument(skip(client, queue))]
pub async fn watch_local_queues<W: bq_queue::Queueable>(client: Client, queue: QueueManager<W>) {
    let api: Api<LocalQueue> = Api::all(client);
    let mut events = watcher::watcher(api, watcher::Config::default()).boxed();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "local queue watch failed, will retry");
                continue;
            }
        };
        match event {
            Event::Apply(lq) | Event::InitApply(lq) => {
                let Some(namespace) = lq.namespace() else { continue };
                queue.sync_local_queue(&namespace, &lq.name_any(), &ClusterQueueName(lq.spec.cluster_queue.clone()));
            }
            Event::Delete(lq) => {
                let Some(namespace) = lq.namespace() else { continue };
                queue.delete_local_queue(&namespace, &lq.name_any());
            }
            Event::Init | Event::InitDone => {}
        }
    }
}

/// Mirrors `Workload` create/update/delete into the queue manager and cache
/// (spec §4.3 `AddOrUpdate`/`Requeue`'s counterpart on the watch side): an
/// already admitted workload (`spec.admission.is_some()`) belongs to the
/// cache, not the pending queue (spec §4.2/§4.3 boundary), so its usage is
/// fed into `cache` instead of enqueued — this is what lets a freshly
/// started controller (or a second replica) learn the usage of everything
/// admitted before its own lifetime, same as `bq-scheduler`'s own post-
/// commit `cache.add_or_update_workload` call.
#[tracing::instrument(skip(client, cache, queue, namespace_labels))]
pub async fn watch_workloads(
    client: Client,
    cache: ClusterQueueCache,
    queue: QueueManager<WorkloadAdapter>,
    namespace_labels: NamespaceLabels,
) {
    let api: Api<Workload> = Api::all(client);
    let mut events = watcher::watcher(api, watcher::Config::default()).boxed();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "workload watch failed, will retry");
                continue;
            }
        };
        match event {
            Event::Apply(w) | Event::InitApply(w) => {
                let namespace = w.namespace().unwrap_or_default();
                let labels = namespace_labels.get(&namespace).await;
                let key = format!("{namespace}/{}", w.name_any());
                let adapter = match WorkloadAdapter::try_new(w, labels) {
                    Ok(adapter) => adapter,
                    Err(err) => {
                        warn!(error = %err, "workload has unparseable pod-set requests, ignoring");
                        continue;
                    }
                };
                match adapter.admission() {
                    Some(admission) => {
                        if let Err(err) = cache.add_or_update_workload(&key, admission, adapter.pod_sets()) {
                            warn!(error = %err, "failed to fold already-admitted workload's usage into the cache");
                        }
                    }
                    None => queue.add_or_update(Arc::new(adapter)),
                }
            }
            Event::Delete(w) => {
                let key = format!("{}/{}", w.namespace().unwrap_or_default(), w.name_any());
                queue.remove(&key);
            }
            Event::Init | Event::InitDone => {}
        }
    }
}
