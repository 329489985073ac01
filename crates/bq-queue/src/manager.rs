//! Pending-workload buffering, routing and `Heads`/`Requeue`/`Dump` (spec
//! §4.3).

use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::{Arc, Mutex},
};

use bq_resources::{ClusterQueueName, WorkloadLike};
use tokio::sync::Notify;

/// Extends [`WorkloadLike`] with the extra facts the queue manager and
/// scheduler need that the admission core otherwise has no use for: a
/// monotonically comparable creation instant, used to order
/// `StrictFIFO`/`BestEffortFIFO` buckets (spec §4.3 "ordered by
/// creationTimestamp ascending, then name"), and the workload's namespace
/// labels, matched against a cluster queue's namespace selector (spec §6).
///
/// Kept out of `WorkloadLike` itself so `bq-cache`'s admission-core
/// dependencies don't have to carry a notion of time or namespace metadata.
pub trait Queueable: WorkloadLike {
    fn created_at_unix_nanos(&self) -> i64;

    fn namespace_labels(&self) -> &BTreeMap<String, String>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum QueueingStrategy {
    #[default]
    StrictFifo,
    BestEffortFifo,
}

/// One scheduling candidate surfaced by [`QueueManager::heads`]: the head
/// (or, under `BestEffortFIFO`, the first admissible-looking entry) of one
/// cluster queue's pending bucket.
#[derive(Clone)]
pub struct Candidate<W> {
    pub key: String,
    pub cluster_queue: ClusterQueueName,
    pub workload: Arc<W>,
}

#[derive(Clone)]
struct Entry<W> {
    key: String,
    sort_key: (i64, String),
    workload: Arc<W>,
    inadmissible_this_pass: bool,
    requeue_reason: Option<String>,
}

type Bucket<W> = BTreeMap<(i64, String), Entry<W>>;

struct State<W> {
    /// `(namespace, local queue name) -> cluster queue name`.
    routes: BTreeMap<(String, String), ClusterQueueName>,
    cluster_queues: BTreeMap<ClusterQueueName, QueueingStrategy>,
    buckets: BTreeMap<ClusterQueueName, Bucket<W>>,
    /// Side bucket: local queue not known yet, keyed by the
    /// `(namespace, queue_name)` the workload named.
    awaiting_local_queue: BTreeMap<(String, String), Bucket<W>>,
    /// Side bucket: local queue resolved to a cluster queue the cache
    /// hasn't reported yet.
    awaiting_cluster_queue: BTreeMap<ClusterQueueName, Bucket<W>>,
}

impl<W> Default for State<W> {
    fn default() -> Self {
        Self {
            routes: BTreeMap::new(),
            cluster_queues: BTreeMap::new(),
            buckets: BTreeMap::new(),
            awaiting_local_queue: BTreeMap::new(),
            awaiting_cluster_queue: BTreeMap::new(),
        }
    }
}

/// Buffers pending workloads, groups them by routing destination (local
/// queue → cluster queue), and yields scheduling candidates to the
/// scheduler (spec §4.3).
pub struct QueueManager<W> {
    state: Arc<Mutex<State<W>>>,
    notify: Arc<Notify>,
}

impl<W> Clone for QueueManager<W> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<W> Default for QueueManager<W> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl<W: Queueable> QueueManager<W> {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self))]
    pub fn sync_local_queue(&self, namespace: &str, queue_name: &str, cluster_queue: &ClusterQueueName) {
        let mut state = self.lock();
        let route_key = (namespace.to_owned(), queue_name.to_owned());
        state.routes.insert(route_key.clone(), cluster_queue.clone());

        let Some(bucket) = state.awaiting_local_queue.remove(&route_key) else {
            return;
        };
        self.redistribute(&mut state, cluster_queue.clone(), bucket);
        drop(state);
        self.notify.notify_waiters();
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_local_queue(&self, namespace: &str, queue_name: &str) {
        let mut state = self.lock();
        state.routes.remove(&(namespace.to_owned(), queue_name.to_owned()));
    }

    #[tracing::instrument(skip(self))]
    pub fn sync_cluster_queue(&self, name: &ClusterQueueName, strategy: QueueingStrategy) {
        let mut state = self.lock();
        state.cluster_queues.insert(name.clone(), strategy);

        let Some(bucket) = state.awaiting_cluster_queue.remove(name) else {
            return;
        };
        state.buckets.entry(name.clone()).or_default().extend(bucket);
        drop(state);
        self.notify.notify_waiters();
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_cluster_queue(&self, name: &ClusterQueueName) {
        let mut state = self.lock();
        state.cluster_queues.remove(name);
        if let Some(bucket) = state.buckets.remove(name) {
            state.awaiting_cluster_queue.entry(name.clone()).or_default().extend(bucket);
        }
    }

    /// `AddOrUpdate(w)` (spec §4.3). Routes through local queue → cluster
    /// queue; falls back to a side bucket when either leg is unresolved.
    #[tracing::instrument(skip(self, workload), fields(workload = %bq_resources::key(workload.as_ref())))]
    pub fn add_or_update(&self, workload: Arc<W>) {
        let key = bq_resources::key(workload.as_ref());
        let namespace = workload.namespace().to_owned();
        let queue_name = workload.queue_name().to_owned();
        let sort_key = (workload.created_at_unix_nanos(), key.clone());

        let mut state = self.lock();
        self.remove_everywhere(&mut state, &key);

        let entry = Entry {
            key: key.clone(),
            sort_key: sort_key.clone(),
            workload,
            inadmissible_this_pass: false,
            requeue_reason: None,
        };

        let route = state.routes.get(&(namespace.clone(), queue_name.clone())).cloned();
        match route {
            None => {
                state
                    .awaiting_local_queue
                    .entry((namespace, queue_name))
                    .or_default()
                    .insert(sort_key, entry);
            }
            Some(cluster_queue) => {
                if state.cluster_queues.contains_key(&cluster_queue) {
                    state.buckets.entry(cluster_queue).or_default().insert(sort_key, entry);
                } else {
                    state
                        .awaiting_cluster_queue
                        .entry(cluster_queue)
                        .or_default()
                        .insert(sort_key, entry);
                }
            }
        }
        drop(state);
        self.notify.notify_waiters();
    }

    fn redistribute(&self, state: &mut State<W>, cluster_queue: ClusterQueueName, bucket: Bucket<W>) {
        if state.cluster_queues.contains_key(&cluster_queue) {
            state.buckets.entry(cluster_queue).or_default().extend(bucket);
        } else {
            state.awaiting_cluster_queue.entry(cluster_queue).or_default().extend(bucket);
        }
    }

    fn remove_everywhere(&self, state: &mut State<W>, key: &str) {
        state.buckets.values_mut().for_each(|b| b.retain(|_, e| e.key != key));
        state.awaiting_local_queue.values_mut().for_each(|b| b.retain(|_, e| e.key != key));
        state.awaiting_cluster_queue.values_mut().for_each(|b| b.retain(|_, e| e.key != key));
    }

    /// Removes an admitted workload from its bucket entirely — driven by
    /// the store-commit success event (spec §4.4 Stage 5), not by the
    /// scheduler directly.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, key: &str) {
        let mut state = self.lock();
        self.remove_everywhere(&mut state, key);
    }

    /// `Requeue(w, reason)` (spec §4.3): preserves the workload in its
    /// bucket, marks it inadmissible for the remainder of the current
    /// pass, and records the reason for observability.
    #[tracing::instrument(skip(self))]
    pub fn requeue(&self, key: &str, reason: &str) {
        let mut state = self.lock();
        for bucket in state.buckets.values_mut() {
            if let Some(entry) = bucket.values_mut().find(|e| e.key == key) {
                entry.inadmissible_this_pass = true;
                entry.requeue_reason = Some(reason.to_owned());
                tracing::debug!(workload = %key, reason, "requeued");
                return;
            }
        }
    }

    /// `Heads(ctx)` (spec §4.3): blocks until at least one bucket is
    /// non-empty, then returns one candidate per non-empty bucket.
    ///
    /// Inadmissible marks set by a `Requeue` call are honored by exactly
    /// one `Heads` call — the one that immediately follows it — and are
    /// cleared the moment this call has a non-empty result to return, so
    /// the marked workload gets a fresh look on the pass after that
    /// (spec.md §9 Open Question, resolved in SPEC_FULL.md §4.3).
    pub async fn heads<C>(&self, cancel: C) -> Vec<Candidate<W>>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        loop {
            {
                let mut state = self.lock();
                let candidates = Self::collect_heads(&state);
                if !candidates.is_empty() {
                    for bucket in state.buckets.values_mut() {
                        for entry in bucket.values_mut() {
                            entry.inadmissible_this_pass = false;
                        }
                    }
                    return candidates;
                }
            }
            tokio::select! {
                () = self.notify.notified() => continue,
                () = &mut cancel => return Vec::new(),
            }
        }
    }

    fn collect_heads(state: &State<W>) -> Vec<Candidate<W>> {
        state
            .buckets
            .iter()
            .filter_map(|(cluster_queue, bucket)| {
                let strategy = state.cluster_queues.get(cluster_queue).copied().unwrap_or_default();
                let entry = match strategy {
                    QueueingStrategy::StrictFifo => bucket.values().next(),
                    QueueingStrategy::BestEffortFifo => {
                        bucket.values().find(|e| !e.inadmissible_this_pass)
                    }
                }?;
                Some(Candidate {
                    key: entry.key.clone(),
                    cluster_queue: cluster_queue.clone(),
                    workload: Arc::clone(&entry.workload),
                })
            })
            .collect()
    }

    /// `Dump()` (spec §4.3): pending workload keys per cluster queue, for
    /// tests and debugging only.
    pub fn dump(&self) -> BTreeMap<ClusterQueueName, BTreeSet<String>> {
        let state = self.lock();
        state
            .buckets
            .iter()
            .map(|(cq, bucket)| (cq.clone(), bucket.values().map(|e| e.key.clone()).collect()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<W>> {
        self.state.lock().expect("queue manager lock poisoned")
    }
}
