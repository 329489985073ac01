//! The scheduling service: `Start(ctx)`/`Stop()` around the repeating
//! schedule cycle (spec §4.4, §9).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bq_cache::ClusterQueueCache;
use bq_queue::{Candidate, QueueManager, Queueable};
use bq_store::WorkloadStore;
use tokio::sync::Notify;

use crate::{
    commit_pool::CommitPool,
    config::SchedulerConfig,
    pass::{assign_flavors, order_entries, resolve_conflicts, to_admission},
};

/// The process-wide scheduling loop (spec §9: "explicit `Start(ctx)` /
/// `Stop()`, not an implicit singleton").
pub struct Scheduler<W> {
    cache: ClusterQueueCache,
    queue: QueueManager<W>,
    store: Arc<dyn WorkloadStore>,
    config: SchedulerConfig,
    stop_flag: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    commits: CommitPool,
}

impl<W: Queueable + Send + Sync + 'static> Scheduler<W> {
    pub fn new(
        cache: ClusterQueueCache,
        queue: QueueManager<W>,
        store: Arc<dyn WorkloadStore>,
        config: SchedulerConfig,
    ) -> Self {
        let commits = CommitPool::new(config.worker_count);
        Self {
            cache,
            queue,
            store,
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            commits,
        }
    }

    /// Runs schedule cycles until [`Scheduler::stop`] is called. Stage 6
    /// ("Park") is folded into `Heads`'s own blocking wait — a cycle simply
    /// starts again once `Heads` wakes.
    #[tracing::instrument(skip(self), fields(manager = %self.config.manager_name))]
    pub async fn run(&mut self) {
        while !self.stop_flag.load(Ordering::Acquire) {
            let stop_notify = Arc::clone(&self.stop_notify);
            let wait = self.queue.heads(async move { stop_notify.notified().await });
            // `queue_scan_period` bounds how long a pass can go without
            // waking even if nothing notifies the queue manager directly
            // (e.g. a cluster-queue ceiling raised without a workload event).
            let heads = match tokio::time::timeout(self.config.queue_scan_period, wait).await {
                Ok(heads) => heads,
                Err(_elapsed) => continue,
            };
            if heads.is_empty() {
                continue;
            }
            self.run_cycle(heads).await;
        }
        self.commits.drain().await;
    }

    /// Signals [`Scheduler::run`] to return after its current cycle. Does
    /// not cancel commits already in flight; `run` drains them before
    /// returning.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    #[tracing::instrument(skip(self, heads), fields(pass_size = heads.len()))]
    async fn run_cycle(&mut self, heads: Vec<Candidate<W>>) {
        let snapshot = self.cache.snapshot();

        let (fitting, no_fit) = assign_flavors(&snapshot, heads);
        for (key, reason) in &no_fit {
            tracing::debug!(workload = %key, reason = reason.reason(), "no fit this pass");
            self.queue.requeue(key, reason.reason());
        }

        let ordered = order_entries(fitting);
        let (admitted, conflicted) = resolve_conflicts(&snapshot, ordered);
        for (key, reason) in &conflicted {
            tracing::debug!(workload = %key, reason = reason.reason(), "conflict this pass");
            self.queue.requeue(key, reason.reason());
        }

        for entry in admitted {
            let store = Arc::clone(&self.store);
            let queue = self.queue.clone();
            let cache = self.cache.clone();
            let key = entry.key.clone();
            let cluster_queue = entry.cluster_queue.clone();
            let admission = to_admission(&entry);
            let pod_sets: Vec<_> = entry.workload.pod_sets().to_vec();
            let (namespace, name) = split_key(&key);

            self.commits.spawn(async move {
                match store.commit(&namespace, &name, admission.clone()).await {
                    Ok(()) => {
                        if let Err(source) = cache.add_or_update_workload(&key, &admission, &pod_sets) {
                            let err = crate::error::ScheduleError::Cache { source };
                            if err.is_invariant_violation() {
                                crate::error::abort_on_invariant_violation(&err);
                            }
                            tracing::warn!(workload = %key, error = %err, "cache update after commit failed");
                        }
                        queue.remove(&key);
                        tracing::info!(workload = %key, cluster_queue = %cluster_queue, "admitted");
                    }
                    Err(err) => {
                        tracing::warn!(workload = %key, error = %err, "commit failed, requeuing");
                        queue.requeue(&key, &err.to_string());
                    }
                }
            });
        }
    }
}

fn split_key(key: &str) -> (String, String) {
    key.split_once('/')
        .map(|(ns, name)| (ns.to_owned(), name.to_owned()))
        .unwrap_or_else(|| (String::new(), key.to_owned()))
}
