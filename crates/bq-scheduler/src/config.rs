use std::time::Duration;

/// Recognized configuration (spec §6): `manager-name` identifies the
/// process in event records, `worker_count` bounds concurrent commit
/// tasks, `queue_scan_period` bounds the delay between wake-ups when no
/// events arrive.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct SchedulerConfig {
    pub manager_name: String,
    pub worker_count: usize,
    pub queue_scan_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            manager_name: "bq-scheduler".to_string(),
            worker_count: 8,
            queue_scan_period: Duration::from_secs(30),
        }
    }
}
