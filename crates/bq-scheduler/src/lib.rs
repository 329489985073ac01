//! The admission scheduling loop: snapshot, flavor assignment, ordering,
//! cross-cohort conflict resolution, commit (spec §4.4).

pub mod commit_pool;
pub mod config;
pub mod error;
pub mod pass;
pub mod scheduler;

pub use commit_pool::CommitPool;
pub use config::SchedulerConfig;
pub use error::ScheduleError;
pub use scheduler::Scheduler;
