//! Polling scheduler and its jobs

pub mod job;
#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod slot;

pub use job::{next_fire, JobState, PollJob, PollJobConfig, PollJobInfo};
pub use scheduler::{PollingScheduler, PollingSchedulerBuilder, SCHEDULE_KEY};
pub use slot::TransportSlot;
