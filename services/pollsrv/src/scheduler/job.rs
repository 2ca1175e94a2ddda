//! Poll job timing
//!
//! A job waits for its first fire (catching up to its original cadence after
//! a restart), reads once, then repeats on a fixed period until stopped.
//!
//! State machine: `Idle -> Scheduled -> Running -> Stopped`. A job without a
//! first fire time skips `Scheduled`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::scheduler::SchedulerInner;
use crate::error::{PollSrvError, Result};
use crate::model::RegisterKind;

fn default_repeat() -> bool {
    true
}

/// Definition of one polling job
///
/// This is also the persisted schedule record, so field names match the
/// stored schedule documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollJobConfig {
    pub sensor_address: u8,
    #[serde(rename = "readType")]
    pub register_kind: RegisterKind,
    pub start_location: u16,
    #[serde(rename = "readLength")]
    pub length: u16,
    /// Repeat period; unset means the job reads once when it fires
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Stored with the schedule; the interval alone decides repetition
    #[serde(default = "default_repeat")]
    pub repeat: bool,
    /// Cadence origin; unset means fire immediately on start
    #[serde(default)]
    pub first_time: Option<DateTime<Utc>>,
    /// Hand each reading to the persistence provider
    #[serde(default, rename = "store")]
    pub persist: bool,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Assigned by the scheduler when the job is added
    #[serde(default, rename = "timer_id")]
    pub id: u64,
}

impl PollJobConfig {
    /// Job reading `length` registers every `interval`, starting now
    pub fn new(
        sensor_address: u8,
        register_kind: RegisterKind,
        start_location: u16,
        length: u16,
        interval: Duration,
    ) -> Self {
        Self {
            sensor_address,
            register_kind,
            start_location,
            length,
            interval: Some(interval),
            repeat: true,
            first_time: None,
            persist: false,
            last_run: None,
            id: 0,
        }
    }

    pub fn with_first_time(mut self, first_time: DateTime<Utc>) -> Self {
        self.first_time = Some(first_time);
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            return Err(PollSrvError::InvalidTimer {
                reason: format!(
                    "sensor {} {} at {}: read length must be at least 1",
                    self.sensor_address, self.register_kind, self.start_location
                ),
            });
        }
        if u32::from(self.start_location) + u32::from(self.length) > 0x1_0000 {
            return Err(PollSrvError::InvalidTimer {
                reason: format!(
                    "sensor {} {} window [{}; {}] exceeds the register address space",
                    self.sensor_address, self.register_kind, self.start_location, self.length
                ),
            });
        }
        if self.interval.is_some_and(|i| i.is_zero()) {
            return Err(PollSrvError::InvalidTimer {
                reason: format!(
                    "sensor {} {} at {}: interval must be greater than zero",
                    self.sensor_address, self.register_kind, self.start_location
                ),
            });
        }
        Ok(())
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    /// Waiting for the first fire instant
    Scheduled,
    Running,
    Stopped,
}

/// Point-in-time view of a registered job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollJobInfo {
    #[serde(flatten)]
    pub config: PollJobConfig,
    pub state: JobState,
}

impl PollJobInfo {
    pub fn id(&self) -> u64 {
        self.config.id
    }
}

/// Next fire instant for a job anchored at `base`
///
/// Returns `base` when it is still in the future. Otherwise advances `base`
/// by whole intervals to the first instant strictly after `now`, in constant
/// time however far behind the job is. Without an interval there is nothing
/// to advance by and the job fires at `now`.
pub fn next_fire(
    base: DateTime<Utc>,
    interval: Option<Duration>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if base > now {
        return base;
    }
    let Some(interval) = interval.filter(|i| !i.is_zero()) else {
        return now;
    };

    let elapsed = (now - base).to_std().unwrap_or_default();
    let steps = elapsed.as_nanos() / interval.as_nanos() + 1;
    let advance = u64::try_from(steps * interval.as_nanos())
        .ok()
        .and_then(|ns| ChronoDuration::from_std(Duration::from_nanos(ns)).ok())
        .and_then(|d| base.checked_add_signed(d));

    match advance {
        Some(at) => at,
        None => {
            now + ChronoDuration::from_std(interval).unwrap_or_else(|_| ChronoDuration::zero())
        },
    }
}

/// A registered job and its runtime handles
#[derive(Debug)]
pub struct PollJob {
    config: PollJobConfig,
    // Written by the job's own task after each read, read by snapshots
    last_run: Mutex<Option<DateTime<Utc>>>,
    state: Mutex<JobState>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollJob {
    pub(crate) fn new(id: u64, mut config: PollJobConfig) -> Self {
        config.id = id;
        let last_run = config.last_run;
        Self {
            config,
            last_run: Mutex::new(last_run),
            state: Mutex::new(JobState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.config.id
    }

    pub fn config(&self) -> &PollJobConfig {
        &self.config
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run.lock()
    }

    pub(crate) fn set_last_run(&self, at: DateTime<Utc>) {
        *self.last_run.lock() = Some(at);
    }

    fn set_state(&self, state: JobState) {
        *self.state.lock() = state;
    }

    /// Move to `next` unless the job was stopped meanwhile
    fn enter(&self, next: JobState) -> bool {
        let mut state = self.state.lock();
        if *state == JobState::Stopped {
            return false;
        }
        *state = next;
        true
    }

    /// Snapshot with the live `last_run`
    pub fn info(&self) -> PollJobInfo {
        let mut config = self.config.clone();
        config.last_run = self.last_run();
        PollJobInfo {
            config,
            state: self.state(),
        }
    }

    /// Launch the job's task; no-op while it is already scheduled or running
    pub(crate) fn start(self: &Arc<Self>, scheduler: Arc<SchedulerInner>) {
        {
            let mut state = self.state.lock();
            if matches!(*state, JobState::Scheduled | JobState::Running) {
                return;
            }
            // A restart after stop needs a fresh token
            *state = JobState::Idle;
        }
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();

        let job = Arc::clone(self);
        let handle = tokio::spawn(async move { job.run(scheduler, token).await });
        *self.task.lock() = Some(handle);
    }

    /// Cancel the pending wake and ticker
    ///
    /// A read already in flight is left to finish. Idempotent.
    pub(crate) fn stop(&self) {
        self.cancel.lock().cancel();
        self.set_state(JobState::Stopped);
        // The task ends on its own once cancelled
        self.task.lock().take();
    }

    async fn run(self: Arc<Self>, scheduler: Arc<SchedulerInner>, token: CancellationToken) {
        let timer_id = self.id();

        if let Some(first_time) = self.config.first_time {
            let last_run = self.last_run();
            if self.config.interval.is_none() && last_run.is_some() {
                debug!(timer_id, "One-shot timer already fired, nothing to schedule");
                return;
            }

            let now = scheduler.clock.now();
            let fire_at = next_fire(last_run.unwrap_or(first_time), self.config.interval, now);
            let delay = (fire_at - now).to_std().unwrap_or_default();
            if !self.enter(JobState::Scheduled) {
                return;
            }
            debug!(timer_id, %fire_at, "Timer scheduled, first fire in {:?}", delay);

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {},
            }
        }

        if token.is_cancelled() || !self.enter(JobState::Running) {
            return;
        }
        self.poll_once(&scheduler).await;

        let Some(interval) = self.config.interval else {
            return;
        };

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {},
            }
            self.poll_once(&scheduler).await;
        }
        info!(timer_id, "Timer stopped");
    }

    async fn poll_once(&self, scheduler: &SchedulerInner) {
        let c = &self.config;
        // Failures are logged by the read path; the next tick still fires
        if let Err(e) = scheduler
            .read_for_job(
                c.sensor_address,
                c.register_kind,
                c.start_location,
                c.length,
                c.persist,
                Some(self),
            )
            .await
        {
            debug!(timer_id = self.id(), "Tick failed: {}", e);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_next_fire_future_base_unchanged() {
        let base = at(12, 0, 0);
        let now = at(11, 0, 0);
        assert_eq!(next_fire(base, Some(Duration::from_secs(60)), now), base);
    }

    #[test]
    fn test_next_fire_catches_up_to_cadence() {
        let base = at(12, 0, 0);
        let now = at(12, 5, 30);
        let fire = next_fire(base, Some(Duration::from_secs(60)), now);
        assert_eq!(fire, at(12, 6, 0));
    }

    #[test]
    fn test_next_fire_on_boundary_is_strictly_after_now() {
        let base = at(12, 0, 0);
        let now = at(12, 5, 0);
        let fire = next_fire(base, Some(Duration::from_secs(60)), now);
        assert_eq!(fire, at(12, 6, 0));
        assert_eq!(next_fire(now, Some(Duration::from_secs(60)), now), at(12, 6, 0));
    }

    #[test]
    fn test_next_fire_converges_after_many_missed_intervals() {
        let interval = Duration::from_secs(10);
        let now = at(12, 0, 0);
        let base = now - ChronoDuration::seconds(10 * 1000);

        let fire = next_fire(base, Some(interval), now);

        assert!(fire > now);
        assert!(fire - now <= ChronoDuration::from_std(interval).unwrap());
        // Still on the original cadence
        assert_eq!((fire - base).num_seconds() % 10, 0);
    }

    #[test]
    fn test_next_fire_without_interval_fires_now() {
        let now = at(12, 0, 0);
        assert_eq!(next_fire(at(9, 0, 0), None, now), now);
    }

    #[test]
    fn test_validate_rejects_bad_jobs() {
        let ok = PollJobConfig::new(1, RegisterKind::Holding, 0, 4, Duration::from_secs(1));
        assert!(ok.validate().is_ok());

        let zero_len = PollJobConfig {
            length: 0,
            ..ok.clone()
        };
        assert!(matches!(
            zero_len.validate(),
            Err(PollSrvError::InvalidTimer { .. })
        ));

        let zero_interval = PollJobConfig {
            interval: Some(Duration::ZERO),
            ..ok.clone()
        };
        assert!(zero_interval.validate().is_err());

        let overflow = PollJobConfig {
            start_location: u16::MAX,
            length: 2,
            ..ok
        };
        assert!(overflow.validate().is_err());
    }

    #[test]
    fn test_config_json_field_names() {
        let config = PollJobConfig::new(3, RegisterKind::InputDiscrete, 16, 8, Duration::from_secs(30))
            .with_first_time(at(0, 0, 0))
            .with_persist(true);
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["sensorAddress"], 3);
        assert_eq!(json["readType"], "inputDiscrete");
        assert_eq!(json["startLocation"], 16);
        assert_eq!(json["readLength"], 8);
        assert_eq!(json["interval"], "30s");
        assert_eq!(json["repeat"], true);
        assert_eq!(json["store"], true);
        assert_eq!(json["timer_id"], 0);
        assert!(json["lastRun"].is_null());

        let back: PollJobConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_repeat_defaults_to_true() {
        let config: PollJobConfig = serde_json::from_str(
            r#"{"sensorAddress":1,"readType":"holding","startLocation":0,"readLength":2,"interval":"1m"}"#,
        )
        .unwrap();
        assert!(config.repeat);
        assert!(!config.persist);
        assert_eq!(config.interval, Some(Duration::from_secs(60)));
    }
}
