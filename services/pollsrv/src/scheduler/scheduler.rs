//! Polling scheduler
//!
//! Owns the single transport, the job registry and the read path every job
//! funnels through. Registry changes (add/remove/start/stop/load) are expected
//! from one controlling context; job tasks only touch their own `last_run`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use common::time::{SystemTimeProvider, TimeProvider};

use super::job::{PollJob, PollJobConfig, PollJobInfo};
use super::slot::TransportSlot;
use crate::calc::apply_read_groups;
use crate::error::{PersistenceError, PollSrvError, Result, TransportError};
use crate::model::{Reading, RegisterKind};
use crate::persistence::PersistenceProvider;
use crate::sensor_store::SensorStore;
use crate::transport::{ReadRequest, Transport};

/// Item key the job list is saved under
pub const SCHEDULE_KEY: &str = "scheduleProvider";

/// Saved schedule document
#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleState {
    timers: Vec<PollJobConfig>,
}

pub(crate) struct SchedulerInner {
    slot: Option<TransportSlot>,
    persistence: Option<Arc<dyn PersistenceProvider>>,
    sensor_store: Option<Arc<dyn SensorStore>>,
    pub(crate) clock: Arc<dyn TimeProvider>,
    jobs: RwLock<Vec<Arc<PollJob>>>,
    started: AtomicBool,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SchedulerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerInner")
            .field("transport", &self.slot.as_ref().map(|s| s.name()))
            .field("persistence", &self.persistence.is_some())
            .field("sensor_store", &self.sensor_store.is_some())
            .field("jobs", &self.jobs.read().len())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl SchedulerInner {
    /// The read path: exclusive transport access, calculation, persistence
    pub(crate) async fn read_for_job(
        &self,
        sensor: u8,
        kind: RegisterKind,
        start: u16,
        length: u16,
        persist: bool,
        job: Option<&PollJob>,
    ) -> Result<Reading> {
        let slot = self.slot.as_ref().ok_or(PollSrvError::NoTransport)?;
        let persistence = if persist {
            Some(
                self.persistence
                    .as_ref()
                    .ok_or(PollSrvError::NoPersistenceProvider)?,
            )
        } else {
            None
        };

        let request = ReadRequest::new(sensor, kind, start, length);
        let result = {
            let mut transport = slot.acquire().await;
            debug!(sensor, %kind, start, length, "Reading from {}", slot.name());
            transport.read(request).await
        }
        .and_then(|values| {
            if values.len() == usize::from(length) {
                Ok(values)
            } else {
                Err(TransportError::InvalidFrame(format!(
                    "expected {} values, got {}",
                    length,
                    values.len()
                )))
            }
        });

        let now = self.clock.now();
        if let Some(job) = job {
            job.set_last_run(now);
        }

        let values = result.map_err(|source| {
            error!(
                sensor,
                %kind,
                start,
                length,
                timer_id = job.map(|j| j.id()),
                "Read failed: {}",
                source
            );
            PollSrvError::ReadFailed {
                sensor,
                kind,
                start,
                length,
                source,
            }
        })?;

        let mut reading = Reading::new(sensor, kind, start, values, now);
        self.calculate(&mut reading);

        if let Some(persistence) = persistence {
            persistence
                .save_sensor_reading(&reading)
                .await
                .map_err(|e| {
                    error!(sensor, %kind, start, length, "Failed to store reading: {}", e);
                    PollSrvError::from(e)
                })?;
        }

        Ok(reading)
    }

    /// Apply the sensor's read groups; an unknown sensor has none
    ///
    /// Group failures are logged by `apply_read_groups` and leave the reading
    /// usable.
    fn calculate(&self, reading: &mut Reading) {
        let Some(sensor) = self
            .sensor_store
            .as_ref()
            .and_then(|store| store.get_sensor_by_address(reading.sensor()))
        else {
            return;
        };
        apply_read_groups(reading, &sensor.read_groups);
    }

    fn check_addable(&self, config: &PollJobConfig) -> Result<()> {
        if self.slot.is_none() {
            return Err(PollSrvError::NoTransport);
        }
        if config.persist && self.persistence.is_none() {
            return Err(PollSrvError::NoPersistenceProvider);
        }
        config.validate()
    }
}

/// Builder for [`PollingScheduler`]
#[derive(Default)]
pub struct PollingSchedulerBuilder {
    transport: Option<Box<dyn Transport>>,
    persistence: Option<Arc<dyn PersistenceProvider>>,
    sensor_store: Option<Arc<dyn SensorStore>>,
    clock: Option<Arc<dyn TimeProvider>>,
}

impl PollingSchedulerBuilder {
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn boxed_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn PersistenceProvider>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn sensor_store(mut self, store: Arc<dyn SensorStore>) -> Self {
        self.sensor_store = Some(store);
        self
    }

    /// Wall clock for reading timestamps and catch-up; system time by default
    pub fn clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> PollingScheduler {
        PollingScheduler {
            inner: Arc::new(SchedulerInner {
                slot: self.transport.map(TransportSlot::new),
                persistence: self.persistence,
                sensor_store: self.sensor_store,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemTimeProvider)),
                jobs: RwLock::new(Vec::new()),
                started: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

/// Scheduler for register polling jobs sharing one transport
#[derive(Debug, Clone)]
pub struct PollingScheduler {
    inner: Arc<SchedulerInner>,
}

impl PollingScheduler {
    pub fn builder() -> PollingSchedulerBuilder {
        PollingSchedulerBuilder::default()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Snapshots of every registered job, in registration order
    pub fn timers(&self) -> Vec<PollJobInfo> {
        self.inner.jobs.read().iter().map(|j| j.info()).collect()
    }

    /// Register a job and assign its id
    ///
    /// Starts the job right away when the scheduler is running.
    pub fn add_timer(&self, config: PollJobConfig) -> Result<PollJobInfo> {
        self.inner.check_addable(&config)?;
        Ok(self.register(config))
    }

    fn register(&self, config: PollJobConfig) -> PollJobInfo {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let job = Arc::new(PollJob::new(id, config));
        self.inner.jobs.write().push(Arc::clone(&job));

        let c = job.config();
        info!(
            timer_id = id,
            sensor = c.sensor_address,
            kind = %c.register_kind,
            start = c.start_location,
            length = c.length,
            "Timer added"
        );
        if self.is_started() {
            job.start(Arc::clone(&self.inner));
        }
        job.info()
    }

    /// Stop and unregister a job
    pub fn remove_timer(&self, id: u64) -> Result<PollJobInfo> {
        let job = {
            let mut jobs = self.inner.jobs.write();
            let index = jobs
                .iter()
                .position(|j| j.id() == id)
                .ok_or(PollSrvError::TimerNotFound(id))?;
            jobs.remove(index)
        };
        job.stop();
        info!(timer_id = id, "Timer removed");
        Ok(job.info())
    }

    /// Launch every registered job
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already started");
            return;
        }
        let jobs = self.inner.jobs.read().clone();
        for job in &jobs {
            job.start(Arc::clone(&self.inner));
        }
        info!("Scheduler started with {} timers", jobs.len());
    }

    /// Cancel every job's pending wake and ticker
    ///
    /// Reads already in flight finish normally.
    pub fn stop(&self) {
        let jobs = self.inner.jobs.read().clone();
        for job in &jobs {
            job.stop();
        }
        self.inner.started.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
    }

    /// One-off read through the shared transport
    ///
    /// Works whether or not the scheduler is started.
    pub async fn read(
        &self,
        sensor: u8,
        kind: RegisterKind,
        start: u16,
        length: u16,
        persist: bool,
    ) -> Result<Reading> {
        self.inner
            .read_for_job(sensor, kind, start, length, persist, None)
            .await
    }

    /// Save every job, including its last run, under [`SCHEDULE_KEY`]
    pub async fn save(&self) -> Result<usize> {
        let persistence = self
            .inner
            .persistence
            .as_ref()
            .ok_or(PollSrvError::NoPersistenceProvider)?;

        let state = ScheduleState {
            timers: self.timers().into_iter().map(|info| info.config).collect(),
        };
        let count = state.timers.len();
        let value = serde_json::to_value(&state)?;
        persistence.save_item(SCHEDULE_KEY, &value).await?;

        info!("Saved {} timers", count);
        Ok(count)
    }

    /// Restore saved jobs through the normal add path
    ///
    /// The whole saved list is validated first; on any error nothing is added.
    pub async fn load(&self) -> Result<usize> {
        let persistence = self
            .inner
            .persistence
            .as_ref()
            .ok_or(PollSrvError::NoPersistenceProvider)?;

        let value = persistence
            .read_item(SCHEDULE_KEY)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(SCHEDULE_KEY.to_string()))?;
        let state: ScheduleState = serde_json::from_value(value)?;

        for config in &state.timers {
            self.inner.check_addable(config)?;
        }

        let count = state.timers.len();
        for config in state.timers {
            self.register(config);
        }
        info!("Loaded {} timers", count);
        Ok(count)
    }
}
