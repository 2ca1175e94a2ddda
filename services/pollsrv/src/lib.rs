//! Scheduled register polling service
//!
//! Polls field sensors over one shared serial bus, decodes register words
//! into typed values and persists readings on a schedule.
//!
//! - [`codec`]: wire bytes to register words and bits
//! - [`calc`]: read-group values (uint32, int32, float32)
//! - [`transport`]: the read transaction contract and its implementations
//! - [`scheduler`]: the polling scheduler, its jobs and the transport slot
//! - [`persistence`], [`sensor_store`]: collaborators the scheduler consumes

pub mod bootstrap;
pub mod calc;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod persistence;
pub mod scheduler;
pub mod sensor_store;
pub mod transport;

pub use error::{PollSrvError, Result};
pub use model::{CalculatedValue, ReadGroupSpec, Reading, Register, RegisterKind, ResultKind, Sensor};
pub use scheduler::{JobState, PollJobConfig, PollJobInfo, PollingScheduler};
