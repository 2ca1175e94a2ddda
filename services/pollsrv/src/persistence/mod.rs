//! Reading and schedule-state persistence

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::MemoryPersistence;
pub use self::redis::RedisPersistence;
pub use traits::PersistenceProvider;
