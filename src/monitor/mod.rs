//! Service checking: the registry of monitored services, their periodic
//! checker tasks, the statistics derived from recorded outcomes and the
//! lifecycle operations tying them together.

pub mod lifecycle;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod status_text;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;

use crate::db::StoreError;

pub use lifecycle::ServiceManager;
pub use probe::{NetworkProbe, Probe, ProbeError};
pub use registry::ServiceRegistry;
pub use scheduler::{CheckScheduler, SchedulerError};
pub use stats::{DEFAULT_LIMITED_WINDOW, DateScan, DateScanObj, ServiceSummary, StatisticsEngine};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Service not found: {0}")]
    NotFound(i32),
}

impl MonitorError {
    /// Lifts a missing row into a lifecycle-level not-found.
    pub(crate) fn from_store(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => MonitorError::NotFound(id),
            other => MonitorError::Storage(other),
        }
    }
}
