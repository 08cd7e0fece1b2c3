pub mod bucketing;
pub mod entities;
pub mod memory;
pub mod models;
pub mod services;
pub mod store;

use thiserror::Error;

pub use bucketing::{BucketRow, BucketUnit, MetricColumn, TimeBucketing};
pub use memory::MemoryRecordStore;
pub use services::record_service::DbRecordStore;
pub use store::RecordStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Service not found: {0}")]
    NotFound(i32),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
