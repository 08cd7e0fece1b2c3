//! Database-backed implementations of the storage traits.
//!
//! Each sub-module owns the SQL for one storage concern; the rest of the
//! crate talks to them through [`crate::db::RecordStore`].

pub mod record_service;

pub use record_service::*;
