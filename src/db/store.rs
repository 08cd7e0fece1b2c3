use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;
use super::bucketing::{BucketRow, BucketUnit, MetricColumn};
use super::models::{Failure, Hit, NewFailure, NewHit, Service};

/// Durable storage for services and their check history.
///
/// Implementations must accept concurrent appends from many checker tasks and
/// must remove a service's hits and failures when the service is deleted.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a new service and returns the id assigned to it.
    async fn insert_service(&self, service: &Service) -> Result<i32, StoreError>;

    async fn update_service(&self, service: &Service) -> Result<(), StoreError>;

    /// Deletes the service row together with all its hits and failures.
    async fn delete_service(&self, service_id: i32) -> Result<(), StoreError>;

    /// All persisted services, highest `order_id` first.
    async fn all_services(&self) -> Result<Vec<Service>, StoreError>;

    async fn insert_hit(&self, hit: NewHit) -> Result<(), StoreError>;

    async fn insert_failure(&self, failure: NewFailure) -> Result<(), StoreError>;

    /// Number of hits, optionally only those created at or after `since`.
    async fn count_hits(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError>;

    /// Number of failures, optionally only those created at or after `since`.
    async fn count_failures(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError>;

    /// Sum of hit latencies in seconds; 0 when there are no hits.
    async fn sum_latency(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<f64, StoreError>;

    /// Most recent hits first, at most `limit` of them.
    async fn recent_hits(&self, service_id: i32, limit: Option<u64>)
    -> Result<Vec<Hit>, StoreError>;

    /// Most recent failures first, at most `limit` of them.
    async fn recent_failures(
        &self,
        service_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<Failure>, StoreError>;

    /// Hits created in `[start, end)`, oldest first.
    async fn hits_between(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Hit>, StoreError>;

    /// Average of `column` per `unit` bucket over `[start, end)`, ordered by
    /// bucket start. Empty buckets are not returned.
    async fn bucketed_average(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: BucketUnit,
        column: MetricColumn,
    ) -> Result<Vec<BucketRow>, StoreError>;
}
