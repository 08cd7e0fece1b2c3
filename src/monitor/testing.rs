//! Test doubles shared by the monitor tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::db::bucketing::{BucketRow, BucketUnit, MetricColumn};
use crate::db::models::{Failure, Hit, NewFailure, NewHit, Service};
use crate::db::{MemoryRecordStore, RecordStore, StoreError};
use crate::monitor::probe::{Probe, ProbeError};

/// A memory store that can be switched into failing every call, and whose
/// hit and failure appends can be slowed down.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryRecordStore,
    failing: AtomicBool,
    append_delay_ms: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_append_delay(&self, delay: Duration) {
        self.append_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn append_delay(&self) {
        let millis = self.append_delay_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert_service(&self, service: &Service) -> Result<i32, StoreError> {
        self.check()?;
        self.inner.insert_service(service).await
    }

    async fn update_service(&self, service: &Service) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update_service(service).await
    }

    async fn delete_service(&self, service_id: i32) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete_service(service_id).await
    }

    async fn all_services(&self) -> Result<Vec<Service>, StoreError> {
        self.check()?;
        self.inner.all_services().await
    }

    async fn insert_hit(&self, hit: NewHit) -> Result<(), StoreError> {
        self.append_delay().await;
        self.check()?;
        self.inner.insert_hit(hit).await
    }

    async fn insert_failure(&self, failure: NewFailure) -> Result<(), StoreError> {
        self.append_delay().await;
        self.check()?;
        self.inner.insert_failure(failure).await
    }

    async fn count_hits(&self, service_id: i32, since: Option<DateTime<Utc>>) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.count_hits(service_id, since).await
    }

    async fn count_failures(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.count_failures(service_id, since).await
    }

    async fn sum_latency(&self, service_id: i32, since: Option<DateTime<Utc>>) -> Result<f64, StoreError> {
        self.check()?;
        self.inner.sum_latency(service_id, since).await
    }

    async fn recent_hits(&self, service_id: i32, limit: Option<u64>) -> Result<Vec<Hit>, StoreError> {
        self.check()?;
        self.inner.recent_hits(service_id, limit).await
    }

    async fn recent_failures(
        &self,
        service_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<Failure>, StoreError> {
        self.check()?;
        self.inner.recent_failures(service_id, limit).await
    }

    async fn hits_between(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Hit>, StoreError> {
        self.check()?;
        self.inner.hits_between(service_id, start, end).await
    }

    async fn bucketed_average(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: BucketUnit,
        column: MetricColumn,
    ) -> Result<Vec<BucketRow>, StoreError> {
        self.check()?;
        self.inner
            .bucketed_average(service_id, start, end, unit, column)
            .await
    }
}

/// Probe answering after `delay` with a fixed latency, or with a timeout
/// error while `failing` is set. Remembers which intervals it was called with.
pub struct MockProbe {
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
    seen_intervals: Mutex<Vec<i32>>,
}

impl MockProbe {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            seen_intervals: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_intervals(&self) -> Vec<i32> {
        self.seen_intervals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Probe for MockProbe {
    async fn check(&self, service: &Service) -> Result<Duration, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_intervals.lock().unwrap().push(service.check_interval);
        tokio::time::sleep(self.delay).await;
        if self.failing.load(Ordering::SeqCst) {
            Err(ProbeError::Timeout(self.delay))
        } else {
            Ok(Duration::from_millis(100))
        }
    }
}
