//! In-process record store.
//!
//! Mirrors the SQL store's semantics, including epoch-aligned bucketing in
//! UTC, so the statistics engine behaves identically against either.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::StoreError;
use super::bucketing::{BucketRow, BucketUnit, MetricColumn, TIMEFRAME_FORMAT};
use super::models::{Failure, Hit, NewFailure, NewHit, Service};
use super::store::RecordStore;

#[derive(Default, Debug)]
struct MemoryState {
    services: HashMap<i32, Service>,
    hits: Vec<Hit>,
    failures: Vec<Failure>,
    next_service_id: i32,
    next_record_id: i32,
}

impl MemoryState {
    fn next_record_id(&mut self) -> i32 {
        self.next_record_id += 1;
        self.next_record_id
    }
}

#[derive(Default, Debug)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(mut records: Vec<T>, key: impl Fn(&T) -> (DateTime<Utc>, i32)) -> Vec<T> {
    records.sort_by(|a, b| key(b).cmp(&key(a)));
    records
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_service(&self, service: &Service) -> Result<i32, StoreError> {
        let mut state = self.state.lock().await;
        state.next_service_id += 1;
        let id = state.next_service_id;
        let mut stored = service.clone();
        stored.id = id;
        state.services.insert(id, stored);
        Ok(id)
    }

    async fn update_service(&self, service: &Service) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.services.get_mut(&service.id) {
            Some(existing) => {
                *existing = service.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(service.id)),
        }
    }

    async fn delete_service(&self, service_id: i32) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.services.remove(&service_id).is_none() {
            return Err(StoreError::NotFound(service_id));
        }
        state.hits.retain(|h| h.service_id != service_id);
        state.failures.retain(|f| f.service_id != service_id);
        Ok(())
    }

    async fn all_services(&self) -> Result<Vec<Service>, StoreError> {
        let state = self.state.lock().await;
        let mut services: Vec<Service> = state.services.values().cloned().collect();
        services.sort_by(|a, b| b.order_id.cmp(&a.order_id).then(a.id.cmp(&b.id)));
        Ok(services)
    }

    async fn insert_hit(&self, hit: NewHit) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let id = state.next_record_id();
        state.hits.push(Hit {
            id,
            service_id: hit.service_id,
            latency: hit.latency,
            created_at: hit.created_at,
        });
        Ok(())
    }

    async fn insert_failure(&self, failure: NewFailure) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let id = state.next_record_id();
        state.failures.push(Failure {
            id,
            service_id: failure.service_id,
            issue: failure.issue,
            created_at: failure.created_at,
        });
        Ok(())
    }

    async fn count_hits(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .hits
            .iter()
            .filter(|h| h.service_id == service_id)
            .filter(|h| since.is_none_or(|since| h.created_at >= since))
            .count() as u64)
    }

    async fn count_failures(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .failures
            .iter()
            .filter(|f| f.service_id == service_id)
            .filter(|f| since.is_none_or(|since| f.created_at >= since))
            .count() as u64)
    }

    async fn sum_latency(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<f64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .hits
            .iter()
            .filter(|h| h.service_id == service_id)
            .filter(|h| since.is_none_or(|since| h.created_at >= since))
            .map(|h| h.latency)
            .sum())
    }

    async fn recent_hits(
        &self,
        service_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<Hit>, StoreError> {
        let state = self.state.lock().await;
        let hits: Vec<Hit> = state
            .hits
            .iter()
            .filter(|h| h.service_id == service_id)
            .cloned()
            .collect();
        let mut hits = newest_first(hits, |h| (h.created_at, h.id));
        if let Some(limit) = limit {
            hits.truncate(limit as usize);
        }
        Ok(hits)
    }

    async fn recent_failures(
        &self,
        service_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<Failure>, StoreError> {
        let state = self.state.lock().await;
        let failures: Vec<Failure> = state
            .failures
            .iter()
            .filter(|f| f.service_id == service_id)
            .cloned()
            .collect();
        let mut failures = newest_first(failures, |f| (f.created_at, f.id));
        if let Some(limit) = limit {
            failures.truncate(limit as usize);
        }
        Ok(failures)
    }

    async fn hits_between(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Hit>, StoreError> {
        let state = self.state.lock().await;
        let mut hits: Vec<Hit> = state
            .hits
            .iter()
            .filter(|h| h.service_id == service_id && h.created_at >= start && h.created_at < end)
            .cloned()
            .collect();
        hits.sort_by_key(|h| (h.created_at, h.id));
        Ok(hits)
    }

    async fn bucketed_average(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: BucketUnit,
        column: MetricColumn,
    ) -> Result<Vec<BucketRow>, StoreError> {
        let width = unit.width_seconds();
        let state = self.state.lock().await;

        // bucket start (epoch seconds) -> (sum, count)
        let mut buckets: BTreeMap<i64, (f64, u64)> = BTreeMap::new();
        for hit in state
            .hits
            .iter()
            .filter(|h| h.service_id == service_id && h.created_at >= start && h.created_at < end)
        {
            let value = match column {
                MetricColumn::Latency => hit.latency,
            };
            let bucket = hit.created_at.timestamp().div_euclid(width) * width;
            let entry = buckets.entry(bucket).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        Ok(buckets
            .into_iter()
            .filter_map(|(bucket, (sum, count))| {
                let bucket_start = DateTime::<Utc>::from_timestamp(bucket, 0)?;
                Some(BucketRow {
                    timeframe: bucket_start.format(TIMEFRAME_FORMAT).to_string(),
                    value: Some(sum / count as f64),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ProbeKind;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_ids_are_assigned_and_services_sorted_by_order() {
        let store = MemoryRecordStore::new();
        let low = Service::new("low", ProbeKind::Tcp, "db:5432").with_order(1);
        let high = Service::new("high", ProbeKind::Http, "https://a").with_order(5);
        let low_id = store.insert_service(&low).await.unwrap();
        let high_id = store.insert_service(&high).await.unwrap();
        assert_ne!(low_id, high_id);

        let ids: Vec<i32> = store
            .all_services()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![high_id, low_id]);
    }

    #[tokio::test]
    async fn test_recent_records_are_newest_first_and_limited() {
        let store = MemoryRecordStore::new();
        for minute in [5, 1, 9, 3] {
            store
                .insert_failure(NewFailure {
                    service_id: 1,
                    issue: format!("timeout at {minute}"),
                    created_at: at(8, minute),
                })
                .await
                .unwrap();
        }

        let recent = store.recent_failures(1, Some(3)).await.unwrap();
        let minutes: Vec<DateTime<Utc>> = recent.iter().map(|f| f.created_at).collect();
        assert_eq!(minutes, vec![at(8, 9), at(8, 5), at(8, 3)]);
    }

    #[tokio::test]
    async fn test_minute_buckets_average_latency() {
        let store = MemoryRecordStore::new();
        for (second, latency) in [(0, 0.1), (30, 0.3)] {
            store
                .insert_hit(NewHit {
                    service_id: 7,
                    latency,
                    created_at: at(10, 0) + chrono::Duration::seconds(second),
                })
                .await
                .unwrap();
        }
        store
            .insert_hit(NewHit {
                service_id: 7,
                latency: 1.0,
                created_at: at(10, 2),
            })
            .await
            .unwrap();

        let rows = store
            .bucketed_average(7, at(0, 0), at(23, 0), BucketUnit::Second, MetricColumn::Latency)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timeframe, "2024-03-01 10:00:00");
        assert!((rows[0].value.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(rows[1].timeframe, "2024-03-01 10:02:00");
    }

    #[tokio::test]
    async fn test_end_of_range_is_exclusive() {
        let store = MemoryRecordStore::new();
        store
            .insert_hit(NewHit {
                service_id: 2,
                latency: 0.5,
                created_at: at(12, 0),
            })
            .await
            .unwrap();
        let rows = store
            .bucketed_average(2, at(11, 0), at(12, 0), BucketUnit::Hour, MetricColumn::Latency)
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert!(store.hits_between(2, at(11, 0), at(12, 0)).await.unwrap().is_empty());
    }
}
