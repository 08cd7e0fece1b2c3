//! Uptime, latency and downtime figures derived from the recorded hits and
//! failures of a service.
//!
//! Every figure is recomputed from the record store on demand. Empty windows
//! never divide by zero: they resolve to the sentinels documented on each
//! operation.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::db::bucketing::{BucketRow, BucketUnit, MetricColumn, TIMEFRAME_FORMAT};
use crate::db::models::{Failure, Hit, Service};
use crate::db::{RecordStore, StoreError};

/// Number of most recent records considered by downtime and status lines.
pub const DEFAULT_LIMITED_WINDOW: u64 = 10;

const GRAPH_DAYS: i64 = 7;

/// One point of a bucketed series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateScan {
    #[serde(rename = "x")]
    pub timestamp: String,
    #[serde(rename = "y")]
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateScanObj {
    #[serde(rename = "data")]
    pub points: Vec<DateScan>,
}

impl DateScanObj {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Everything the dashboard shows for one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub id: i32,
    pub name: String,
    pub online: bool,
    /// Milliseconds.
    pub avg_latency: f64,
    pub online_24_hours: f32,
    pub avg_uptime_24: String,
    pub total_uptime: String,
    pub downtime_seconds: i64,
    pub downtime_text: String,
    pub small_text: String,
}

/// Uptime percentage for `failures` against `hits`.
///
/// 100 without failures, 0 with failures but no hits, otherwise
/// `100 - failures / hits * 100` clamped at 0 and rounded to two decimals.
pub fn uptime_percent(failures: u64, hits: u64) -> f64 {
    if failures == 0 {
        return 100.0;
    }
    if hits == 0 {
        return 0.0;
    }
    let percent = 100.0 - (failures as f64 / hits as f64) * 100.0;
    (percent.max(0.0) * 100.0).round() / 100.0
}

/// Two-decimal rendering, except that a full 100 is shown as `"100"`.
pub fn format_percent(percent: f64) -> String {
    let text = format!("{percent:.2}");
    if text == "100.00" {
        "100".to_string()
    } else {
        text
    }
}

/// Average latency in milliseconds for latencies recorded in seconds.
pub fn average_latency_ms(sum: f64, hits: u64) -> f64 {
    if hits == 0 {
        return 0.0;
    }
    (sum / hits as f64 * 100.0 * 10.0).round()
}

fn downtime_between(failures: &[Failure], hits: &[Hit], now: DateTime<Utc>) -> Duration {
    let Some(earliest_failure) = failures.iter().map(|f| f.created_at).min() else {
        return Duration::zero();
    };
    let downtime = match hits.iter().map(|h| h.created_at).min() {
        Some(earliest_hit) => earliest_failure - earliest_hit,
        None => {
            let latest_failure = failures
                .iter()
                .map(|f| f.created_at)
                .max()
                .unwrap_or(earliest_failure);
            now - latest_failure
        }
    };
    downtime.max(Duration::zero())
}

fn logged<T>(
    service_id: i32,
    operation: &'static str,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    result.inspect_err(|e| error!(service_id, operation, error = %e, "Statistics query failed."))
}

#[derive(Clone)]
pub struct StatisticsEngine {
    store: Arc<dyn RecordStore>,
    limited_window: u64,
    timezone: FixedOffset,
}

impl StatisticsEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            limited_window: DEFAULT_LIMITED_WINDOW,
            timezone: Utc.fix(),
        }
    }

    pub fn with_limited_window(mut self, limited_window: u64) -> Self {
        self.limited_window = limited_window.max(1);
        self
    }

    /// Offset used when rendering timestamps for display.
    pub fn with_timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn limited_window(&self) -> u64 {
        self.limited_window
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub async fn total_hits(&self, service_id: i32) -> Result<u64, StoreError> {
        logged(service_id, "total_hits", self.store.count_hits(service_id, None).await)
    }

    pub async fn total_failures(&self, service_id: i32) -> Result<u64, StoreError> {
        logged(
            service_id,
            "total_failures",
            self.store.count_failures(service_id, None).await,
        )
    }

    pub async fn hits_since(&self, service_id: i32, since: DateTime<Utc>) -> Result<u64, StoreError> {
        logged(
            service_id,
            "hits_since",
            self.store.count_hits(service_id, Some(since)).await,
        )
    }

    pub async fn failures_since(
        &self,
        service_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        logged(
            service_id,
            "failures_since",
            self.store.count_failures(service_id, Some(since)).await,
        )
    }

    /// Sum of every recorded latency, in seconds.
    pub async fn sum_latency(&self, service_id: i32) -> Result<f64, StoreError> {
        logged(
            service_id,
            "sum_latency",
            self.store.sum_latency(service_id, None).await,
        )
    }

    pub async fn limited_hits(&self, service_id: i32) -> Result<Vec<Hit>, StoreError> {
        logged(
            service_id,
            "limited_hits",
            self.store
                .recent_hits(service_id, Some(self.limited_window))
                .await,
        )
    }

    pub async fn limited_failures(&self, service_id: i32) -> Result<Vec<Failure>, StoreError> {
        logged(
            service_id,
            "limited_failures",
            self.store
                .recent_failures(service_id, Some(self.limited_window))
                .await,
        )
    }

    /// Milliseconds, 0 when nothing has been recorded.
    pub async fn average_latency(&self, service_id: i32) -> Result<f64, StoreError> {
        let hits = self.total_hits(service_id).await?;
        if hits == 0 {
            return Ok(0.0);
        }
        let sum = self.sum_latency(service_id).await?;
        Ok(average_latency_ms(sum, hits))
    }

    async fn uptime_since(&self, service_id: i32, since: DateTime<Utc>) -> Result<f64, StoreError> {
        let failures = self.failures_since(service_id, since).await?;
        if failures == 0 {
            return Ok(100.0);
        }
        let hits = self.hits_since(service_id, since).await?;
        Ok(uptime_percent(failures, hits))
    }

    pub async fn online_since(&self, service_id: i32, since: DateTime<Utc>) -> Result<f32, StoreError> {
        Ok(self.uptime_since(service_id, since).await? as f32)
    }

    pub async fn online_24(&self, service_id: i32) -> Result<f32, StoreError> {
        self.online_since(service_id, Utc::now() - Duration::hours(24))
            .await
    }

    pub async fn avg_uptime(&self, service_id: i32, since: DateTime<Utc>) -> Result<String, StoreError> {
        Ok(format_percent(self.uptime_since(service_id, since).await?))
    }

    pub async fn avg_uptime_24(&self, service_id: i32) -> Result<String, StoreError> {
        self.avg_uptime(service_id, Utc::now() - Duration::hours(24))
            .await
    }

    /// Uptime over the whole history, failures divided by total hits.
    pub async fn total_uptime(&self, service_id: i32) -> Result<String, StoreError> {
        let failures = self.total_failures(service_id).await?;
        let hits = self.total_hits(service_id).await?;
        Ok(format_percent(uptime_percent(failures, hits)))
    }

    pub async fn downtime(&self, service_id: i32) -> Result<Duration, StoreError> {
        self.downtime_at(service_id, Utc::now()).await
    }

    /// Downtime as observed at `now`, looking only at the limited windows of
    /// recent hits and failures.
    pub async fn downtime_at(&self, service_id: i32, now: DateTime<Utc>) -> Result<Duration, StoreError> {
        let failures = self.limited_failures(service_id).await?;
        if failures.is_empty() {
            return Ok(Duration::zero());
        }
        let hits = self.limited_hits(service_id).await?;
        Ok(downtime_between(&failures, &hits, now))
    }

    /// Averages `column` per `unit` bucket over `[start, end)`. Bucket starts
    /// are rendered in the display timezone and averages are scaled by 1000.
    pub async fn bucketed_series(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: BucketUnit,
        column: MetricColumn,
    ) -> Result<DateScanObj, StoreError> {
        let rows = logged(
            service_id,
            "bucketed_series",
            self.store
                .bucketed_average(service_id, start, end, unit, column)
                .await,
        )?;
        let points = rows
            .into_iter()
            .filter_map(|row| self.to_date_scan(service_id, row))
            .collect();
        Ok(DateScanObj { points })
    }

    fn to_date_scan(&self, service_id: i32, row: BucketRow) -> Option<DateScan> {
        let bucket = match NaiveDateTime::parse_from_str(&row.timeframe, TIMEFRAME_FORMAT) {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!(service_id, timeframe = %row.timeframe, error = %e, "Skipping unparseable bucket.");
                return None;
            }
        };
        let local = bucket.and_utc().with_timezone(&self.timezone);
        Some(DateScan {
            timestamp: local.format(TIMEFRAME_FORMAT).to_string(),
            value: (row.value.unwrap_or(0.0) * 1000.0).round() as i64,
        })
    }

    /// Hourly latency averages for the last seven days, as JSON.
    pub async fn graph_data(&self, service_id: i32) -> Result<String, StoreError> {
        let end = Utc::now();
        let start = end - Duration::days(GRAPH_DAYS);
        let series = self
            .bucketed_series(service_id, start, end, BucketUnit::Hour, MetricColumn::Latency)
            .await?;
        Ok(series.to_json())
    }

    pub async fn summary(&self, service: &Service) -> Result<ServiceSummary, StoreError> {
        let now = Utc::now();
        let downtime = self.downtime_at(service.id, now).await?;
        Ok(ServiceSummary {
            id: service.id,
            name: service.name.clone(),
            online: service.online,
            avg_latency: self.average_latency(service.id).await?,
            online_24_hours: self.online_24(service.id).await?,
            avg_uptime_24: self.avg_uptime_24(service.id).await?,
            total_uptime: self.total_uptime(service.id).await?,
            downtime_seconds: downtime.num_seconds(),
            downtime_text: self.downtime_text_at(service, now).await?,
            small_text: self.small_text_at(service, now).await?,
        })
    }
}
