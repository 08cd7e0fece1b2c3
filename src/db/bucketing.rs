//! Backend-specific time bucketing used for chart aggregation.
//!
//! Every dialect renders the bucket start as text in `YYYY-MM-DD HH:MM:SS`
//! form so callers can parse the result the same way regardless of the
//! backend that produced it. Postgres and MySQL convert the column to UTC
//! before truncating, so the session time zone never shifts a bucket.

use sea_orm::{DbBackend, FromQueryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format of the `timeframe` column produced by [`TimeBucketing::bucket_clause`].
pub const TIMEFRAME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width of a chart bucket.
///
/// `Second` is kept for compatibility with existing callers and groups by
/// 60-second buckets on every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketUnit {
    Second,
    Hour,
    Day,
}

impl BucketUnit {
    pub fn width_seconds(&self) -> i64 {
        match self {
            BucketUnit::Second => 60,
            BucketUnit::Hour => 3600,
            BucketUnit::Day => 86400,
        }
    }
}

impl fmt::Display for BucketUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BucketUnit::Second => "second",
            BucketUnit::Hour => "hour",
            BucketUnit::Day => "day",
        };
        f.write_str(name)
    }
}

impl FromStr for BucketUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "second" | "minute" => Ok(BucketUnit::Second),
            "hour" => Ok(BucketUnit::Hour),
            "day" => Ok(BucketUnit::Day),
            other => Err(format!("Unsupported bucket unit: {other}")),
        }
    }
}

/// Numeric hit columns that can be averaged per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricColumn {
    Latency,
}

impl MetricColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            MetricColumn::Latency => "latency",
        }
    }
}

/// One aggregated bucket as returned by the store.
#[derive(FromQueryResult, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRow {
    pub timeframe: String,
    pub value: Option<f64>,
}

/// Renders the backend-native expression that maps `time_column` to the
/// start of its bucket.
pub trait TimeBucketing {
    fn bucket_clause(&self, unit: BucketUnit, time_column: &str) -> String;
}

impl TimeBucketing for DbBackend {
    fn bucket_clause(&self, unit: BucketUnit, time_column: &str) -> String {
        match self {
            DbBackend::Postgres => {
                let field = match unit {
                    BucketUnit::Second => "minute",
                    BucketUnit::Hour => "hour",
                    BucketUnit::Day => "day",
                };
                format!(
                    "to_char(date_trunc('{field}', {time_column} AT TIME ZONE 'UTC'), 'YYYY-MM-DD HH24:MI:SS')"
                )
            }
            DbBackend::MySql => {
                let pattern = match unit {
                    BucketUnit::Second => "%Y-%m-%d %H:%i:00",
                    BucketUnit::Hour => "%Y-%m-%d %H:00:00",
                    BucketUnit::Day => "%Y-%m-%d 00:00:00",
                };
                format!("date_format(CONVERT_TZ({time_column}, @@session.time_zone, '+00:00'), '{pattern}')")
            }
            // SQLite and anything else that understands strftime epochs.
            _ => {
                let seconds = unit.width_seconds();
                format!(
                    "datetime((strftime('%s', {time_column}) / {seconds}) * {seconds}, 'unixepoch')"
                )
            }
        }
    }
}
