use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::NotSet, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::entities::{failure, hit, service};

pub const DEFAULT_CHECK_INTERVAL_SECONDS: i32 = 60;
pub const DEFAULT_TIMEOUT_SECONDS: i32 = 10;

/// How a service is probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Http,
    Tcp,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Http => "http",
            ProbeKind::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(ProbeKind::Http),
            "tcp" => Ok(ProbeKind::Tcp),
            other => Err(format!("Unknown probe kind: {other}")),
        }
    }
}

/// A monitored endpoint.
///
/// `online_24_hours` is a cached value: it is only written by the checker task
/// after each probe cycle and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: i32,
    pub name: String,
    pub kind: ProbeKind,
    pub target: String,
    pub expected_status: i32,
    /// Seconds between two probes.
    pub check_interval: i32,
    /// Probe timeout in seconds.
    pub timeout: i32,
    pub order_id: i32,
    pub online: bool,
    pub created_at: DateTime<Utc>,
    pub online_24_hours: f32,
}

impl Service {
    pub fn new(name: impl Into<String>, kind: ProbeKind, target: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            kind,
            target: target.into(),
            expected_status: 200,
            check_interval: DEFAULT_CHECK_INTERVAL_SECONDS,
            timeout: DEFAULT_TIMEOUT_SECONDS,
            order_id: 0,
            online: false,
            created_at: Utc::now(),
            online_24_hours: 0.0,
        }
    }

    pub fn with_interval(mut self, seconds: i32) -> Self {
        self.check_interval = seconds;
        self
    }

    pub fn with_order(mut self, order_id: i32) -> Self {
        self.order_id = order_id;
        self
    }

    /// Time to sleep between probes; never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval.max(1) as u64)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1) as u64)
    }

    pub(crate) fn to_active_model(&self) -> service::ActiveModel {
        service::ActiveModel {
            id: if self.id == 0 { NotSet } else { Set(self.id) },
            name: Set(self.name.clone()),
            kind: Set(self.kind.as_str().to_string()),
            target: Set(self.target.clone()),
            expected_status: Set(self.expected_status),
            check_interval: Set(self.check_interval),
            timeout: Set(self.timeout),
            order_id: Set(self.order_id),
            online: Set(self.online),
            created_at: Set(self.created_at),
        }
    }
}

impl From<service::Model> for Service {
    fn from(model: service::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            kind: model.kind.parse().unwrap_or_default(),
            target: model.target,
            expected_status: model.expected_status,
            check_interval: model.check_interval,
            timeout: model.timeout,
            order_id: model.order_id,
            online: model.online,
            created_at: model.created_at,
            online_24_hours: 0.0,
        }
    }
}

/// A successful probe waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHit {
    pub service_id: i32,
    pub latency: f64,
    pub created_at: DateTime<Utc>,
}

impl NewHit {
    pub(crate) fn into_active_model(self) -> hit::ActiveModel {
        hit::ActiveModel {
            id: NotSet,
            service_id: Set(self.service_id),
            latency: Set(self.latency),
            created_at: Set(self.created_at),
        }
    }
}

/// A failed probe waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFailure {
    pub service_id: i32,
    pub issue: String,
    pub created_at: DateTime<Utc>,
}

impl NewFailure {
    pub(crate) fn into_active_model(self) -> failure::ActiveModel {
        failure::ActiveModel {
            id: NotSet,
            service_id: Set(self.service_id),
            issue: Set(self.issue),
            created_at: Set(self.created_at),
        }
    }
}

pub type Hit = hit::Model;
pub type Failure = failure::Model;
