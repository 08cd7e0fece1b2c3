//! Human-readable status lines.

use chrono::{DateTime, Duration, Utc};

use super::stats::StatisticsEngine;
use crate::db::StoreError;
use crate::db::models::Service;

const DISPLAY_FORMAT: &str = "%A %-I:%M:%S%p, %b %e %Y";

/// `"10m 3s"` style rendering, whole seconds only.
pub fn readable_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds().max(0) as u64;
    humantime::format_duration(std::time::Duration::from_secs(seconds)).to_string()
}

impl StatisticsEngine {
    pub fn display_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone())
            .format(DISPLAY_FORMAT)
            .to_string()
    }

    pub async fn small_text(&self, service: &Service) -> Result<String, StoreError> {
        self.small_text_at(service, Utc::now()).await
    }

    pub(crate) async fn small_text_at(
        &self,
        service: &Service,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let failures = self.limited_failures(service.id).await?;
        if service.online {
            return Ok(match failures.first() {
                None => format!("Online since {}", self.display_time(service.created_at)),
                Some(last) => format!(
                    "Online, last failure was {}",
                    self.display_time(last.created_at)
                ),
            });
        }
        match failures.first() {
            Some(last) => {
                let downtime = self.downtime_at(service.id, now).await?;
                Ok(format!(
                    "Reported offline {} ago, {}",
                    readable_duration(downtime),
                    last.issue
                ))
            }
            None => Ok(format!("{} is currently offline", service.name)),
        }
    }

    pub async fn downtime_text(&self, service: &Service) -> Result<String, StoreError> {
        self.downtime_text_at(service, Utc::now()).await
    }

    pub(crate) async fn downtime_text_at(
        &self,
        service: &Service,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let downtime = self.downtime_at(service.id, now).await?;
        Ok(format!(
            "{} has been offline for {}",
            service.name,
            readable_duration(downtime)
        ))
    }
}
