use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::db::models::Service;

pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(#[from] tera::Error),
}

/// Lifecycle events a notifier can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceEvent {
    NewService,
    UpdatedService,
    DeletedService,
}

impl ServiceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceEvent::NewService => "new_service",
            ServiceEvent::UpdatedService => "updated_service",
            ServiceEvent::DeletedService => "deleted_service",
        }
    }
}

impl fmt::Display for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin observing service lifecycle events.
///
/// Implementors only need [`ServiceNotifier::notify`]; the per-event hooks
/// forward to it unless overridden.
#[async_trait]
pub trait ServiceNotifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn notify(&self, event: ServiceEvent, service: &Service) -> Result<(), SenderError>;

    async fn on_new_service(&self, service: &Service) -> Result<(), SenderError> {
        self.notify(ServiceEvent::NewService, service).await
    }

    async fn on_updated_service(&self, service: &Service) -> Result<(), SenderError> {
        self.notify(ServiceEvent::UpdatedService, service).await
    }

    async fn on_deleted_service(&self, service: &Service) -> Result<(), SenderError> {
        self.notify(ServiceEvent::DeletedService, service).await
    }
}
