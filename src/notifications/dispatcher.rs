use std::sync::Arc;
use tracing::{debug, warn};

use super::senders::{ServiceEvent, ServiceNotifier};
use crate::db::models::Service;

/// Fans lifecycle events out to every registered notifier.
///
/// Each delivery runs on its own task so a slow or failing notifier never
/// holds up the lifecycle operation; failures are only logged.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn ServiceNotifier>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ServiceNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn on_new_service(&self, service: &Service) {
        self.dispatch(ServiceEvent::NewService, service);
    }

    pub fn on_updated_service(&self, service: &Service) {
        self.dispatch(ServiceEvent::UpdatedService, service);
    }

    pub fn on_deleted_service(&self, service: &Service) {
        self.dispatch(ServiceEvent::DeletedService, service);
    }

    fn dispatch(&self, event: ServiceEvent, service: &Service) {
        for notifier in &self.notifiers {
            let notifier = notifier.clone();
            let service = service.clone();
            tokio::spawn(async move {
                let result = match event {
                    ServiceEvent::NewService => notifier.on_new_service(&service).await,
                    ServiceEvent::UpdatedService => notifier.on_updated_service(&service).await,
                    ServiceEvent::DeletedService => notifier.on_deleted_service(&service).await,
                };
                match result {
                    Ok(()) => debug!(notifier = notifier.name(), %event, service_id = service.id, "Notification sent."),
                    Err(e) => warn!(notifier = notifier.name(), %event, service_id = service.id, error = %e, "Notification failed."),
                }
            });
        }
    }
}
