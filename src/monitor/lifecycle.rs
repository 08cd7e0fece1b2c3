//! Create, update and delete services while they are being checked.
//!
//! Every operation persists first. When the store refuses, the operation
//! returns with the registry and the scheduler as they were. Deleting joins
//! the checker before the records are removed, and brings it back if the
//! store refuses the delete.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::MonitorError;
use super::probe::Probe;
use super::registry::ServiceRegistry;
use super::scheduler::{CheckScheduler, SchedulerError};
use super::stats::StatisticsEngine;
use crate::db::RecordStore;
use crate::db::models::Service;
use crate::notifications::NotificationDispatcher;

pub struct ServiceManager {
    store: Arc<dyn RecordStore>,
    registry: Arc<ServiceRegistry>,
    scheduler: CheckScheduler,
    stats: StatisticsEngine,
    notifier: NotificationDispatcher,
}

impl ServiceManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        probe: Arc<dyn Probe>,
        notifier: NotificationDispatcher,
        stats: StatisticsEngine,
    ) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let scheduler = CheckScheduler::new(probe, store.clone(), registry.clone(), stats.clone());
        Self {
            store,
            registry,
            scheduler,
            stats,
            notifier,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &CheckScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> &StatisticsEngine {
        &self.stats
    }

    /// Persists a new service, registers it and starts its checker. Returns
    /// the id assigned by the store.
    pub async fn create(&self, mut service: Service, start_checking: bool) -> Result<i32, MonitorError> {
        service.created_at = Utc::now();
        let id = self.store.insert_service(&service).await.inspect_err(|e| {
            error!(service_name = %service.name, error = %e, "Failed to persist new service.");
        })?;
        service.id = id;

        self.registry.add(service.clone()).await;
        self.registry.reorder().await;
        if let Err(e) = self.scheduler.start(&service, start_checking).await {
            error!(service_id = id, error = %e, "Failed to start checker, undoing create.");
            self.registry.remove(id).await;
            self.registry.reorder().await;
            if let Err(undo) = self.store.delete_service(id).await {
                error!(service_id = id, error = %undo, "Failed to remove service after aborted create.");
            }
            return Err(e.into());
        }
        self.notifier.on_new_service(&service);

        info!(service_id = id, service_name = %service.name, target = %service.target, "Service created.");
        Ok(id)
    }

    /// Persists the new settings of an existing service. With `restart` the
    /// checker is replaced by one using the new interval.
    pub async fn update(&self, service: Service, restart: bool) -> Result<(), MonitorError> {
        self.store.update_service(&service).await.inspect_err(|e| {
            error!(service_id = service.id, error = %e, "Failed to persist service update.");
        })
        .map_err(MonitorError::from_store)?;

        if !self.registry.replace(service.clone()).await {
            warn!(service_id = service.id, "Updated service was not registered, adding it.");
            self.registry.add(service.clone()).await;
        }
        self.registry.reorder().await;
        if restart {
            self.scheduler.restart(&service).await?;
        }
        self.notifier.on_updated_service(&service);

        info!(service_id = service.id, restart, "Service updated.");
        Ok(())
    }

    /// Deletes a service together with its recorded history.
    pub async fn delete(&self, service_id: i32) -> Result<(), MonitorError> {
        let registered = self.registry.by_id(service_id).await;
        // No record may land after the cascade below.
        let was_running = self.scheduler.stop(service_id).await;
        if let Err(e) = self.store.delete_service(service_id).await {
            error!(service_id, error = %e, "Failed to delete service.");
            if let (true, Some(service)) = (was_running, registered.as_ref()) {
                if let Err(restart) = self.scheduler.start(service, false).await {
                    warn!(service_id, error = %restart, "Failed to resume checker after aborted delete.");
                }
            }
            return Err(MonitorError::from_store(e));
        }

        let removed = self.registry.remove(service_id).await;
        self.registry.reorder().await;
        if let Some(service) = removed.or(registered) {
            self.notifier.on_deleted_service(&service);
        }

        info!(service_id, "Service deleted.");
        Ok(())
    }

    /// Replaces the registry with every persisted service and starts their
    /// checkers. Returns how many services were loaded.
    pub async fn load_all(&self) -> Result<usize, MonitorError> {
        let services = self.store.all_services().await.inspect_err(|e| {
            error!(error = %e, "Failed to load services.");
        })?;

        self.scheduler.stop_all().await;
        self.registry.clear().await;
        for service in &services {
            self.registry.add(service.clone()).await;
        }
        self.registry.reorder().await;

        for service in &services {
            match self.scheduler.start(service, true).await {
                Ok(()) => {}
                Err(SchedulerError::AlreadyRunning(id)) => {
                    warn!(service_id = id, "Checker already running, skipping.");
                }
            }
        }

        info!(count = services.len(), "Loaded services.");
        Ok(services.len())
    }

    /// Stops every checker. The registry keeps its entries.
    pub async fn shutdown(&self) {
        self.scheduler.stop_all().await;
        info!("Service manager shut down.");
    }

    pub async fn services_count(&self) -> usize {
        self.registry.count().await
    }

    pub async fn count_online(&self) -> usize {
        self.registry.count_online().await
    }
}
