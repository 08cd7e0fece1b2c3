//! In-memory registry of every known service.
//!
//! Lookups go through a map keyed by service id; iteration order is kept in a
//! separate id list sorted by `order_id` (highest first, stable for ties).

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::db::models::Service;

#[derive(Default, Debug)]
struct RegistryState {
    services: HashMap<i32, Service>,
    order: Vec<i32>,
}

impl RegistryState {
    fn sort(&mut self) {
        let services = &self.services;
        let position = |id: &i32| services.get(id).map_or(i32::MIN, |s| s.order_id);
        // `sort_by` is stable, so ties keep their insertion order.
        self.order.sort_by(|a, b| position(b).cmp(&position(a)));
    }
}

#[derive(Default, Debug)]
pub struct ServiceRegistry {
    state: RwLock<RegistryState>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every service in display order.
    pub async fn all(&self) -> Vec<Service> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.services.get(id).cloned())
            .collect()
    }

    pub async fn by_id(&self, service_id: i32) -> Option<Service> {
        self.state.read().await.services.get(&service_id).cloned()
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, service_id: i32) -> bool {
        self.state.read().await.services.contains_key(&service_id)
    }

    /// Registers a service. An existing entry with the same id is overwritten
    /// in place.
    pub async fn add(&self, service: Service) {
        let mut state = self.state.write().await;
        if state.services.insert(service.id, service.clone()).is_none() {
            state.order.push(service.id);
        }
        state.sort();
    }

    pub async fn remove(&self, service_id: i32) -> Option<Service> {
        let mut state = self.state.write().await;
        let removed = state.services.remove(&service_id)?;
        state.order.retain(|id| *id != service_id);
        Some(removed)
    }

    /// Overwrites the entry with the same id. Returns `false` when the id is
    /// not registered.
    pub async fn replace(&self, service: Service) -> bool {
        let mut state = self.state.write().await;
        match state.services.get_mut(&service.id) {
            Some(existing) => {
                *existing = service;
                state.sort();
                true
            }
            None => false,
        }
    }

    /// Writes back the result of a probe cycle without touching the fields
    /// owned by lifecycle operations. `online_24_hours` is left as is when
    /// `None`.
    pub async fn set_status(
        &self,
        service_id: i32,
        online: bool,
        online_24_hours: Option<f32>,
    ) -> bool {
        let mut state = self.state.write().await;
        match state.services.get_mut(&service_id) {
            Some(service) => {
                service.online = online;
                if let Some(percent) = online_24_hours {
                    service.online_24_hours = percent;
                }
                true
            }
            None => false,
        }
    }

    pub async fn reorder(&self) {
        self.state.write().await.sort();
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.services.clear();
        state.order.clear();
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.services.len()
    }

    pub async fn count_online(&self) -> usize {
        self.state
            .read()
            .await
            .services
            .values()
            .filter(|s| s.online)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ProbeKind;
    use std::sync::Arc;

    fn service(id: i32, order_id: i32) -> Service {
        let mut service = Service::new(format!("svc-{id}"), ProbeKind::Http, "https://example.com")
            .with_order(order_id);
        service.id = id;
        service
    }

    async fn order_of(registry: &ServiceRegistry) -> Vec<i32> {
        registry.all().await.into_iter().map(|s| s.order_id).collect()
    }

    #[tokio::test]
    async fn test_orders_by_position_descending() {
        let registry = ServiceRegistry::new();
        registry.add(service(1, 3)).await;
        registry.add(service(2, 1)).await;
        registry.add(service(3, 2)).await;

        assert_eq!(order_of(&registry).await, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let registry = ServiceRegistry::new();
        registry.add(service(10, 1)).await;
        registry.add(service(11, 1)).await;
        registry.add(service(12, 5)).await;

        let ids: Vec<i32> = registry.all().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![12, 10, 11]);
    }

    #[tokio::test]
    async fn test_replace_resorts_and_ignores_unknown_ids() {
        let registry = ServiceRegistry::new();
        registry.add(service(1, 1)).await;
        registry.add(service(2, 2)).await;

        assert!(registry.replace(service(1, 9)).await);
        assert_eq!(registry.all().await[0].id, 1);
        assert!(!registry.replace(service(42, 0)).await);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let registry = ServiceRegistry::new();
        registry.add(service(1, 1)).await;

        assert!(registry.by_id(7).await.is_none());
        assert!(registry.remove(7).await.is_none());
        assert!(!registry.set_status(7, true, Some(100.0)).await);
        assert!(registry.remove(1).await.is_some());
        assert!(registry.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_status_keeps_previous_percent_when_absent() {
        let registry = ServiceRegistry::new();
        registry.add(service(1, 1)).await;

        registry.set_status(1, true, Some(99.5)).await;
        registry.set_status(1, false, None).await;

        let stored = registry.by_id(1).await.unwrap();
        assert!(!stored.online);
        assert_eq!(stored.online_24_hours, 99.5);
        assert_eq!(registry.count_online().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_entries() {
        let registry = Arc::new(ServiceRegistry::new());
        let mut handles = Vec::new();
        for id in 1..=50 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.add(service(id, id % 7)).await;
                registry.set_status(id, id % 2 == 0, Some(50.0)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.count().await, 50);
        assert_eq!(registry.count_online().await, 25);
        let positions = order_of(&registry).await;
        assert!(positions.windows(2).all(|w| w[0] >= w[1]));
    }
}
