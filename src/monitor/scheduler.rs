//! One periodic checker task per service.
//!
//! Each task sleeps for the interval it was started with, probes the service
//! as currently registered, appends a hit or failure and writes the new
//! status back to the registry. Sleeps and probes are both raced against the
//! task's cancellation token, and nothing is appended once it has fired.
//! Stopping a checker waits for its task to end, so an append already in
//! flight has landed by the time `stop` or `restart` returns.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::probe::{Probe, ProbeError};
use super::registry::ServiceRegistry;
use super::stats::StatisticsEngine;
use crate::db::RecordStore;
use crate::db::models::{NewFailure, NewHit, Service};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("A checker task is already running for service {0}")]
    AlreadyRunning(i32),
}

struct CheckerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl CheckerHandle {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

#[derive(Clone)]
struct CheckContext {
    probe: Arc<dyn Probe>,
    store: Arc<dyn RecordStore>,
    registry: Arc<ServiceRegistry>,
    stats: StatisticsEngine,
}

impl CheckContext {
    async fn record_outcome(
        &self,
        service: &Service,
        outcome: Result<Duration, ProbeError>,
        token: &CancellationToken,
    ) {
        if token.is_cancelled() {
            return;
        }
        let created_at = Utc::now();
        let online = match outcome {
            Ok(latency) => {
                let hit = NewHit {
                    service_id: service.id,
                    latency: latency.as_secs_f64(),
                    created_at,
                };
                if let Err(e) = self.store.insert_hit(hit).await {
                    error!(service_id = service.id, error = %e, "Failed to record hit.");
                }
                true
            }
            Err(probe_error) => {
                debug!(service_id = service.id, service_name = %service.name, error = %probe_error, "Probe failed.");
                let failure = NewFailure {
                    service_id: service.id,
                    issue: probe_error.to_string(),
                    created_at,
                };
                if let Err(e) = self.store.insert_failure(failure).await {
                    error!(service_id = service.id, error = %e, "Failed to record failure.");
                }
                false
            }
        };

        // Stopped while appending: the status belongs to whoever stopped us.
        if token.is_cancelled() {
            return;
        }
        // A failed refresh keeps the previously cached percentage.
        let online_24_hours = self.stats.online_24(service.id).await.ok();
        if !self
            .registry
            .set_status(service.id, online, online_24_hours)
            .await
        {
            debug!(service_id = service.id, "Service left the registry during a check.");
        }
    }
}

/// Cancels a checker and waits for its task to end.
async fn join_checker(service_id: i32, checker: CheckerHandle) {
    checker.token.cancel();
    match checker.handle.await {
        Err(e) if e.is_panic() => error!(service_id, error = %e, "Checker task panicked."),
        _ => {}
    }
}

async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

async fn run_checker(
    context: CheckContext,
    service_id: i32,
    interval: Duration,
    check_now: bool,
    token: CancellationToken,
) {
    if !check_now && !sleep_or_cancel(&token, interval).await {
        return;
    }

    loop {
        let Some(service) = context.registry.by_id(service_id).await else {
            warn!(service_id, "Service is no longer registered, stopping checker.");
            break;
        };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = context.probe.check(&service) => outcome,
        };
        context.record_outcome(&service, outcome, &token).await;

        if !sleep_or_cancel(&token, interval).await {
            break;
        }
    }
    debug!(service_id, "Checker task finished.");
}

pub struct CheckScheduler {
    context: CheckContext,
    tasks: Mutex<HashMap<i32, CheckerHandle>>,
}

impl CheckScheduler {
    pub fn new(
        probe: Arc<dyn Probe>,
        store: Arc<dyn RecordStore>,
        registry: Arc<ServiceRegistry>,
        stats: StatisticsEngine,
    ) -> Self {
        Self {
            context: CheckContext {
                probe,
                store,
                registry,
                stats,
            },
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns the checker for `service`. With `check_now` the first probe
    /// runs immediately, otherwise after one interval.
    pub async fn start(&self, service: &Service, check_now: bool) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.lock().await;
        self.start_locked(&mut tasks, service, check_now)
    }

    fn start_locked(
        &self,
        tasks: &mut HashMap<i32, CheckerHandle>,
        service: &Service,
        check_now: bool,
    ) -> Result<(), SchedulerError> {
        if tasks.get(&service.id).is_some_and(CheckerHandle::is_live) {
            return Err(SchedulerError::AlreadyRunning(service.id));
        }

        let interval = service.interval();
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_checker(
            self.context.clone(),
            service.id,
            interval,
            check_now,
            token.clone(),
        ));
        tasks.insert(
            service.id,
            CheckerHandle {
                token,
                handle,
                interval,
            },
        );
        info!(
            service_id = service.id,
            service_name = %service.name,
            interval = %humantime::format_duration(interval),
            check_now,
            "Started checker task."
        );
        Ok(())
    }

    /// Cancels the checker for `service_id` and waits for it to end. Returns
    /// `false` when none was running.
    pub async fn stop(&self, service_id: i32) -> bool {
        let removed = self.tasks.lock().await.remove(&service_id);
        match removed {
            Some(checker) => {
                join_checker(service_id, checker).await;
                info!(service_id, "Stopped checker task.");
                true
            }
            None => false,
        }
    }

    /// Replaces the checker with one using the service's current interval.
    /// The old task has ended before the new one is spawned, and the first
    /// probe of the new task runs immediately.
    pub async fn restart(&self, service: &Service) -> Result<(), SchedulerError> {
        // Checker tasks never take this lock, so joining under it cannot block them.
        let mut tasks = self.tasks.lock().await;
        if let Some(checker) = tasks.remove(&service.id) {
            join_checker(service.id, checker).await;
            debug!(service_id = service.id, "Stopped checker task for restart.");
        }
        self.start_locked(&mut tasks, service, true)
    }

    pub async fn is_running(&self, service_id: i32) -> bool {
        self.tasks
            .lock()
            .await
            .get(&service_id)
            .is_some_and(CheckerHandle::is_live)
    }

    /// Interval the running checker was started with.
    #[cfg(test)]
    pub(crate) async fn interval_of(&self, service_id: i32) -> Option<Duration> {
        self.tasks
            .lock()
            .await
            .get(&service_id)
            .filter(|checker| checker.is_live())
            .map(|checker| checker.interval)
    }

    pub async fn task_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|checker| checker.is_live())
            .count()
    }

    /// Cancels every checker and waits for them to wind down.
    pub async fn stop_all(&self) {
        let checkers: Vec<(i32, CheckerHandle)> = self.tasks.lock().await.drain().collect();
        let count = checkers.len();
        join_all(
            checkers
                .into_iter()
                .map(|(service_id, checker)| join_checker(service_id, checker)),
        )
        .await;
        info!(count, "Stopped all checker tasks.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRecordStore;
    use crate::db::models::ProbeKind;
    use crate::monitor::testing::{FlakyStore, MockProbe};

    struct Harness {
        probe: Arc<MockProbe>,
        store: Arc<FlakyStore>,
        registry: Arc<ServiceRegistry>,
        scheduler: CheckScheduler,
    }

    fn harness(probe_delay: Duration) -> Harness {
        let probe = Arc::new(MockProbe::new(probe_delay));
        let store = Arc::new(FlakyStore::new());
        let registry = Arc::new(ServiceRegistry::new());
        let stats = StatisticsEngine::new(store.clone());
        let scheduler = CheckScheduler::new(probe.clone(), store.clone(), registry.clone(), stats);
        Harness {
            probe,
            store,
            registry,
            scheduler,
        }
    }

    async fn register(registry: &ServiceRegistry, id: i32, interval: i32) -> Service {
        let mut service =
            Service::new(format!("svc-{id}"), ProbeKind::Tcp, "127.0.0.1:1").with_interval(interval);
        service.id = id;
        registry.add(service.clone()).await;
        service
    }

    async fn advance(seconds: u64) {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }

    async fn record_count(store: &FlakyStore, id: i32) -> u64 {
        store.count_hits(id, None).await.unwrap() + store.count_failures(id, None).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_on_every_interval_and_writes_back_status() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 10).await;

        h.scheduler.start(&service, true).await.unwrap();
        advance(25).await;

        // Probes at 0s, 10s and 20s.
        assert_eq!(h.probe.calls(), 3);
        assert_eq!(h.store.count_hits(1, None).await.unwrap(), 3);
        let stored = h.registry.by_id(1).await.unwrap();
        assert!(stored.online);
        assert_eq!(stored.online_24_hours, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_start_waits_one_interval() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 30).await;

        h.scheduler.start(&service, false).await.unwrap();
        advance(29).await;
        assert_eq!(h.probe.calls(), 0);
        advance(2).await;
        assert_eq!(h.probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_records_failure_and_goes_offline() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 10).await;
        h.registry.set_status(1, true, Some(100.0)).await;
        h.probe.set_failing(true);

        h.scheduler.start(&service, true).await.unwrap();
        advance(1).await;

        assert_eq!(h.store.count_failures(1, None).await.unwrap(), 1);
        let stored = h.registry.by_id(1).await.unwrap();
        assert!(!stored.online);
        assert_eq!(stored.online_24_hours, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 10).await;

        h.scheduler.start(&service, true).await.unwrap();
        assert_eq!(
            h.scheduler.start(&service, true).await,
            Err(SchedulerError::AlreadyRunning(1))
        );
        assert_eq!(h.scheduler.task_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_probe_appends_nothing() {
        let h = harness(Duration::from_secs(5));
        let service = register(&h.registry, 1, 10).await;

        h.scheduler.start(&service, true).await.unwrap();
        advance(1).await;
        assert_eq!(h.probe.calls(), 1);
        assert!(h.scheduler.stop(1).await);
        advance(60).await;

        assert_eq!(record_count(&h.store, 1).await, 0);
        assert!(!h.scheduler.is_running(1).await);
        assert!(!h.scheduler.stop(1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_sleep_ends_task() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 10).await;

        h.scheduler.start(&service, true).await.unwrap();
        advance(5).await;
        h.scheduler.stop(1).await;
        advance(60).await;

        assert_eq!(h.probe.calls(), 1);
        assert_eq!(h.scheduler.task_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_switches_interval() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 100).await;
        h.scheduler.start(&service, true).await.unwrap();
        advance(1).await;

        let faster = register(&h.registry, 1, 10).await;
        h.scheduler.restart(&faster).await.unwrap();
        h.scheduler.restart(&faster).await.unwrap();
        advance(25).await;

        assert_eq!(h.scheduler.task_count().await, 1);
        assert_eq!(h.scheduler.interval_of(1).await, Some(Duration::from_secs(10)));
        // One probe before the restarts, then 0s, 10s and 20s on the new interval.
        assert_eq!(h.probe.calls(), 4);
        assert!(h.probe.seen_intervals()[1..].iter().all(|i| *i == 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_append() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 10).await;
        h.store.set_append_delay(Duration::from_secs(2));

        h.scheduler.start(&service, true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let started = tokio::time::Instant::now();
        assert!(h.scheduler.stop(1).await);

        // The append begun before the stop has landed once `stop` returns.
        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert_eq!(h.store.count_hits(1, None).await.unwrap(), 1);
        advance(60).await;
        assert_eq!(record_count(&h.store, 1).await, 1);
        // The stopped task left the status alone.
        assert!(!h.registry.by_id(1).await.unwrap().online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_ends_old_task_before_spawning() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 100).await;
        h.store.set_append_delay(Duration::from_secs(2));

        h.scheduler.start(&service, true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let faster = register(&h.registry, 1, 10).await;
        h.scheduler.restart(&faster).await.unwrap();
        assert_eq!(h.store.count_hits(1, None).await.unwrap(), 1);

        // The new task checks right away; its append takes another 2s.
        advance(3).await;
        assert_eq!(h.probe.calls(), 2);
        assert_eq!(h.store.count_hits(1, None).await.unwrap(), 2);
        assert_eq!(h.scheduler.task_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_errors_do_not_stop_the_loop() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 10).await;
        h.registry.set_status(1, false, Some(42.0)).await;
        h.store.set_failing(true);

        h.scheduler.start(&service, true).await.unwrap();
        advance(25).await;

        assert_eq!(h.probe.calls(), 3);
        assert!(h.scheduler.is_running(1).await);
        let stored = h.registry.by_id(1).await.unwrap();
        assert!(stored.online);
        assert_eq!(stored.online_24_hours, 42.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_exits_when_service_unregistered() {
        let h = harness(Duration::ZERO);
        let service = register(&h.registry, 1, 10).await;
        h.scheduler.start(&service, true).await.unwrap();
        advance(1).await;

        h.registry.remove(1).await;
        advance(15).await;

        assert_eq!(h.probe.calls(), 1);
        assert!(!h.scheduler.is_running(1).await);
        // A dead handle does not block a fresh start.
        register(&h.registry, 1, 10).await;
        assert!(h.scheduler.start(&service, true).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_cancels_every_task() {
        let probe = Arc::new(MockProbe::new(Duration::ZERO));
        let store = Arc::new(MemoryRecordStore::new());
        let registry = Arc::new(ServiceRegistry::new());
        let stats = StatisticsEngine::new(store.clone());
        let scheduler = CheckScheduler::new(probe.clone(), store, registry.clone(), stats);

        for id in 1..=3 {
            let service = register(&registry, id, 10).await;
            scheduler.start(&service, true).await.unwrap();
        }
        advance(1).await;
        assert_eq!(scheduler.task_count().await, 3);

        scheduler.stop_all().await;
        advance(30).await;
        assert_eq!(scheduler.task_count().await, 0);
        assert_eq!(probe.calls(), 3);
    }
}
