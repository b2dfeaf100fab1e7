use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Runtime snapshot of a heartbeat background job.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatJobSnapshot {
    pub name: String,
    pub interval_secs: u64,
    pub last_run_at: Option<String>,
    pub last_success_at: Option<String>,
    pub last_error_at: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub is_running: bool,
}

impl HeartbeatJobSnapshot {
    fn new(name: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            interval_secs: interval.as_secs(),
            last_run_at: None,
            last_success_at: None,
            last_error_at: None,
            last_error: None,
            consecutive_failures: 0,
            is_running: false,
        }
    }
}

/// Shared telemetry for heartbeat jobs. The coordinator writes, the API reads.
#[derive(Default)]
pub struct HeartbeatTelemetry {
    jobs: Mutex<HashMap<String, HeartbeatJobSnapshot>>,
}

impl HeartbeatTelemetry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HeartbeatJobSnapshot>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register_job(&self, name: &str, interval: Duration) {
        let mut jobs = self.lock();
        jobs.entry(name.to_string())
            .or_insert_with(|| HeartbeatJobSnapshot::new(name, interval));
    }

    fn mark_started(&self, name: &str) {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(name) {
            job.last_run_at = Some(Utc::now().to_rfc3339());
            job.is_running = true;
        }
    }

    fn mark_success(&self, name: &str) {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(name) {
            job.last_success_at = Some(Utc::now().to_rfc3339());
            job.consecutive_failures = 0;
            job.is_running = false;
        }
    }

    fn mark_failure(&self, name: &str, error: &str, consecutive: u32) {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(name) {
            job.last_error_at = Some(Utc::now().to_rfc3339());
            job.last_error = Some(error.to_string());
            job.consecutive_failures = consecutive;
            job.is_running = false;
        }
    }

    pub fn snapshots(&self) -> Vec<HeartbeatJobSnapshot> {
        let mut jobs: Vec<_> = self.lock().values().cloned().collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }
}

type HeartbeatRunFn =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

struct HeartbeatJob {
    name: String,
    interval: Duration,
    last_run: Option<Instant>,
    is_running: Arc<AtomicBool>,
    consecutive_failures: Arc<AtomicU32>,
    run: HeartbeatRunFn,
}

/// Drives the periodic background jobs. Each tick probes the database, then
/// fires every job whose interval has elapsed. A job still running when its
/// next slot comes up is skipped, and repeated failures stretch the effective
/// interval so a broken job cannot hot-loop.
pub struct HeartbeatCoordinator {
    jobs: Vec<HeartbeatJob>,
    pool: SqlitePool,
    semaphore: Arc<Semaphore>,
    tick_interval: Duration,
    telemetry: Arc<HeartbeatTelemetry>,
    db_healthy: bool,
}

impl HeartbeatCoordinator {
    pub fn new(
        pool: SqlitePool,
        tick_interval: Duration,
        max_concurrent_jobs: usize,
        telemetry: Arc<HeartbeatTelemetry>,
    ) -> Self {
        Self {
            jobs: Vec::new(),
            pool,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            tick_interval,
            telemetry,
            db_healthy: true,
        }
    }

    pub fn register_job<F, Fut>(&mut self, name: &str, interval: Duration, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.telemetry.register_job(name, interval);
        self.jobs.push(HeartbeatJob {
            name: name.to_string(),
            interval,
            last_run: None,
            is_running: Arc::new(AtomicBool::new(false)),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            run: Box::new(move || Box::pin(f())),
        });
    }

    /// Consumes the coordinator and runs the tick loop until the process exits.
    pub fn start(mut self) {
        tokio::spawn(async move {
            info!(
                jobs = self.jobs.len(),
                tick_secs = self.tick_interval.as_secs(),
                "heartbeat started"
            );
            loop {
                self.tick().await;
                tokio::time::sleep(self.tick_interval).await;
            }
        });
    }

    async fn check_db(&mut self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                if !self.db_healthy {
                    info!("database reachable again, resuming jobs");
                    self.db_healthy = true;
                }
                true
            }
            Err(e) => {
                if self.db_healthy {
                    error!("database unreachable, pausing jobs: {e:#}");
                    self.db_healthy = false;
                }
                false
            }
        }
    }

    pub async fn tick(&mut self) {
        if !self.check_db().await {
            return;
        }

        let now = Instant::now();
        for job in &mut self.jobs {
            if job.is_running.load(Ordering::SeqCst) {
                continue;
            }

            // Failures double the wait, capped so a flapping job still
            // retries within a bounded window.
            let failures = job.consecutive_failures.load(Ordering::SeqCst);
            let effective_interval = job.interval * 2u32.pow(failures.min(5));
            let due = match job.last_run {
                None => true,
                Some(last) => now.duration_since(last) >= effective_interval,
            };
            if !due {
                continue;
            }

            job.last_run = Some(now);
            job.is_running.store(true, Ordering::SeqCst);
            self.telemetry.mark_started(&job.name);

            let name = job.name.clone();
            let is_running = Arc::clone(&job.is_running);
            let failure_count = Arc::clone(&job.consecutive_failures);
            let semaphore = Arc::clone(&self.semaphore);
            let telemetry = Arc::clone(&self.telemetry);
            let fut = (job.run)();

            tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        is_running.store(false, Ordering::SeqCst);
                        return;
                    }
                };
                let result = AssertUnwindSafe(fut).catch_unwind().await;
                match result {
                    Ok(Ok(())) => {
                        failure_count.swap(0, Ordering::SeqCst);
                        telemetry.mark_success(&name);
                    }
                    Ok(Err(e)) => {
                        let consecutive = failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                        warn!(job = %name, consecutive, "job failed: {e:#}");
                        telemetry.mark_failure(&name, &format!("{e:#}"), consecutive);
                    }
                    Err(_) => {
                        let consecutive = failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                        error!(job = %name, consecutive, "job panicked");
                        telemetry.mark_failure(&name, "panicked", consecutive);
                    }
                }
                is_running.store(false, Ordering::SeqCst);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup_store;
    use std::sync::atomic::AtomicUsize;

    fn coordinator_for(pool: SqlitePool) -> (HeartbeatCoordinator, Arc<HeartbeatTelemetry>) {
        let telemetry = Arc::new(HeartbeatTelemetry::new());
        let coordinator =
            HeartbeatCoordinator::new(pool, Duration::from_secs(1), 4, Arc::clone(&telemetry));
        (coordinator, telemetry)
    }

    #[tokio::test]
    async fn test_tick_fires_registered_job() {
        let harness = setup_store().await;
        let (mut coordinator, telemetry) = coordinator_for(harness.store.pool().clone());

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        coordinator.register_job("sweep", Duration::from_secs(3600), move || {
            let fired = Arc::clone(&fired_clone);
            async move {
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        coordinator.tick().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let snapshots = telemetry.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].last_success_at.is_some());
        assert_eq!(snapshots[0].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_job_waits_out_its_interval_between_runs() {
        let harness = setup_store().await;
        let (mut coordinator, _telemetry) = coordinator_for(harness.store.pool().clone());

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        coordinator.register_job("sweep", Duration::from_secs(3600), move || {
            let fired = Arc::clone(&fired_clone);
            async move {
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        coordinator.tick().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.tick().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Second tick lands well inside the hour interval.
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_cleared_on_recovery() {
        let harness = setup_store().await;
        let (mut coordinator, telemetry) = coordinator_for(harness.store.pool().clone());

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        coordinator.register_job("flaky", Duration::from_millis(0), move || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("first run breaks");
                }
                Ok(())
            }
        });

        coordinator.tick().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_failure = telemetry.snapshots();
        assert_eq!(after_failure[0].consecutive_failures, 1);
        assert!(after_failure[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("first run breaks"));

        coordinator.tick().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_recovery = telemetry.snapshots();
        assert_eq!(after_recovery[0].consecutive_failures, 0);
        assert!(after_recovery[0].last_success_at.is_some());
    }

    #[tokio::test]
    async fn test_panicking_job_is_recorded_not_fatal() {
        let harness = setup_store().await;
        let (mut coordinator, telemetry) = coordinator_for(harness.store.pool().clone());

        coordinator.register_job("broken", Duration::from_secs(3600), || async {
            panic!("boom");
        });

        coordinator.tick().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshots = telemetry.snapshots();
        assert_eq!(snapshots[0].consecutive_failures, 1);
        assert_eq!(snapshots[0].last_error.as_deref(), Some("panicked"));
        assert!(!snapshots[0].is_running);
    }
}
