use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::info;

use crate::api::{start_api_server, ApiState};
use crate::config::AppConfig;
use crate::heartbeat::{HeartbeatCoordinator, HeartbeatTelemetry};
use crate::reconcile::Reconciler;
use crate::sequences::SequenceExpander;
use crate::store::{CrmStore, SqliteStore};
use crate::tasks::TaskLifecycle;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. Store
    let sqlite = SqliteStore::new(&config.state.db_path).await?;
    let pool = sqlite.pool();
    let store: Arc<dyn CrmStore> = Arc::new(sqlite);
    info!("Store initialized ({})", config.state.db_path);

    // 2. Domain services
    let lifecycle = Arc::new(TaskLifecycle::new(Arc::clone(&store)));
    let expander = Arc::new(SequenceExpander::new(Arc::clone(&store)));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&store)));

    // 3. Heartbeat: periodic notification sweeps
    let telemetry = Arc::new(HeartbeatTelemetry::new());
    if config.heartbeat.enabled {
        let mut coordinator = HeartbeatCoordinator::new(
            pool,
            Duration::from_secs(config.heartbeat.tick_interval_secs),
            config.heartbeat.max_concurrent_jobs,
            Arc::clone(&telemetry),
        );
        let sweeper = Arc::clone(&reconciler);
        coordinator.register_job(
            "notification_sweeps",
            Duration::from_secs(config.heartbeat.sweep_interval_secs),
            move || {
                let reconciler = Arc::clone(&sweeper);
                async move {
                    let outcome = reconciler.run_sweeps(Utc::now()).await;
                    if outcome.errors > 0 {
                        anyhow::bail!("{} sweep operations failed", outcome.errors);
                    }
                    Ok(())
                }
            },
        );
        coordinator.start();
    } else {
        info!("Heartbeat disabled; notification sweeps will not run");
    }

    // 4. HTTP API (blocks until shutdown)
    let state = ApiState {
        store,
        lifecycle,
        expander,
        reconciler,
        telemetry,
        started_at: Instant::now(),
    };
    start_api_server(state, &config.http).await
}
