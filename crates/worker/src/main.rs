//! Background job host: runs leader repair and the subscription-expiry sweep
//! against Postgres until interrupted.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Handle;

use teamhub_infra::EngineConfig;
use teamhub_infra::clock::SystemClock;
use teamhub_infra::jobs::{
    JobScheduler, LeaderRepairJob, PgAdvisoryJobLock, SchedulerConfig, SubscriptionExpiryJob,
};
use teamhub_infra::repository::PostgresTeamRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments set the environment directly.
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env().context("failed to load configuration")?;
    teamhub_observability::init(config.log_format);

    let database_url = config.require_database_url()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let repo = Arc::new(PostgresTeamRepository::new(pool.clone(), Handle::current()));
    repo.ensure_schema().await.context("failed to ensure schema")?;

    let mut scheduler = JobScheduler::new(PgAdvisoryJobLock::new(pool.clone(), Handle::current()))
        .with_config(SchedulerConfig::default().with_tick(config.scheduler_tick));
    scheduler
        .register(
            LeaderRepairJob::with_rank(repo.clone(), config.leader_tie_break, config.rank),
            config.leader_repair_schedule.clone(),
        )
        .register(
            SubscriptionExpiryJob::new(repo.clone(), Arc::new(SystemClock), config.expiry_sweep_batch_size),
            config.expiry_sweep_schedule.clone(),
        );

    let handle = scheduler.spawn().context("failed to start job workers")?;
    tracing::info!(
        leader_repair = ?config.leader_repair_schedule,
        expiry_sweep = ?config.expiry_sweep_schedule,
        tie_break = %config.leader_tie_break,
        batch_size = config.expiry_sweep_batch_size,
        "teamhub worker started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested; waiting for in-flight runs");

    // Joining worker threads blocks; keep it off the async executor.
    let stats = tokio::task::spawn_blocking(move || {
        let stats = handle.stats();
        handle.shutdown();
        stats
    })
    .await
    .context("scheduler shutdown task failed")?;

    pool.close().await;
    tracing::info!(
        runs = stats.runs,
        completed = stats.completed,
        failed = stats.failed,
        panicked = stats.panicked,
        "teamhub worker stopped"
    );
    Ok(())
}
