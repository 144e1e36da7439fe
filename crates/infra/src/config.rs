//! Engine configuration loaded from environment variables.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use teamhub_auth::RankConfig;
use teamhub_observability::LogFormat;

use crate::jobs::{JobSchedule, LeaderTieBreak};

pub const DEFAULT_LEADER_REPAIR_SCHEDULE: &str = "0 */5 * * * *";
pub const DEFAULT_EXPIRY_SWEEP_SCHEDULE: &str = "0 0 * * * *";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Postgres connection string. Required by the worker host only.
    pub database_url: Option<String>,

    /// Pool size (default: 10)
    pub database_max_connections: u32,

    /// Cron expression for the leader-repair job (default: every 5 minutes)
    pub leader_repair_schedule: JobSchedule,

    /// Cron expression for the subscription-expiry sweep (default: hourly)
    pub expiry_sweep_schedule: JobSchedule,

    /// Teams committed per transaction by the sweep (default: 100)
    pub expiry_sweep_batch_size: usize,

    pub leader_tie_break: LeaderTieBreak,

    /// Catch-all position (default: `i32::MAX`); the leader-repair job runs
    /// as a Super principal holding it
    pub rank: RankConfig,

    /// Longest a scheduler worker sleeps between clock checks (default: 500ms)
    pub scheduler_tick: Duration,

    pub log_format: LogFormat,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys take their defaults;
    /// present but malformed values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let schedule = |key: &str, default: &str| -> Result<JobSchedule> {
            let pattern = get(key).unwrap_or_else(|| default.to_string());
            JobSchedule::cron(pattern).map_err(|e| anyhow!(e)).with_context(|| format!("invalid {key}"))
        };

        let batch_size: usize = parse(&get, "EXPIRY_SWEEP_BATCH_SIZE", 100)?;
        if batch_size == 0 {
            anyhow::bail!("EXPIRY_SWEEP_BATCH_SIZE must be at least 1");
        }
        let max_connections: u32 = parse(&get, "DATABASE_MAX_CONNECTIONS", 10)?;
        if max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            database_max_connections: max_connections,
            leader_repair_schedule: schedule("LEADER_REPAIR_SCHEDULE", DEFAULT_LEADER_REPAIR_SCHEDULE)?,
            expiry_sweep_schedule: schedule("EXPIRY_SWEEP_SCHEDULE", DEFAULT_EXPIRY_SWEEP_SCHEDULE)?,
            expiry_sweep_batch_size: batch_size,
            leader_tie_break: parse(&get, "LEADER_TIE_BREAK", LeaderTieBreak::default())?,
            rank: RankConfig::new(parse(&get, "CATCH_ALL_POSITION", i32::MAX)?),
            scheduler_tick: Duration::from_millis(parse(&get, "SCHEDULER_TICK_MS", 500u64)?.max(1)),
            log_format: parse(&get, "LOG_FORMAT", LogFormat::default())?,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| anyhow!("invalid {key} `{raw}`: {e}")),
    }
}
