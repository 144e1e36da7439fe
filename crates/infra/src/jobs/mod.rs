//! Background consistency jobs.
//!
//! ## Components
//!
//! - `JobScheduler`: one worker thread per job, cron or fixed-interval
//!   schedules, bounded run history
//! - `JobLock`: at most one running instance per job name (in-process or
//!   Postgres advisory lock)
//! - `LeaderRepairJob`: picks a leader for leaderless teams
//! - `SubscriptionExpiryJob`: expires subscriptions past their computed
//!   expiry, one transactional save per batch
//!
//! Jobs read candidates from persisted state on every run, so a skipped or
//! failed unit of work is simply picked up again next time.

pub mod leader_repair;
pub mod lock;
pub mod scheduler;
pub mod subscription_expiry;
pub mod types;

pub use leader_repair::{LeaderRepairJob, LeaderTieBreak};
pub use lock::{InMemoryJobLock, JobLock, JobLockError, JobLockGuard, PgAdvisoryJobLock};
pub use scheduler::{JobScheduler, ScheduledJob, SchedulerConfig, SchedulerHandle, SchedulerStats};
pub use subscription_expiry::SubscriptionExpiryJob;
pub use types::{JobReport, JobRunOutcome, JobRunRecord, JobSchedule};
