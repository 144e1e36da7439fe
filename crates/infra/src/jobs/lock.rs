//! At-most-one-instance locks for scheduled jobs.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use sqlx::PgPool;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum JobLockError {
    #[error("job lock unavailable: {0}")]
    Unavailable(String),
}

/// Held while a job instance runs. Dropping it releases the lock.
pub struct JobLockGuard {
    name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl JobLockGuard {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for JobLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobLockGuard").field("name", &self.name).finish()
    }
}

pub trait JobLock: Send + Sync {
    /// `Ok(None)` when another instance already holds `name`.
    fn try_acquire(&self, name: &str) -> Result<Option<JobLockGuard>, JobLockError>;
}

impl<L> JobLock for Arc<L>
where
    L: JobLock + ?Sized,
{
    fn try_acquire(&self, name: &str) -> Result<Option<JobLockGuard>, JobLockError> {
        (**self).try_acquire(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process
// ─────────────────────────────────────────────────────────────────────────────

/// Lock scoped to the current process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryJobLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.held.lock().map(|h| h.contains(name)).unwrap_or(false)
    }
}

impl JobLock for InMemoryJobLock {
    fn try_acquire(&self, name: &str) -> Result<Option<JobLockGuard>, JobLockError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| JobLockError::Unavailable("lock poisoned".to_string()))?;
        if !held.insert(name.to_string()) {
            return Ok(None);
        }

        let set = self.held.clone();
        let key = name.to_string();
        Ok(Some(JobLockGuard::new(name, move || {
            if let Ok(mut held) = set.lock() {
                held.remove(&key);
            }
        })))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Postgres advisory lock
// ─────────────────────────────────────────────────────────────────────────────

/// Session-level advisory lock keyed by `hashtext(job name)`.
///
/// The guard pins the pooled connection that took the lock until it is
/// dropped. Must be used from threads outside the Tokio runtime.
#[derive(Debug, Clone)]
pub struct PgAdvisoryJobLock {
    pool: PgPool,
    handle: Handle,
}

impl PgAdvisoryJobLock {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }
}

impl JobLock for PgAdvisoryJobLock {
    fn try_acquire(&self, name: &str) -> Result<Option<JobLockGuard>, JobLockError> {
        let (conn, locked) = self.handle.block_on(async {
            let mut conn = self.pool.acquire().await?;
            let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1)::bigint)")
                .bind(name)
                .fetch_one(&mut *conn)
                .await?;
            Ok::<_, sqlx::Error>((conn, locked))
        })
        .map_err(|e| JobLockError::Unavailable(e.to_string()))?;

        if !locked {
            debug!(job = name, "advisory lock held elsewhere");
            return Ok(None);
        }

        let handle = self.handle.clone();
        let key = name.to_string();
        Ok(Some(JobLockGuard::new(name, move || {
            let mut conn = conn;
            let result = handle.block_on(async {
                sqlx::query("SELECT pg_advisory_unlock(hashtext($1)::bigint)")
                    .bind(&key)
                    .execute(&mut *conn)
                    .await
            });
            if let Err(e) = result {
                // Closing the session releases the lock anyway.
                warn!(job = %key, error = %e, "failed to release advisory lock");
                conn.close_on_drop();
            }
        })))
    }
}
