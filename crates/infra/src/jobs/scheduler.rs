//! Thread-per-job scheduler.
//!
//! Each registered job gets its own worker thread that sleeps in short ticks
//! until the next fire time. Every run goes through the [`JobLock`] first, so
//! one job name never runs twice at once, even across processes when the lock
//! is backed by Postgres. Errors and panics in a job body are caught and
//! recorded; the thread keeps going.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::lock::JobLock;
use super::types::{JobReport, JobRunOutcome, JobRunRecord, JobSchedule};

/// A unit of background work.
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    /// Run once. Implementations check `shutdown` between units of work and
    /// return early (with `interrupted` set) once it fires.
    fn run(&self, shutdown: &CancellationToken) -> anyhow::Result<JobReport>;
}

impl<J> ScheduledJob for Arc<J>
where
    J: ScheduledJob + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&self, shutdown: &CancellationToken) -> anyhow::Result<JobReport> {
        (**self).run(shutdown)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on how long a worker sleeps before re-checking the clock
    /// and the shutdown token.
    pub tick: Duration,
    /// Run records kept across all jobs.
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            history_limit: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub runs: u64,
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
    pub skipped_locked: u64,
}

#[derive(Debug, Default)]
struct SchedulerState {
    history: VecDeque<JobRunRecord>,
    runs: HashMap<String, u64>,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn next_run(&mut self, job: &str) -> u64 {
        let counter = self.runs.entry(job.to_string()).or_default();
        *counter += 1;
        *counter
    }

    fn record(&mut self, record: JobRunRecord, limit: usize) {
        self.stats.runs += 1;
        match record.outcome {
            JobRunOutcome::Completed { .. } => self.stats.completed += 1,
            JobRunOutcome::Failed { .. } => self.stats.failed += 1,
            JobRunOutcome::Panicked { .. } => self.stats.panicked += 1,
            JobRunOutcome::SkippedLocked => self.stats.skipped_locked += 1,
        }
        self.history.push_back(record);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

struct Entry {
    job: Arc<dyn ScheduledJob>,
    schedule: JobSchedule,
}

/// Shared by the scheduler, its worker threads and the handle.
#[derive(Clone)]
struct Runner {
    lock: Arc<dyn JobLock>,
    state: Arc<Mutex<SchedulerState>>,
    config: SchedulerConfig,
}

impl Runner {
    fn execute(&self, job: &dyn ScheduledJob, shutdown: &CancellationToken) -> JobRunRecord {
        let name = job.name().to_string();
        let started_at = Utc::now();
        let run = self.state.lock().map(|mut s| s.next_run(&name)).unwrap_or(0);

        let outcome = match self.lock.try_acquire(&name) {
            Err(e) => JobRunOutcome::Failed { error: e.to_string() },
            Ok(None) => JobRunOutcome::SkippedLocked,
            Ok(Some(_guard)) => match catch_unwind(AssertUnwindSafe(|| job.run(shutdown))) {
                Ok(Ok(report)) => JobRunOutcome::Completed { report },
                Ok(Err(e)) => JobRunOutcome::Failed { error: format!("{e:#}") },
                Err(payload) => JobRunOutcome::Panicked {
                    message: panic_message(payload.as_ref()),
                },
            },
        };

        let record = JobRunRecord::new(name, run, started_at, outcome);
        log_run(&record);
        if let Ok(mut state) = self.state.lock() {
            state.record(record.clone(), self.config.history_limit);
        }
        record
    }

    fn worker_loop(&self, entry: Entry, shutdown: CancellationToken) {
        let name = entry.job.name().to_string();
        info!(job = %name, schedule = ?entry.schedule, "job worker started");

        let mut next = entry.schedule.next_after(Utc::now());
        while !shutdown.is_cancelled() {
            let Some(at) = next else {
                warn!(job = %name, "schedule has no further occurrences");
                break;
            };

            let now = Utc::now();
            if now >= at {
                self.execute(entry.job.as_ref(), &shutdown);
                next = entry.schedule.next_after(Utc::now());
                continue;
            }

            let remaining = (at - now).to_std().unwrap_or_default();
            thread::sleep(remaining.min(self.config.tick));
        }

        info!(job = %name, "job worker stopped");
    }
}

/// Collects jobs and their schedules, then runs them on worker threads.
pub struct JobScheduler {
    runner: Runner,
    entries: Vec<Entry>,
}

impl JobScheduler {
    pub fn new(lock: impl JobLock + 'static) -> Self {
        Self {
            runner: Runner {
                lock: Arc::new(lock),
                state: Arc::new(Mutex::new(SchedulerState::default())),
                config: SchedulerConfig::default(),
            },
            entries: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.runner.config = config;
        self
    }

    pub fn register(&mut self, job: impl ScheduledJob + 'static, schedule: JobSchedule) -> &mut Self {
        debug!(job = job.name(), schedule = ?schedule, "job registered");
        self.entries.push(Entry {
            job: Arc::new(job),
            schedule,
        });
        self
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.job.name()).collect()
    }

    /// Run a registered job right now on the calling thread, through the
    /// same lock and recording path as scheduled runs.
    pub fn run_once(&self, name: &str, shutdown: &CancellationToken) -> Option<JobRunRecord> {
        let entry = self.entries.iter().find(|e| e.job.name() == name)?;
        Some(self.runner.execute(entry.job.as_ref(), shutdown))
    }

    pub fn history(&self) -> Vec<JobRunRecord> {
        history_of(&self.runner.state)
    }

    /// Start one worker thread per job.
    pub fn spawn(self) -> io::Result<SchedulerHandle> {
        let shutdown = CancellationToken::new();
        let mut joins = Vec::with_capacity(self.entries.len());

        for entry in self.entries {
            let runner = self.runner.clone();
            let token = shutdown.clone();
            let join = thread::Builder::new()
                .name(format!("job-{}", entry.job.name()))
                .spawn(move || runner.worker_loop(entry, token));

            match join {
                Ok(join) => joins.push(join),
                Err(e) => {
                    shutdown.cancel();
                    for join in joins {
                        let _ = join.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(SchedulerHandle {
            shutdown,
            joins,
            state: self.runner.state,
        })
    }
}

/// Handle to control running workers.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    joins: Vec<thread::JoinHandle<()>>,
    state: Arc<Mutex<SchedulerState>>,
}

impl SchedulerHandle {
    /// Token observed by workers and job bodies.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown and wait for in-flight runs to finish.
    pub fn shutdown(self) {
        self.shutdown.cancel();
        for join in self.joins {
            if join.join().is_err() {
                error!("job worker thread panicked outside a job run");
            }
        }
    }

    pub fn history(&self) -> Vec<JobRunRecord> {
        history_of(&self.state)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().map(|s| s.stats.clone()).unwrap_or_default()
    }
}

fn history_of(state: &Mutex<SchedulerState>) -> Vec<JobRunRecord> {
    state
        .lock()
        .map(|s| s.history.iter().cloned().collect())
        .unwrap_or_default()
}

fn log_run(record: &JobRunRecord) {
    match &record.outcome {
        JobRunOutcome::Completed { report } => info!(
            job = %record.job,
            run = record.run,
            duration_ms = record.duration_ms,
            examined = report.examined,
            repaired = report.repaired,
            skipped = report.skipped,
            failed_batches = report.failed_batches,
            interrupted = report.interrupted,
            "job run completed"
        ),
        JobRunOutcome::Failed { error } => {
            warn!(job = %record.job, run = record.run, error = %error, "job run failed")
        }
        JobRunOutcome::Panicked { message } => {
            error!(job = %record.job, run = record.run, panic = %message, "job run panicked")
        }
        JobRunOutcome::SkippedLocked => {
            debug!(job = %record.job, run = record.run, "job run skipped; lock held")
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::lock::InMemoryJobLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        runs: Arc<AtomicUsize>,
    }

    impl ScheduledJob for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self, _shutdown: &CancellationToken) -> anyhow::Result<JobReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(JobReport { examined: 1, ..Default::default() })
        }
    }

    struct Failing;

    impl ScheduledJob for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(&self, _shutdown: &CancellationToken) -> anyhow::Result<JobReport> {
            anyhow::bail!("database went away")
        }
    }

    #[test]
    fn run_once_records_history_and_run_numbers() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = JobScheduler::new(InMemoryJobLock::new());
        scheduler.register(
            Counting { name: "count", runs: runs.clone() },
            JobSchedule::every(Duration::from_secs(3600)),
        );

        let token = CancellationToken::new();
        let first = scheduler.run_once("count", &token).unwrap();
        let second = scheduler.run_once("count", &token).unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!((first.run, second.run), (1, 2));
        assert_eq!(first.outcome.report().map(|r| r.examined), Some(1));
        assert_eq!(scheduler.history().len(), 2);
        assert!(scheduler.run_once("missing", &token).is_none());
    }

    #[test]
    fn failures_are_recorded_not_propagated() {
        let mut scheduler = JobScheduler::new(InMemoryJobLock::new());
        scheduler.register(Failing, JobSchedule::every(Duration::from_secs(3600)));

        let record = scheduler.run_once("failing", &CancellationToken::new()).unwrap();
        match record.outcome {
            JobRunOutcome::Failed { error } => assert!(error.contains("database went away")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn held_lock_skips_the_run() {
        let lock = InMemoryJobLock::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = JobScheduler::new(lock.clone());
        scheduler.register(
            Counting { name: "count", runs: runs.clone() },
            JobSchedule::every(Duration::from_secs(3600)),
        );

        let _held = lock.try_acquire("count").unwrap().unwrap();
        let record = scheduler.run_once("count", &CancellationToken::new()).unwrap();
        assert_eq!(record.outcome, JobRunOutcome::SkippedLocked);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn spawned_workers_run_and_stop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = JobScheduler::new(InMemoryJobLock::new())
            .with_config(SchedulerConfig::default().with_tick(Duration::from_millis(5)));
        scheduler.register(
            Counting { name: "fast", runs: runs.clone() },
            JobSchedule::every(Duration::from_millis(10)),
        );
        assert_eq!(scheduler.job_names(), vec!["fast"]);

        let handle = scheduler.spawn().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while runs.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let stats = handle.stats();
        handle.shutdown();

        assert!(runs.load(Ordering::SeqCst) >= 2);
        assert!(stats.completed >= 2);
    }

    #[test]
    fn history_is_bounded() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = JobScheduler::new(InMemoryJobLock::new()).with_config(SchedulerConfig {
            history_limit: 3,
            ..Default::default()
        });
        scheduler.register(
            Counting { name: "count", runs },
            JobSchedule::every(Duration::from_secs(3600)),
        );

        let token = CancellationToken::new();
        for _ in 0..5 {
            scheduler.run_once("count", &token);
        }
        let history = scheduler.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].run, 3);
    }
}
