//! Core job types: schedules, run reports and run history records.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use croner::Cron;
use serde::Serialize;

/// When a job fires.
#[derive(Clone)]
pub enum JobSchedule {
    /// Cron expression; a leading seconds field is optional.
    Cron { pattern: String, cron: Cron },
    /// Fixed delay between the end of one run and the start of the next.
    Every(Duration),
}

impl JobSchedule {
    pub fn cron(pattern: impl Into<String>) -> Result<Self, String> {
        let pattern = pattern.into();
        let cron = Cron::new(&pattern)
            .with_seconds_optional()
            .parse()
            .map_err(|e| format!("invalid cron expression `{pattern}`: {e}"))?;
        Ok(Self::Cron { pattern, cron })
    }

    pub fn every(interval: Duration) -> Self {
        Self::Every(interval)
    }

    /// Next fire time strictly after `after`. `None` if the expression never
    /// fires again.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            JobSchedule::Cron { cron, .. } => cron.find_next_occurrence(&after, false).ok(),
            JobSchedule::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                after.checked_add_signed(step)
            }
        }
    }
}

impl fmt::Debug for JobSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSchedule::Cron { pattern, .. } => f.debug_tuple("Cron").field(pattern).finish(),
            JobSchedule::Every(interval) => f.debug_tuple("Every").field(interval).finish(),
        }
    }
}

/// What a single run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Units of work looked at (teams).
    pub examined: usize,
    /// Units of work changed and persisted.
    pub repaired: usize,
    /// Units of work left for the next run.
    pub skipped: usize,
    pub failed_batches: usize,
    /// Shutdown was requested before all work was processed.
    pub interrupted: bool,
}

impl JobReport {
    pub fn is_clean(&self) -> bool {
        self.skipped == 0 && self.failed_batches == 0 && !self.interrupted
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobRunOutcome {
    Completed { report: JobReport },
    Failed { error: String },
    Panicked { message: String },
    /// Another instance held the job lock.
    SkippedLocked,
}

impl JobRunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobRunOutcome::Completed { .. })
    }

    pub fn report(&self) -> Option<&JobReport> {
        match self {
            JobRunOutcome::Completed { report } => Some(report),
            _ => None,
        }
    }
}

/// Record of one scheduled run.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunRecord {
    pub job: String,
    /// 1-based run counter per job.
    pub run: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: JobRunOutcome,
}

impl JobRunRecord {
    pub(crate) fn new(
        job: impl Into<String>,
        run: u64,
        started_at: DateTime<Utc>,
        outcome: JobRunOutcome,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            job: job.into(),
            run,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cron_with_seconds_fires_on_the_next_five_minute_mark() {
        let schedule = JobSchedule::cron("0 */5 * * * *").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 30).unwrap();
        assert_eq!(
            schedule.next_after(at),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap())
        );
    }

    #[test]
    fn next_after_is_strict() {
        let schedule = JobSchedule::cron("0 0 * * * *").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(at),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap())
        );
    }

    #[test]
    fn five_field_expressions_are_accepted() {
        assert!(JobSchedule::cron("*/10 * * * *").is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        let err = JobSchedule::cron("every tuesday").unwrap_err();
        assert!(err.contains("every tuesday"));
    }

    #[test]
    fn fixed_interval() {
        let schedule = JobSchedule::every(Duration::from_secs(90));
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(at),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 1, 30).unwrap())
        );
        assert_eq!(format!("{schedule:?}"), "Every(90s)");
    }

    #[test]
    fn report_cleanliness() {
        assert!(JobReport::default().is_clean());
        assert!(!JobReport { skipped: 1, ..Default::default() }.is_clean());
        assert!(!JobReport { interrupted: true, ..Default::default() }.is_clean());
    }
}
