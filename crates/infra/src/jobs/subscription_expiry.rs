//! Moves subscriptions past their computed expiry to `Expired`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use teamhub_teams::Team;

use super::scheduler::ScheduledJob;
use super::types::JobReport;
use crate::clock::Clock;
use crate::repository::TeamRepository;

pub struct SubscriptionExpiryJob<R> {
    repo: R,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl<R: TeamRepository> SubscriptionExpiryJob<R> {
    pub const NAME: &'static str = "subscription_expiry";

    pub fn new(repo: R, clock: Arc<dyn Clock>, batch_size: usize) -> Self {
        Self {
            repo,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<R: TeamRepository> ScheduledJob for SubscriptionExpiryJob<R> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, shutdown: &CancellationToken) -> anyhow::Result<JobReport> {
        let now = self.clock.now();
        let mut teams = self.repo.list_teams_with_expired_subscriptions(now)?;
        let mut report = JobReport {
            examined: teams.len(),
            ..Default::default()
        };

        // Re-check against the loaded snapshot; a team changed since the
        // query may have nothing left to expire.
        let mut expired = 0usize;
        teams.retain_mut(|team: &mut Team| {
            let ids = team.expire_due_subscriptions(now);
            expired += ids.len();
            !ids.is_empty()
        });
        report.skipped += report.examined - teams.len();

        let mut remaining = teams.len();
        for (index, batch) in teams.chunks(self.batch_size).enumerate() {
            // The in-flight batch always completes; shutdown is honoured
            // before starting the next one.
            if shutdown.is_cancelled() {
                report.interrupted = true;
                report.skipped += remaining;
                break;
            }
            remaining -= batch.len();

            match self.repo.save_batch(batch) {
                Ok(_) => {
                    debug!(batch = index, teams = batch.len(), "expiry batch committed");
                    report.repaired += batch.len();
                }
                Err(e) => {
                    warn!(
                        batch = index,
                        teams = batch.len(),
                        error = %e,
                        "expiry batch rolled back; retrying next run"
                    );
                    report.failed_batches += 1;
                    report.skipped += batch.len();
                }
            }
        }

        if report.repaired > 0 {
            info!(teams = report.repaired, subscriptions = expired, "subscriptions expired");
        }
        Ok(report)
    }
}
