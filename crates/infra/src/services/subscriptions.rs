use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use teamhub_core::{DeviceId, DomainResult, Outcome, SubscriptionId, TeamId};
use teamhub_subscriptions::{SubscriptionPlan, SubscriptionStatus, TeamSubscription};
use teamhub_teams::Team;

use super::{Exit, ServiceError, ensure_not_cancelled, finish};
use crate::clock::Clock;
use crate::repository::TeamRepository;

/// Builds services scoped to one `(team, subscription)` pair.
#[derive(Clone)]
pub struct SubscriptionServiceFactory<R> {
    repo: R,
    clock: Arc<dyn Clock>,
}

impl<R: TeamRepository + Clone> SubscriptionServiceFactory<R> {
    pub fn new(repo: R, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub fn for_subscription(&self, team_id: TeamId, subscription_id: SubscriptionId) -> SubscriptionService<R> {
        SubscriptionService {
            repo: self.repo.clone(),
            clock: self.clock.clone(),
            team_id,
            subscription_id,
        }
    }

    /// Open a trial subscription on `plan` for `team_id`, starting now.
    #[instrument(skip_all, fields(team_id = %team_id, plan = %plan.name))]
    pub fn start_trial(
        &self,
        team_id: TeamId,
        plan: SubscriptionPlan,
        trial_length: Duration,
        cancel: &CancellationToken,
    ) -> Result<Outcome<SubscriptionId>, ServiceError> {
        finish((|| -> Result<SubscriptionId, Exit> {
            let mut team = load_everything(&self.repo, team_id)?;
            let now = self.clock.now();
            let subscription = TeamSubscription::start_trial(team_id, plan, now, now + trial_length)?;
            let id = team.attach_subscription(subscription)?;
            ensure_not_cancelled(cancel)?;
            self.repo.save(&team)?;
            info!(team_id = %team_id, subscription_id = %id, "trial started");
            Ok(id)
        })())
    }
}

/// Device and billing operations on a single subscription.
///
/// Every mutating call is one load and at most one save.
pub struct SubscriptionService<R> {
    repo: R,
    clock: Arc<dyn Clock>,
    team_id: TeamId,
    subscription_id: SubscriptionId,
}

impl<R: TeamRepository> SubscriptionService<R> {
    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn add_device(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        unique_id: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<Outcome<DeviceId>, ServiceError> {
        let (name, unique_id) = (name.into(), unique_id.into());
        self.mutate(cancel, |s, _| s.add_device(name, description, unique_id))
    }

    /// Idempotent: `Success(false)` when the device was not registered.
    pub fn remove_device(
        &self,
        device_id: DeviceId,
        cancel: &CancellationToken,
    ) -> Result<Outcome<bool>, ServiceError> {
        self.mutate(cancel, |s, _| s.remove_device(device_id))
    }

    pub fn update_device(
        &self,
        device_id: DeviceId,
        name: impl Into<String>,
        description: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Outcome<()>, ServiceError> {
        let name = name.into();
        self.mutate(cancel, |s, _| s.update_device(device_id, name, description))
    }

    /// Returns the status after the payment (a trial becomes active).
    pub fn record_payment(
        &self,
        amount: u64,
        paid_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Outcome<SubscriptionStatus>, ServiceError> {
        self.mutate(cancel, |s, _| {
            s.record_payment(amount, paid_at)?;
            Ok(s.status())
        })
    }

    pub fn set_end_date(
        &self,
        end_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<Outcome<()>, ServiceError> {
        self.mutate(cancel, |s, _| s.set_end_date(end_date))
    }

    pub fn set_discount(&self, percent: u8, cancel: &CancellationToken) -> Result<Outcome<()>, ServiceError> {
        self.mutate(cancel, |s, _| s.set_discount(percent))
    }

    pub fn deactivate(&self, cancel: &CancellationToken) -> Result<Outcome<()>, ServiceError> {
        self.mutate(cancel, |s, _| {
            s.deactivate();
            Ok(())
        })
    }

    pub fn authorizes_device(&self, unique_id: &str) -> Result<Outcome<bool>, ServiceError> {
        let now = self.clock.now();
        self.read(|s| s.authorizes_device(unique_id, now))
    }

    pub fn details(&self) -> Result<Outcome<TeamSubscription>, ServiceError> {
        self.read(TeamSubscription::clone)
    }

    fn read<T>(&self, f: impl FnOnce(&TeamSubscription) -> T) -> Result<Outcome<T>, ServiceError> {
        finish((|| -> Result<T, Exit> {
            let team = load_everything(&self.repo, self.team_id)?;
            let subscription = team
                .subscription(self.subscription_id)
                .ok_or_else(|| Exit::NotFound(format!("subscription {}", self.subscription_id)))?;
            Ok(f(subscription))
        })())
    }

    /// Load, apply `f`, save if anything changed.
    #[instrument(
        skip(self, cancel, f),
        fields(team_id = %self.team_id, subscription_id = %self.subscription_id)
    )]
    fn mutate<T>(
        &self,
        cancel: &CancellationToken,
        f: impl FnOnce(&mut TeamSubscription, DateTime<Utc>) -> DomainResult<T>,
    ) -> Result<Outcome<T>, ServiceError> {
        finish((|| -> Result<T, Exit> {
            let mut team = load_everything(&self.repo, self.team_id)?;
            let now = self.clock.now();
            let subscription = team.subscription_mut(self.subscription_id)?;
            let before = subscription.clone();
            let value = f(subscription, now)?;
            let changed = *subscription != before;

            if changed {
                ensure_not_cancelled(cancel)?;
                self.repo.save(&team)?;
            }
            Ok(value)
        })())
    }
}

fn load_everything<R: TeamRepository>(repo: &R, team_id: TeamId) -> Result<Team, Exit> {
    repo.load_team_with_everything(team_id)?
        .ok_or_else(|| Exit::NotFound(format!("team {team_id}")))
}
