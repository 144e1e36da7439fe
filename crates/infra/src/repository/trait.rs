use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use teamhub_core::TeamId;
use teamhub_teams::Team;

/// Repository operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Optimistic concurrency check failed (stale version).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Uniqueness violation (duplicate id or a second singleton-tier team).
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// The aggregate to update or delete does not exist.
    #[error("team {0} not found")]
    NotFound(TeamId),

    /// Storage is unreachable or failed unexpectedly.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored snapshot could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl RepositoryError {
    /// Conflicts and transient outages are worth retrying; the rest are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::Conflict(_) | RepositoryError::Unavailable(_))
    }
}

/// Unit-of-work boundary for the team aggregate.
///
/// ## Load depth
///
/// - `load_team_with_members` returns the team and its members only
///   (`LoadDepth::Members`). Saving such a copy leaves stored subscriptions
///   untouched.
/// - `load_team_with_everything` also returns subscriptions and devices.
///
/// ## Concurrency
///
/// Every save carries the version the team was loaded at. A save whose version
/// no longer matches storage fails with [`RepositoryError::Conflict`] and
/// writes nothing. Successful saves return the new version.
///
/// ## Implementation requirements
///
/// - `save_batch` is all-or-nothing
/// - `create` rejects a second Super or Maintenance team
/// - list queries are evaluated against persisted state on every call
pub trait TeamRepository: Send + Sync {
    /// Persist a brand-new team (version 0). Returns the stored version.
    fn create(&self, team: &Team) -> Result<u64, RepositoryError>;

    fn load_team_with_members(&self, id: TeamId) -> Result<Option<Team>, RepositoryError>;

    fn load_team_with_everything(&self, id: TeamId) -> Result<Option<Team>, RepositoryError>;

    fn save(&self, team: &Team) -> Result<u64, RepositoryError>;

    /// Save several teams in one transaction. Returns new versions in input
    /// order.
    fn save_batch(&self, teams: &[Team]) -> Result<Vec<u64>, RepositoryError>;

    /// Delete a team with its subscriptions and devices.
    fn delete(&self, id: TeamId, expected_version: u64) -> Result<(), RepositoryError>;

    /// Leaderless teams, loaded with members.
    fn list_teams_missing_leader(&self) -> Result<Vec<Team>, RepositoryError>;

    /// Teams owning at least one live subscription whose computed expiry is at
    /// or before `now`, loaded with everything.
    fn list_teams_with_expired_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Team>, RepositoryError>;
}

impl<R> TeamRepository for Arc<R>
where
    R: TeamRepository + ?Sized,
{
    fn create(&self, team: &Team) -> Result<u64, RepositoryError> {
        (**self).create(team)
    }

    fn load_team_with_members(&self, id: TeamId) -> Result<Option<Team>, RepositoryError> {
        (**self).load_team_with_members(id)
    }

    fn load_team_with_everything(&self, id: TeamId) -> Result<Option<Team>, RepositoryError> {
        (**self).load_team_with_everything(id)
    }

    fn save(&self, team: &Team) -> Result<u64, RepositoryError> {
        (**self).save(team)
    }

    fn save_batch(&self, teams: &[Team]) -> Result<Vec<u64>, RepositoryError> {
        (**self).save_batch(teams)
    }

    fn delete(&self, id: TeamId, expected_version: u64) -> Result<(), RepositoryError> {
        (**self).delete(id, expected_version)
    }

    fn list_teams_missing_leader(&self) -> Result<Vec<Team>, RepositoryError> {
        (**self).list_teams_missing_leader()
    }

    fn list_teams_with_expired_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Team>, RepositoryError> {
        (**self).list_teams_with_expired_subscriptions(now)
    }
}
