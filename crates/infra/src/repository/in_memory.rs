use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use teamhub_core::{AggregateRoot, ExpectedVersion, TeamId};
use teamhub_teams::{LoadDepth, Team};

use super::r#trait::{RepositoryError, TeamRepository};

/// In-memory team repository.
///
/// Intended for tests/dev. Teams are stored whole (with subscriptions) and
/// versioned the same way the Postgres adapter versions rows.
#[derive(Debug, Default)]
pub struct InMemoryTeamRepository {
    teams: RwLock<HashMap<TeamId, Team>>,
}

impl InMemoryTeamRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.teams.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<TeamId, Team>>, RepositoryError> {
        self.teams
            .read()
            .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<TeamId, Team>>, RepositoryError> {
        self.teams
            .write()
            .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))
    }

    /// Build the full record that replaces the stored one, checking versions.
    fn prepare(stored: &HashMap<TeamId, Team>, team: &Team) -> Result<Team, RepositoryError> {
        let id = team.id_typed();
        let current = stored.get(&id).ok_or(RepositoryError::NotFound(id))?;
        ExpectedVersion::Exact(team.version())
            .check(Some(current.version()))
            .map_err(|e| RepositoryError::Conflict(format!("team {id}: {e}")))?;

        let mut next = match team.depth() {
            LoadDepth::Everything => team.clone(),
            LoadDepth::Members => team.clone().with_subscriptions(current.subscriptions().to_vec()),
        };
        next.record_version(current.version() + 1);
        Ok(next)
    }
}

impl TeamRepository for InMemoryTeamRepository {
    fn create(&self, team: &Team) -> Result<u64, RepositoryError> {
        let id = team.id_typed();
        let mut teams = self.write()?;

        if teams.contains_key(&id) {
            return Err(RepositoryError::Duplicate(format!("team {id} already exists")));
        }
        if team.version() != 0 {
            return Err(RepositoryError::Conflict(format!(
                "team {id} was already persisted at version {}",
                team.version()
            )));
        }
        if team.team_type().is_singleton()
            && teams.values().any(|t| t.team_type() == team.team_type())
        {
            return Err(RepositoryError::Duplicate(format!(
                "a {} team already exists",
                team.team_type()
            )));
        }

        let mut stored = team.clone();
        stored.record_version(1);
        teams.insert(id, stored);
        Ok(1)
    }

    fn load_team_with_members(&self, id: TeamId) -> Result<Option<Team>, RepositoryError> {
        Ok(self.read()?.get(&id).cloned().map(Team::into_members_only))
    }

    fn load_team_with_everything(&self, id: TeamId) -> Result<Option<Team>, RepositoryError> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn save(&self, team: &Team) -> Result<u64, RepositoryError> {
        let mut teams = self.write()?;
        let next = Self::prepare(&teams, team)?;
        let version = next.version();
        teams.insert(next.id_typed(), next);
        Ok(version)
    }

    fn save_batch(&self, batch: &[Team]) -> Result<Vec<u64>, RepositoryError> {
        let mut teams = self.write()?;

        // Validate everything before touching storage.
        let mut prepared = Vec::with_capacity(batch.len());
        for team in batch {
            if prepared.iter().any(|p: &Team| p.id_typed() == team.id_typed()) {
                return Err(RepositoryError::Conflict(format!(
                    "team {} appears twice in one batch",
                    team.id_typed()
                )));
            }
            prepared.push(Self::prepare(&teams, team)?);
        }

        let versions = prepared.iter().map(|t| t.version()).collect();
        for team in prepared {
            teams.insert(team.id_typed(), team);
        }
        Ok(versions)
    }

    fn delete(&self, id: TeamId, expected_version: u64) -> Result<(), RepositoryError> {
        let mut teams = self.write()?;
        let current = teams.get(&id).ok_or(RepositoryError::NotFound(id))?;
        ExpectedVersion::Exact(expected_version)
            .check(Some(current.version()))
            .map_err(|e| RepositoryError::Conflict(format!("team {id}: {e}")))?;
        teams.remove(&id);
        Ok(())
    }

    fn list_teams_missing_leader(&self) -> Result<Vec<Team>, RepositoryError> {
        Ok(self
            .read()?
            .values()
            .filter(|t| t.is_leaderless())
            .cloned()
            .map(Team::into_members_only)
            .collect())
    }

    fn list_teams_with_expired_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Team>, RepositoryError> {
        Ok(self
            .read()?
            .values()
            .filter(|t| t.has_due_subscriptions(now))
            .cloned()
            .collect())
    }
}
