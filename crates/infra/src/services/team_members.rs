use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use teamhub_auth::{PrincipalContext, RankConfig, TeamPolicy};
use teamhub_core::{AggregateRoot, Outcome, Position, TeamId, UserId};
use teamhub_teams::{Member, MemberProfile, Team};

use super::{Exit, ServiceError, ensure_not_cancelled, finish, permit};
use crate::repository::TeamRepository;

/// Requested changes to an existing member. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberUpdate {
    pub position: Option<Position>,
    pub profile: Option<MemberProfile>,
}

/// Member and team management on behalf of a principal.
#[derive(Debug, Clone)]
pub struct TeamMemberService<R> {
    repo: R,
    policy: TeamPolicy,
}

impl<R: TeamRepository> TeamMemberService<R> {
    pub fn new(repo: R, rank: RankConfig) -> Self {
        Self {
            repo,
            policy: TeamPolicy::new(rank),
        }
    }

    pub fn policy(&self) -> &TeamPolicy {
        &self.policy
    }

    #[instrument(skip_all, fields(team_id = %team_id, user_id = %member.id()))]
    pub fn add_member(
        &self,
        principal: &PrincipalContext,
        team_id: TeamId,
        member: Member,
        cancel: &CancellationToken,
    ) -> Result<Outcome<()>, ServiceError> {
        finish((|| -> Result<(), Exit> {
            let mut team = self.load(team_id)?;
            permit(
                self.policy
                    .can_add_team_member(principal, &team.as_target(), member.position()),
                "add_member",
            )?;
            team.add_member(member)?;
            self.commit(&team, cancel)
        })())
    }

    #[instrument(skip_all, fields(team_id = %team_id, candidate = %candidate))]
    pub fn change_leader(
        &self,
        principal: &PrincipalContext,
        team_id: TeamId,
        candidate: UserId,
        cancel: &CancellationToken,
    ) -> Result<Outcome<()>, ServiceError> {
        finish((|| -> Result<(), Exit> {
            let mut team = self.load(team_id)?;
            let candidate = permit(
                self.policy
                    .can_change_leader(principal, &team.as_target(), candidate),
                "change_leader",
            )?;
            team.set_leader(candidate)?;
            self.commit(&team, cancel)
        })())
    }

    /// Removing the leader leaves the team leaderless; the leader-repair job
    /// picks a successor on its next run.
    #[instrument(skip_all, fields(team_id = %team_id, user_id = %user_id))]
    pub fn delete_member(
        &self,
        principal: &PrincipalContext,
        team_id: TeamId,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<Outcome<Member>, ServiceError> {
        finish((|| -> Result<Member, Exit> {
            let mut team = self.load(team_id)?;
            let target = member_target(&team, user_id)?;
            permit(self.policy.can_delete_member(principal, &target), "delete_member")?;

            let removed = team.remove_member(user_id)?;
            self.commit(&team, cancel)?;

            if team.members().is_empty() {
                warn!(team_id = %team_id, "team has no members left and cannot be given a leader");
            } else if team.is_leaderless() {
                info!(team_id = %team_id, "leader removed; awaiting repair");
            }
            Ok(removed)
        })())
    }

    #[instrument(skip_all, fields(team_id = %team_id, user_id = %user_id))]
    pub fn update_member(
        &self,
        principal: &PrincipalContext,
        team_id: TeamId,
        user_id: UserId,
        update: MemberUpdate,
        cancel: &CancellationToken,
    ) -> Result<Outcome<()>, ServiceError> {
        finish((|| -> Result<(), Exit> {
            let mut team = self.load(team_id)?;
            let target = member_target(&team, user_id)?;
            permit(self.policy.can_update_member(principal, &target), "update_member")?;

            if let Some(position) = update.position {
                permit(
                    self.policy.can_change_position(principal, &target, position),
                    "update_member",
                )?;
                team.update_member_position(user_id, position)?;
            }
            if let Some(profile) = update.profile {
                team.update_member_profile(user_id, profile)?;
            }
            self.commit(&team, cancel)
        })())
    }

    pub fn view_member(
        &self,
        principal: &PrincipalContext,
        team_id: TeamId,
        user_id: UserId,
    ) -> Result<Outcome<Member>, ServiceError> {
        finish((|| -> Result<Member, Exit> {
            let team = self.load(team_id)?;
            let target = member_target(&team, user_id)?;
            permit(self.policy.can_view_team_member(principal, &target), "view_member")?;
            team.member(user_id)
                .cloned()
                .ok_or_else(|| Exit::NotFound(format!("member {user_id}")))
        })())
    }

    /// Returns the ids of members left outside the new band.
    #[instrument(skip_all, fields(team_id = %team_id, min, max))]
    pub fn update_position_range(
        &self,
        principal: &PrincipalContext,
        team_id: TeamId,
        min: i32,
        max: i32,
        cancel: &CancellationToken,
    ) -> Result<Outcome<Vec<UserId>>, ServiceError> {
        finish((|| -> Result<Vec<UserId>, Exit> {
            let mut team = self.load(team_id)?;
            permit(
                self.policy.can_manage_team(principal, &team.as_target()),
                "update_position_range",
            )?;
            let outside = team.update_position_range(min, max)?;
            self.commit(&team, cancel)?;

            if !outside.is_empty() {
                warn!(
                    team_id = %team_id,
                    count = outside.len(),
                    min,
                    max,
                    "members left outside the new position range"
                );
            }
            Ok(outside)
        })())
    }

    pub fn rename_team(
        &self,
        principal: &PrincipalContext,
        team_id: TeamId,
        name: String,
        description: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Outcome<()>, ServiceError> {
        finish((|| -> Result<(), Exit> {
            let mut team = self.load(team_id)?;
            permit(self.policy.can_manage_team(principal, &team.as_target()), "rename_team")?;
            team.rename(name, description)?;
            self.commit(&team, cancel)
        })())
    }

    /// Cascades to subscriptions and devices.
    #[instrument(skip_all, fields(team_id = %team_id))]
    pub fn delete_team(
        &self,
        principal: &PrincipalContext,
        team_id: TeamId,
        cancel: &CancellationToken,
    ) -> Result<Outcome<()>, ServiceError> {
        finish((|| -> Result<(), Exit> {
            let team = self.load(team_id)?;
            permit(self.policy.can_delete_team(principal, &team.as_target()), "delete_team")?;
            ensure_not_cancelled(cancel)?;
            self.repo.delete(team_id, team.version())?;
            info!(team_id = %team_id, members = team.members().len(), "team deleted");
            Ok(())
        })())
    }

    /// Member operations never need subscriptions.
    fn load(&self, team_id: TeamId) -> Result<Team, Exit> {
        self.repo
            .load_team_with_members(team_id)?
            .ok_or_else(|| Exit::NotFound(format!("team {team_id}")))
    }

    fn commit(&self, team: &Team, cancel: &CancellationToken) -> Result<(), Exit> {
        ensure_not_cancelled(cancel)?;
        self.repo.save(team)?;
        Ok(())
    }
}

fn member_target(team: &Team, user_id: UserId) -> Result<teamhub_auth::MemberTarget, Exit> {
    team.member_target(user_id)
        .ok_or_else(|| Exit::NotFound(format!("member {user_id} in team {}", team.id_typed())))
}
