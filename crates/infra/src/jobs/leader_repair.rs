//! Gives leaderless teams a leader again.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use teamhub_auth::{Decision, PrincipalContext, RankConfig, TeamPolicy};
use teamhub_core::{AggregateRoot, UserId};
use teamhub_teams::Team;

use super::scheduler::ScheduledJob;
use super::types::JobReport;
use crate::repository::TeamRepository;

/// How the repair job picks among eligible members.
///
/// Ties go to whoever joined the team first.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LeaderTieBreak {
    /// Lowest position value.
    #[default]
    MostSenior,
    /// Highest position value.
    HighestPosition,
}

impl LeaderTieBreak {
    pub fn as_str(self) -> &'static str {
        match self {
            LeaderTieBreak::MostSenior => "most_senior",
            LeaderTieBreak::HighestPosition => "highest_position",
        }
    }

    /// Only members inside the band are eligible.
    pub fn pick(self, team: &Team) -> Option<UserId> {
        let range = team.range();
        let eligible = team.members().iter().filter(|m| range.contains(m.position()));
        let chosen = match self {
            LeaderTieBreak::MostSenior => eligible.min_by_key(|m| m.position().value()),
            LeaderTieBreak::HighestPosition => eligible.min_by_key(|m| Reverse(m.position().value())),
        };
        chosen.map(|m| m.id())
    }
}

impl fmt::Display for LeaderTieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderTieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "most_senior" => Ok(LeaderTieBreak::MostSenior),
            "highest_position" => Ok(LeaderTieBreak::HighestPosition),
            other => Err(format!(
                "unknown leader tie-break `{other}` (expected most_senior or highest_position)"
            )),
        }
    }
}

/// Runs as the system principal, so every repair passes through
/// [`TeamPolicy::can_change_leader`] like a request-side leader change.
pub struct LeaderRepairJob<R> {
    repo: R,
    tie_break: LeaderTieBreak,
    policy: TeamPolicy,
    principal: PrincipalContext,
}

impl<R: TeamRepository> LeaderRepairJob<R> {
    pub const NAME: &'static str = "leader_repair";

    pub fn new(repo: R, tie_break: LeaderTieBreak) -> Self {
        Self::with_rank(repo, tie_break, RankConfig::default())
    }

    pub fn with_rank(repo: R, tie_break: LeaderTieBreak, rank: RankConfig) -> Self {
        Self {
            repo,
            tie_break,
            policy: TeamPolicy::new(rank),
            principal: PrincipalContext::system(&rank),
        }
    }

    pub fn principal(&self) -> &PrincipalContext {
        &self.principal
    }

    /// Choose and validate a leader, then set it on `team`.
    fn repair(&self, team: &mut Team) -> Result<UserId, String> {
        let candidate = self
            .tie_break
            .pick(team)
            .ok_or_else(|| "no member inside the position band".to_string())?;
        match self.policy.can_change_leader(&self.principal, &team.as_target(), candidate) {
            Decision::Allowed(_) => {}
            Decision::Forbidden(reason) | Decision::NotFound(reason) => return Err(reason),
        }
        team.set_leader(candidate).map_err(|e| e.to_string())?;
        Ok(candidate)
    }
}

impl<R: TeamRepository> ScheduledJob for LeaderRepairJob<R> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, shutdown: &CancellationToken) -> anyhow::Result<JobReport> {
        let teams = self.repo.list_teams_missing_leader()?;
        let mut report = JobReport {
            examined: teams.len(),
            ..Default::default()
        };

        for (done, mut team) in teams.into_iter().enumerate() {
            if shutdown.is_cancelled() {
                report.interrupted = true;
                report.skipped += report.examined - done;
                break;
            }

            let team_id = team.id_typed();
            let leader = match self.repair(&mut team) {
                Ok(leader) => leader,
                Err(reason) => {
                    warn!(team_id = %team_id, reason = %reason, "leader repair skipped");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.repo.save(&team) {
                Ok(version) => {
                    info!(team_id = %team_id, leader_id = %leader, version, "leader restored");
                    report.repaired += 1;
                }
                Err(e) => {
                    warn!(
                        team_id = %team_id,
                        version = team.version(),
                        error = %e,
                        retryable = e.is_retryable(),
                        "leader repair not saved; retrying next run"
                    );
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryTeamRepository;
    use proptest::prelude::*;
    use std::sync::Arc;
    use teamhub_core::{PositionRange, TeamType};
    use teamhub_teams::{Member, MemberProfile};

    fn team_with(positions: &[i32]) -> (Team, Vec<UserId>) {
        let mut team = Team::new("t", None, TeamType::Customer, PositionRange::new(1, 10).unwrap()).unwrap();
        let ids: Vec<UserId> = positions
            .iter()
            .map(|p| {
                let id = UserId::new();
                team.add_member(Member::new(id, *p, MemberProfile::named("m"))).unwrap();
                id
            })
            .collect();
        (team, ids)
    }

    #[test]
    fn most_senior_wins_and_ties_go_to_first_joined() {
        let (team, ids) = team_with(&[5, 2, 2, 9]);
        assert_eq!(LeaderTieBreak::MostSenior.pick(&team), Some(ids[1]));
        assert_eq!(LeaderTieBreak::HighestPosition.pick(&team), Some(ids[3]));

        let (team, ids) = team_with(&[7, 7]);
        assert_eq!(LeaderTieBreak::HighestPosition.pick(&team), Some(ids[0]));
    }

    #[test]
    fn out_of_band_members_are_not_eligible() {
        let (mut team, ids) = team_with(&[1, 6]);
        team.update_position_range(5, 10).unwrap();
        assert_eq!(LeaderTieBreak::MostSenior.pick(&team), Some(ids[1]));

        team.update_position_range(8, 10).unwrap();
        assert_eq!(LeaderTieBreak::MostSenior.pick(&team), None);
    }

    proptest! {
        #[test]
        fn picked_leader_is_in_band_and_most_senior(
            positions in prop::collection::vec(1i32..=20, 0..12),
            min in 1i32..=15,
            span in 0i32..8,
        ) {
            let mut team = Team::new("t", None, TeamType::Customer, PositionRange::new(1, 20).unwrap()).unwrap();
            for p in &positions {
                team.add_member(Member::new(UserId::new(), *p, MemberProfile::named("m"))).unwrap();
            }
            team.update_position_range(min, min + span).unwrap();
            let range = team.range();

            match LeaderTieBreak::MostSenior.pick(&team) {
                Some(id) => {
                    let chosen = team.member(id).unwrap().position();
                    prop_assert!(range.contains(chosen));
                    prop_assert!(team
                        .members()
                        .iter()
                        .filter(|m| range.contains(m.position()))
                        .all(|m| m.position().value() >= chosen.value()));
                    team.set_leader(id).unwrap();
                }
                None => prop_assert!(team.members().iter().all(|m| !range.contains(m.position()))),
            }
        }
    }

    #[test]
    fn tie_break_parses() {
        assert_eq!("most_senior".parse::<LeaderTieBreak>().unwrap(), LeaderTieBreak::MostSenior);
        assert_eq!(
            " HIGHEST_POSITION ".parse::<LeaderTieBreak>().unwrap(),
            LeaderTieBreak::HighestPosition
        );
        assert!("random".parse::<LeaderTieBreak>().is_err());
    }

    #[test]
    fn repairs_leaderless_teams_and_skips_empty_ones() {
        let repo = Arc::new(InMemoryTeamRepository::new());
        let (team, ids) = team_with(&[4, 2]);
        let empty = team_with(&[]).0;
        repo.create(&team).unwrap();
        repo.create(&empty).unwrap();

        let job = LeaderRepairJob::new(repo.clone(), LeaderTieBreak::default());
        let report = job.run(&CancellationToken::new()).unwrap();

        assert_eq!(report.examined, 2);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.skipped, 1);
        let stored = repo.load_team_with_members(team.id_typed()).unwrap().unwrap();
        assert_eq!(stored.leader_id(), Some(ids[1]));
    }

    #[test]
    fn repairs_as_the_configured_system_principal() {
        let repo = Arc::new(InMemoryTeamRepository::new());
        let (team, ids) = team_with(&[6]);
        repo.create(&team).unwrap();

        let job = LeaderRepairJob::with_rank(repo.clone(), LeaderTieBreak::default(), RankConfig::new(500));
        assert!(job.principal().is_super());
        assert_eq!(job.principal().rank().map(|r| r.position.value()), Some(500));

        assert_eq!(job.run(&CancellationToken::new()).unwrap().repaired, 1);
        let stored = repo.load_team_with_members(team.id_typed()).unwrap().unwrap();
        assert_eq!(stored.leader_id(), Some(ids[0]));
    }

    #[test]
    fn cancelled_before_start_touches_nothing() {
        let repo = Arc::new(InMemoryTeamRepository::new());
        let (team, _) = team_with(&[3]);
        repo.create(&team).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let report = LeaderRepairJob::new(repo.clone(), LeaderTieBreak::default())
            .run(&token)
            .unwrap();

        assert!(report.interrupted);
        assert_eq!((report.repaired, report.skipped), (0, 1));
        assert!(repo.load_team_with_members(team.id_typed()).unwrap().unwrap().is_leaderless());
    }
}
