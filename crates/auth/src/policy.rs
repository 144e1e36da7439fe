//! Authorization policies: pure decisions over a principal and loaded targets.
//!
//! - No IO
//! - No panics
//! - No mutation (callers apply the decision through aggregate mutators)

use serde::Serialize;

use teamhub_core::{Outcome, Position, PositionRange, TeamId, TeamType, UserId};

use crate::principal::PrincipalContext;
use crate::rank::{Rank, RankConfig, RankOrdering};

/// Tri-state policy result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "value", rename_all = "snake_case")]
pub enum Decision<T> {
    Allowed(T),
    Forbidden(String),
    NotFound(String),
}

impl<T> Decision<T> {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decision<U> {
        match self {
            Decision::Allowed(v) => Decision::Allowed(f(v)),
            Decision::Forbidden(r) => Decision::Forbidden(r),
            Decision::NotFound(r) => Decision::NotFound(r),
        }
    }

    fn forbid(reason: impl Into<String>) -> Self {
        Decision::Forbidden(reason.into())
    }
}

impl<T> From<Decision<T>> for Outcome<T> {
    fn from(value: Decision<T>) -> Self {
        match value {
            Decision::Allowed(v) => Outcome::Success(v),
            Decision::Forbidden(r) => Outcome::Forbidden(r),
            Decision::NotFound(r) => Outcome::NotFound(r),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Targets
// ─────────────────────────────────────────────────────────────────────────────

/// A member as seen by policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberTarget {
    pub user_id: UserId,
    pub team_id: TeamId,
    pub tier: TeamType,
    pub position: Position,
}

impl MemberTarget {
    pub fn rank(&self) -> Rank {
        Rank::new(self.tier, self.position)
    }
}

/// A team as seen by policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamTarget {
    pub team_id: TeamId,
    pub tier: TeamType,
    pub range: PositionRange,
    pub leader_id: Option<UserId>,
    pub members: Vec<MemberTarget>,
}

impl TeamTarget {
    pub fn member(&self, user_id: UserId) -> Option<&MemberTarget> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn leader(&self) -> Option<&MemberTarget> {
        self.leader_id.and_then(|id| self.member(id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policies
// ─────────────────────────────────────────────────────────────────────────────

/// Stateless policy set bound to a ranking configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamPolicy {
    rank: RankConfig,
}

impl TeamPolicy {
    pub fn new(rank: RankConfig) -> Self {
        Self { rank }
    }

    pub fn rank_config(&self) -> &RankConfig {
        &self.rank
    }

    /// Super: unrestricted. A principal whose tier dominates the team's tier
    /// passes on tier alone. Same-tier principals must outrank the proposed
    /// position, which must sit inside the team's band.
    pub fn can_add_team_member(
        &self,
        principal: &PrincipalContext,
        team: &TeamTarget,
        proposed: Position,
    ) -> Decision<()> {
        let rank = match self.reach(principal, team.team_id) {
            Ok(rank) => rank,
            Err(d) => return d,
        };
        if rank.tier == TeamType::Super || rank.tier.dominates(team.tier) {
            return Decision::Allowed(());
        }
        if !team.range.contains(proposed) {
            return Decision::forbid(format!(
                "position {proposed} is outside the team band [{}, {}]",
                team.range.min(),
                team.range.max()
            ));
        }
        if self.rank.outranks(rank, Rank::new(team.tier, proposed)) {
            Decision::Allowed(())
        } else {
            Decision::forbid(format!("cannot add a member at position {proposed}"))
        }
    }

    /// Principal must be, or outrank, the current leader. Leaderless teams
    /// require the principal to outrank the candidate instead.
    pub fn can_change_leader(
        &self,
        principal: &PrincipalContext,
        team: &TeamTarget,
        candidate: UserId,
    ) -> Decision<UserId> {
        let rank = match self.reach(principal, team.team_id) {
            Ok(rank) => rank,
            Err(d) => return d,
        };
        let candidate_target = match self.validate_leader_candidate(team, candidate) {
            Decision::Allowed(m) => m,
            Decision::Forbidden(r) => return Decision::Forbidden(r),
            Decision::NotFound(r) => return Decision::NotFound(r),
        };
        if rank.tier == TeamType::Super {
            return Decision::Allowed(candidate);
        }

        match team.leader() {
            Some(leader) if principal.is_user(leader.user_id) => Decision::Allowed(candidate),
            Some(leader) if self.rank.outranks(rank, leader.rank()) => {
                Decision::Allowed(candidate)
            }
            Some(_) => Decision::forbid("principal does not outrank the current leader"),
            None if self.rank.outranks(rank, candidate_target.rank()) => {
                Decision::Allowed(candidate)
            }
            None => Decision::forbid("principal does not outrank the leader candidate"),
        }
    }

    /// Deleting the last member is not blocked here; the leader-repair job
    /// deals with the resulting state.
    pub fn can_delete_member(
        &self,
        principal: &PrincipalContext,
        target: &MemberTarget,
    ) -> Decision<()> {
        let rank = match self.reach(principal, target.team_id) {
            Ok(rank) => rank,
            Err(d) => return d,
        };
        self.require_higher(rank, target.rank(), "delete")
    }

    pub fn can_update_member(
        &self,
        principal: &PrincipalContext,
        target: &MemberTarget,
    ) -> Decision<()> {
        let Some(rank) = principal.rank() else {
            return Decision::forbid("unauthenticated");
        };
        if principal.is_user(target.user_id) {
            return Decision::Allowed(());
        }
        if let Err(d) = self.reach(principal, target.team_id) {
            return d;
        }
        self.require_higher(rank, target.rank(), "update")
    }

    /// Position changes on top of [`Self::can_update_member`]: no
    /// self-escalation below Super, and the principal must outrank the new
    /// position when moving someone else.
    pub fn can_change_position(
        &self,
        principal: &PrincipalContext,
        target: &MemberTarget,
        new_position: Position,
    ) -> Decision<()> {
        let rank = match self.can_update_member(principal, target) {
            Decision::Allowed(()) => match principal.rank() {
                Some(rank) => rank,
                None => return Decision::forbid("unauthenticated"),
            },
            other => return other,
        };
        if rank.tier == TeamType::Super {
            return Decision::Allowed(());
        }
        if principal.is_user(target.user_id) {
            return if new_position.is_senior_to(target.position) {
                Decision::forbid("members cannot promote themselves")
            } else {
                Decision::Allowed(())
            };
        }
        self.require_higher(rank, Rank::new(target.tier, new_position), "assign position to")
    }

    pub fn can_view_team_member(
        &self,
        principal: &PrincipalContext,
        target: &MemberTarget,
    ) -> Decision<()> {
        if principal.is_authenticated() && principal.belongs_to(target.team_id) {
            return Decision::Allowed(());
        }
        let rank = match self.reach(principal, target.team_id) {
            Ok(rank) => rank,
            Err(d) => return d,
        };
        self.require_higher(rank, target.rank(), "view")
    }

    /// Range updates and other team-wide changes.
    pub fn can_manage_team(&self, principal: &PrincipalContext, team: &TeamTarget) -> Decision<()> {
        match principal.tier() {
            None => Decision::forbid("unauthenticated"),
            Some(TeamType::Super) => Decision::Allowed(()),
            Some(tier) if tier.dominates(team.tier) => Decision::Allowed(()),
            Some(tier) => Decision::forbid(format!(
                "{tier} principals cannot manage {} teams",
                team.tier
            )),
        }
    }

    pub fn can_delete_team(&self, principal: &PrincipalContext, team: &TeamTarget) -> Decision<()> {
        if team.tier.is_singleton() {
            return Decision::forbid(format!("the {} team cannot be deleted", team.tier));
        }
        self.can_manage_team(principal, team)
    }

    /// Candidate is a member and sits inside the band. Shared with the
    /// leader-repair job.
    pub fn validate_leader_candidate(
        &self,
        team: &TeamTarget,
        candidate: UserId,
    ) -> Decision<MemberTarget> {
        validate_leader_candidate(team, candidate)
    }

    /// Authenticated rank, plus the tenant boundary: Customer principals only
    /// reach their own team.
    fn reach<T>(&self, principal: &PrincipalContext, team_id: TeamId) -> Result<Rank, Decision<T>> {
        let Some(rank) = principal.rank() else {
            return Err(Decision::forbid("unauthenticated"));
        };
        if rank.tier == TeamType::Customer && !principal.belongs_to(team_id) {
            return Err(Decision::forbid("customer principals act only within their own team"));
        }
        Ok(rank)
    }

    fn require_higher(&self, principal: Rank, target: Rank, action: &str) -> Decision<()> {
        match self.rank.compare(principal, target) {
            RankOrdering::Higher => Decision::Allowed(()),
            RankOrdering::Equal | RankOrdering::Lower => Decision::forbid(format!(
                "principal does not outrank the member it tries to {action}"
            )),
        }
    }
}

/// Free-function form of [`TeamPolicy::validate_leader_candidate`].
pub fn validate_leader_candidate(team: &TeamTarget, candidate: UserId) -> Decision<MemberTarget> {
    let Some(member) = team.member(candidate) else {
        return Decision::NotFound(format!("user {candidate} is not a member of team {}", team.team_id));
    };
    if !team.range.contains(member.position) {
        return Decision::forbid(format!(
            "candidate position {} is outside the team band [{}, {}]",
            member.position,
            team.range.min(),
            team.range.max()
        ));
    }
    Decision::Allowed(*member)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn team(tier: TeamType, positions: &[i32]) -> TeamTarget {
        let team_id = TeamId::new();
        let members: Vec<MemberTarget> = positions
            .iter()
            .map(|p| MemberTarget {
                user_id: UserId::new(),
                team_id,
                tier,
                position: Position::new(*p),
            })
            .collect();
        TeamTarget {
            team_id,
            tier,
            range: PositionRange::new(1, 10).unwrap(),
            leader_id: members.first().map(|m| m.user_id),
            members,
        }
    }

    fn principal_in(team: &TeamTarget, position: i32) -> PrincipalContext {
        PrincipalContext::authenticated(UserId::new(), team.team_id, team.tier, position)
    }

    fn outsider(tier: TeamType, position: i32) -> PrincipalContext {
        PrincipalContext::authenticated(UserId::new(), TeamId::new(), tier, position)
    }

    #[test]
    fn customer_cannot_add_someone_more_senior_than_themselves() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[1, 5]);
        let p = principal_in(&t, 5);

        let decision = policy.can_add_team_member(&p, &t, Position::new(3));
        assert!(matches!(decision, Decision::Forbidden(_)));
        assert!(policy.can_add_team_member(&p, &t, Position::new(7)).is_allowed());
    }

    #[test]
    fn same_tier_add_must_stay_inside_band() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[1]);
        let p = principal_in(&t, 1);
        assert!(!policy.can_add_team_member(&p, &t, Position::new(11)).is_allowed());
    }

    #[test]
    fn super_may_change_leader_to_any_member() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Maintenance, &[1, 2, 3]);
        let p = outsider(TeamType::Super, 900);
        for m in &t.members {
            assert_eq!(
                policy.can_change_leader(&p, &t, m.user_id),
                Decision::Allowed(m.user_id)
            );
        }
    }

    #[test]
    fn change_leader_to_non_member_is_not_found() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[1]);
        let p = outsider(TeamType::Super, 1);
        assert!(matches!(
            policy.can_change_leader(&p, &t, UserId::new()),
            Decision::NotFound(_)
        ));
    }

    #[test]
    fn current_leader_may_hand_over_leadership() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[4, 2]);
        let leader = t.members[0];
        let p = PrincipalContext::authenticated(leader.user_id, t.team_id, t.tier, 4);
        assert!(policy.can_change_leader(&p, &t, t.members[1].user_id).is_allowed());

        let junior = principal_in(&t, 6);
        assert!(!policy.can_change_leader(&junior, &t, t.members[1].user_id).is_allowed());
    }

    #[test]
    fn leaderless_team_requires_outranking_the_candidate() {
        let policy = TeamPolicy::default();
        let mut t = team(TeamType::Customer, &[3]);
        t.leader_id = None;
        let candidate = t.members[0].user_id;
        assert!(policy.can_change_leader(&principal_in(&t, 2), &t, candidate).is_allowed());
        assert!(!policy.can_change_leader(&principal_in(&t, 3), &t, candidate).is_allowed());
    }

    #[test]
    fn self_update_is_unconditional_but_self_promotion_is_not() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[5]);
        let me = t.members[0];
        let p = PrincipalContext::authenticated(me.user_id, t.team_id, t.tier, 5);

        assert!(policy.can_update_member(&p, &me).is_allowed());
        assert!(!policy.can_change_position(&p, &me, Position::new(2)).is_allowed());
        assert!(policy.can_change_position(&p, &me, Position::new(8)).is_allowed());
    }

    #[test]
    fn promoting_someone_above_yourself_is_forbidden() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[6]);
        let p = principal_in(&t, 4);
        let target = t.members[0];
        assert!(policy.can_change_position(&p, &target, Position::new(5)).is_allowed());
        assert!(!policy.can_change_position(&p, &target, Position::new(4)).is_allowed());
    }

    #[test]
    fn customer_cannot_reach_other_customer_teams() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[9]);
        let p = outsider(TeamType::Customer, 1);
        assert!(!policy.can_delete_member(&p, &t.members[0]).is_allowed());
        assert!(!policy.can_view_team_member(&p, &t.members[0]).is_allowed());
    }

    #[test]
    fn senior_customer_cannot_view_juniors_in_another_customer_team() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[9]);
        let p = outsider(TeamType::Customer, 1);
        assert!(matches!(
            policy.can_view_team_member(&p, &t.members[0]),
            Decision::Forbidden(_)
        ));

        let ops = outsider(TeamType::Maintenance, 50);
        assert!(policy.can_view_team_member(&ops, &t.members[0]).is_allowed());
    }

    #[test]
    fn teammates_can_view_each_other_regardless_of_rank() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[1]);
        let p = principal_in(&t, 9);
        assert!(policy.can_view_team_member(&p, &t.members[0]).is_allowed());
    }

    #[test]
    fn anonymous_is_always_forbidden() {
        let policy = TeamPolicy::default();
        let t = team(TeamType::Customer, &[5]);
        let anon = PrincipalContext::anonymous();
        let m = &t.members[0];
        assert!(matches!(policy.can_view_team_member(&anon, m), Decision::Forbidden(_)));
        assert!(matches!(policy.can_update_member(&anon, m), Decision::Forbidden(_)));
        assert!(matches!(policy.can_delete_member(&anon, m), Decision::Forbidden(_)));
        assert!(matches!(
            policy.can_add_team_member(&anon, &t, Position::new(5)),
            Decision::Forbidden(_)
        ));
        assert!(matches!(policy.can_manage_team(&anon, &t), Decision::Forbidden(_)));
    }

    #[test]
    fn singleton_teams_cannot_be_deleted() {
        let policy = TeamPolicy::default();
        let root = outsider(TeamType::Super, 1);
        assert!(!policy.can_delete_team(&root, &team(TeamType::Maintenance, &[])).is_allowed());
        assert!(!policy.can_delete_team(&root, &team(TeamType::Super, &[])).is_allowed());
        assert!(policy.can_delete_team(&root, &team(TeamType::Customer, &[])).is_allowed());

        let ops = outsider(TeamType::Maintenance, 1);
        assert!(policy.can_manage_team(&ops, &team(TeamType::Customer, &[])).is_allowed());
        assert!(!policy.can_manage_team(&ops, &team(TeamType::Maintenance, &[])).is_allowed());
    }

    #[test]
    fn candidate_outside_band_fails_validation() {
        let mut t = team(TeamType::Customer, &[5]);
        t.range = PositionRange::new(6, 10).unwrap();
        assert!(matches!(
            validate_leader_candidate(&t, t.members[0].user_id),
            Decision::Forbidden(_)
        ));
    }

    #[test]
    fn decision_maps_onto_outcome() {
        let o: Outcome<()> = Decision::<()>::NotFound("x".into()).into();
        assert_eq!(o, Outcome::NotFound("x".into()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn maintenance_always_acts_on_customers(p in any::<i32>(), target in any::<i32>()) {
            let policy = TeamPolicy::default();
            let t = team(TeamType::Customer, &[target]);
            let ops = outsider(TeamType::Maintenance, p);
            let member = t.members[0];

            prop_assert!(policy.can_add_team_member(&ops, &t, Position::new(target)).is_allowed());
            prop_assert!(policy.can_update_member(&ops, &member).is_allowed());
            prop_assert!(policy.can_delete_member(&ops, &member).is_allowed());
        }
    }
}
