use serde::{Deserialize, Serialize};

use teamhub_core::{Position, TeamId, TeamType, UserId};

use crate::rank::{Rank, RankConfig};

/// The acting identity, as supplied by whatever authentication layer sits in
/// front of the engine.
///
/// Policies never see transport types: they receive this value explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalContext {
    user_id: Option<UserId>,
    team_id: Option<TeamId>,
    rank: Option<Rank>,
}

impl PrincipalContext {
    /// An authenticated member of `team_id` at `tier`/`position`.
    pub fn authenticated(
        user_id: UserId,
        team_id: TeamId,
        tier: TeamType,
        position: impl Into<Position>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            team_id: Some(team_id),
            rank: Some(Rank::new(tier, position)),
        }
    }

    /// No identity at all. Every policy denies it.
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            team_id: None,
            rank: None,
        }
    }

    /// Internal actor used by scheduled jobs: Super tier holding the catch-all
    /// position, bound to no user or team.
    pub fn system(config: &RankConfig) -> Self {
        Self {
            user_id: None,
            team_id: None,
            rank: Some(Rank::new(TeamType::Super, config.catch_all())),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.rank.is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.team_id
    }

    /// `None` for anonymous principals.
    pub fn rank(&self) -> Option<Rank> {
        self.rank
    }

    pub fn tier(&self) -> Option<TeamType> {
        self.rank.map(|r| r.tier)
    }

    pub fn is_super(&self) -> bool {
        self.tier() == Some(TeamType::Super)
    }

    pub fn is_user(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }

    pub fn belongs_to(&self, team_id: TeamId) -> bool {
        self.team_id == Some(team_id)
    }
}

/// Source of the acting principal for a request.
pub trait PrincipalProvider {
    fn principal(&self) -> PrincipalContext;
}

impl PrincipalProvider for PrincipalContext {
    fn principal(&self) -> PrincipalContext {
        self.clone()
    }
}
