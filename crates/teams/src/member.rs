use serde::{Deserialize, Serialize};

use teamhub_core::{Entity, Position, TeamId, UserId};

/// Display/contact fields. Carry no authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl MemberProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A user as a member of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: UserId,
    /// Back-reference, set by the owning team. `None` once removed.
    team_id: Option<TeamId>,
    position: Position,
    profile: MemberProfile,
}

impl Member {
    pub fn new(id: UserId, position: impl Into<Position>, profile: MemberProfile) -> Self {
        Self {
            id,
            team_id: None,
            position: position.into(),
            profile,
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.team_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn profile(&self) -> &MemberProfile {
        &self.profile
    }

    pub(crate) fn join(&mut self, team_id: TeamId) {
        self.team_id = Some(team_id);
    }

    pub(crate) fn leave(&mut self) {
        self.team_id = None;
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub(crate) fn set_profile(&mut self, profile: MemberProfile) {
        self.profile = profile;
    }
}

impl Entity for Member {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}
