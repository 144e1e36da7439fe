use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use teamhub_auth::{MemberTarget, TeamTarget};
use teamhub_core::entity::{find_by_id, find_by_id_mut};
use teamhub_core::{
    AggregateRoot, DomainError, DomainResult, Position, PositionRange, SubscriptionId, TeamId,
    TeamType, UserId,
};
use teamhub_subscriptions::TeamSubscription;

use crate::member::{Member, MemberProfile};

/// How much of the aggregate a load brought into memory.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LoadDepth {
    /// Team fields and members; subscriptions left in storage.
    Members,
    /// Members, subscriptions and devices.
    #[default]
    Everything,
}

/// Team aggregate root.
///
/// Invariants:
/// - `leader_id`, if set, is the id of a current member
/// - member ids are unique
/// - members are added or moved only to positions inside `range`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    id: TeamId,
    name: String,
    description: Option<String>,
    team_type: TeamType,
    range: PositionRange,
    leader_id: Option<UserId>,
    members: Vec<Member>,
    subscriptions: Vec<TeamSubscription>,
    version: u64,
    #[serde(skip)]
    depth: LoadDepth,
}

impl Team {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        team_type: TeamType,
        range: PositionRange,
    ) -> DomainResult<Self> {
        let name = name.into();
        ensure_name(&name)?;
        Ok(Self {
            id: TeamId::new(),
            name,
            description,
            team_type,
            range,
            leader_id: None,
            members: Vec::new(),
            subscriptions: Vec::new(),
            version: 0,
            depth: LoadDepth::Everything,
        })
    }

    pub fn id_typed(&self) -> TeamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn team_type(&self) -> TeamType {
        self.team_type
    }

    pub fn range(&self) -> PositionRange {
        self.range
    }

    pub fn leader_id(&self) -> Option<UserId> {
        self.leader_id
    }

    pub fn leader(&self) -> Option<&Member> {
        self.leader_id.and_then(|id| self.member(id))
    }

    pub fn is_leaderless(&self) -> bool {
        self.leader_id.is_none()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, id: UserId) -> Option<&Member> {
        find_by_id(&self.members, id)
    }

    pub fn depth(&self) -> LoadDepth {
        self.depth
    }

    /// Owned subscriptions. Empty when loaded at [`LoadDepth::Members`].
    pub fn subscriptions(&self) -> &[TeamSubscription] {
        &self.subscriptions
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<&TeamSubscription> {
        find_by_id(&self.subscriptions, id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence hooks
    // ─────────────────────────────────────────────────────────────────────

    /// Record the version storage assigned on load or after a save.
    pub fn record_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Drop subscriptions from the in-memory copy, marking it members-only.
    pub fn into_members_only(mut self) -> Self {
        self.subscriptions.clear();
        self.depth = LoadDepth::Members;
        self
    }

    /// Put stored subscriptions back under a members-only copy so it can be
    /// written as a whole snapshot.
    pub fn with_subscriptions(mut self, subscriptions: Vec<TeamSubscription>) -> Self {
        self.subscriptions = subscriptions;
        self.depth = LoadDepth::Everything;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutators
    // ─────────────────────────────────────────────────────────────────────

    /// The outgoing leader keeps its position.
    pub fn set_leader(&mut self, candidate: UserId) -> DomainResult<()> {
        if self.member(candidate).is_none() {
            return Err(DomainError::InvalidLeader(candidate));
        }
        self.leader_id = Some(candidate);
        Ok(())
    }

    pub fn add_member(&mut self, mut member: Member) -> DomainResult<()> {
        self.range.check(member.position())?;
        if self.member(member.id()).is_some() {
            return Err(DomainError::DuplicateMember(member.id()));
        }
        member.join(self.id);
        self.members.push(member);
        Ok(())
    }

    /// Removing the leader leaves the team leaderless until a new one is set.
    pub fn remove_member(&mut self, id: UserId) -> DomainResult<Member> {
        let idx = self
            .members
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| DomainError::not_found(format!("member {id}")))?;
        let mut removed = self.members.remove(idx);
        removed.leave();
        if self.leader_id == Some(id) {
            self.leader_id = None;
        }
        Ok(removed)
    }

    /// Replace the band. Members now outside it stay; their ids are returned
    /// so the caller can surface a warning.
    pub fn update_position_range(&mut self, min: i32, max: i32) -> DomainResult<Vec<UserId>> {
        let range = PositionRange::new(min, max)?;
        self.range = range;
        Ok(self
            .members
            .iter()
            .filter(|m| !range.contains(m.position()))
            .map(|m| m.id())
            .collect())
    }

    pub fn update_member_position(&mut self, id: UserId, position: Position) -> DomainResult<()> {
        self.range.check(position)?;
        self.member_mut(id)?.set_position(position);
        Ok(())
    }

    pub fn update_member_profile(&mut self, id: UserId, profile: MemberProfile) -> DomainResult<()> {
        self.member_mut(id)?.set_profile(profile);
        Ok(())
    }

    pub fn rename(&mut self, name: impl Into<String>, description: Option<String>) -> DomainResult<()> {
        let name = name.into();
        ensure_name(&name)?;
        self.name = name;
        self.description = description;
        Ok(())
    }

    pub fn attach_subscription(&mut self, subscription: TeamSubscription) -> DomainResult<SubscriptionId> {
        self.ensure_subscriptions_loaded()?;
        if subscription.team_id() != self.id {
            return Err(DomainError::validation(format!(
                "subscription belongs to team {}, not {}",
                subscription.team_id(),
                self.id
            )));
        }
        if self.subscription(subscription.id()).is_some() {
            return Err(DomainError::conflict(format!(
                "subscription {} is already attached",
                subscription.id()
            )));
        }
        let id = subscription.id();
        self.subscriptions.push(subscription);
        Ok(id)
    }

    pub fn subscription_mut(&mut self, id: SubscriptionId) -> DomainResult<&mut TeamSubscription> {
        self.ensure_subscriptions_loaded()?;
        find_by_id_mut(&mut self.subscriptions, id)
            .ok_or_else(|| DomainError::not_found(format!("subscription {id}")))
    }

    /// Expire every live subscription whose computed expiry has passed.
    pub fn expire_due_subscriptions(&mut self, now: DateTime<Utc>) -> Vec<SubscriptionId> {
        self.subscriptions
            .iter_mut()
            .filter_map(|s| s.expire_if_due(now).then(|| s.id()))
            .collect()
    }

    pub fn has_due_subscriptions(&self, now: DateTime<Utc>) -> bool {
        self.subscriptions.iter().any(|s| s.is_due_for_expiry(now))
    }

    /// Earliest computed expiry across live subscriptions.
    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.subscriptions.iter().filter_map(|s| s.computed_expiry()).min()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Policy views
    // ─────────────────────────────────────────────────────────────────────

    pub fn as_target(&self) -> TeamTarget {
        TeamTarget {
            team_id: self.id,
            tier: self.team_type,
            range: self.range,
            leader_id: self.leader_id,
            members: self.members.iter().map(|m| self.target_of(m)).collect(),
        }
    }

    pub fn member_target(&self, id: UserId) -> Option<MemberTarget> {
        self.member(id).map(|m| self.target_of(m))
    }

    fn target_of(&self, member: &Member) -> MemberTarget {
        MemberTarget {
            user_id: member.id(),
            team_id: self.id,
            tier: self.team_type,
            position: member.position(),
        }
    }

    fn member_mut(&mut self, id: UserId) -> DomainResult<&mut Member> {
        find_by_id_mut(&mut self.members, id).ok_or_else(|| DomainError::not_found(format!("member {id}")))
    }

    fn ensure_subscriptions_loaded(&self) -> DomainResult<()> {
        if self.depth != LoadDepth::Everything {
            return Err(DomainError::validation(
                "team was loaded without subscriptions",
            ));
        }
        Ok(())
    }
}

impl AggregateRoot for Team {
    type Id = TeamId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn ensure_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("team name cannot be empty"));
    }
    Ok(())
}
