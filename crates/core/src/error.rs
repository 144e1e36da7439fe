//! Domain error model.

use thiserror::Error;

use crate::id::{DeviceId, SubscriptionId, UserId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere. Every
/// variant is recoverable by the caller supplying different input, except
/// `NotFound` and `Conflict`, which map onto their own outcomes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A member position falls outside the team's `[min, max]` band.
    #[error("position {position} is outside the team range [{min}, {max}]")]
    PositionOutOfRange { position: i32, min: i32, max: i32 },

    /// A position band with `min > max`.
    #[error("invalid position range: min {min} is greater than max {max}")]
    InvalidRange { min: i32, max: i32 },

    /// The user is already a member of the team.
    #[error("user {0} is already a member of this team")]
    DuplicateMember(UserId),

    /// The leader candidate is not a current member of the team.
    #[error("user {0} is not a member of this team and cannot lead it")]
    InvalidLeader(UserId),

    /// The subscription already holds as many devices as its plan allows.
    #[error("subscription {subscription_id} has reached its device limit of {limit}")]
    DeviceLimitExceeded {
        subscription_id: SubscriptionId,
        limit: u32,
    },

    /// A device with the same hardware/client identifier is already registered.
    #[error("device '{unique_id}' is already registered as {existing}")]
    DuplicateDevice { unique_id: String, existing: DeviceId },

    /// A subscription status transition that the lifecycle does not allow.
    #[error("cannot transition subscription from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// The subscription is not in a state that accepts the requested change.
    #[error("subscription {subscription_id} is {status} and cannot be modified")]
    SubscriptionInactive {
        subscription_id: SubscriptionId,
        status: &'static str,
    },

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / uniqueness).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
