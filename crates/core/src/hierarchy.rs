//! Team tiers, member positions and the position band a team allows.
//!
//! Convention: a **lower** position value is **more senior**. Tiers dominate
//! positions: any Super-tier rank outranks any Maintenance-tier rank, which in
//! turn outranks any Customer-tier rank.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Team classification. Immutable after team creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamType {
    /// Platform owners. Exactly one per deployment.
    Super,
    /// Operators/support staff. Exactly one per deployment.
    Maintenance,
    /// Tenants. Unlimited.
    Customer,
}

impl TeamType {
    /// Numeric dominance level (higher dominates lower).
    pub fn level(self) -> u8 {
        match self {
            TeamType::Super => 2,
            TeamType::Maintenance => 1,
            TeamType::Customer => 0,
        }
    }

    /// True if `self` strictly dominates `other`.
    pub fn dominates(self, other: TeamType) -> bool {
        self.level() > other.level()
    }

    /// Tiers with a single instance per deployment.
    pub fn is_singleton(self) -> bool {
        !matches!(self, TeamType::Customer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TeamType::Super => "super",
            TeamType::Maintenance => "maintenance",
            TeamType::Customer => "customer",
        }
    }
}

impl core::fmt::Display for TeamType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "super" => Ok(TeamType::Super),
            "maintenance" => Ok(TeamType::Maintenance),
            "customer" => Ok(TeamType::Customer),
            other => Err(DomainError::validation(format!("unknown team type '{other}'"))),
        }
    }
}

/// Rank of a member within its team's tier (lower = more senior).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(i32);

impl Position {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    /// True if `self` carries more authority than `other`.
    pub fn is_senior_to(self, other: Position) -> bool {
        self.0 < other.0
    }
}

impl ValueObject for Position {}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i32> for Position {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Inclusive `[min, max]` band of positions a team's members may hold.
///
/// Invariant: `min <= max`, enforced by every constructor (including
/// deserialization).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "RangeRepr")]
pub struct PositionRange {
    min: Position,
    max: Position,
}

#[derive(Serialize, Deserialize)]
struct RangeRepr {
    min: i32,
    max: i32,
}

impl PositionRange {
    pub fn new(min: i32, max: i32) -> DomainResult<Self> {
        if min > max {
            return Err(DomainError::InvalidRange { min, max });
        }
        Ok(Self {
            min: Position(min),
            max: Position(max),
        })
    }

    pub fn min(&self) -> Position {
        self.min
    }

    pub fn max(&self) -> Position {
        self.max
    }

    pub fn contains(&self, position: Position) -> bool {
        self.min.0 <= position.0 && position.0 <= self.max.0
    }

    /// Validate that `position` lies inside the band.
    pub fn check(&self, position: Position) -> DomainResult<()> {
        if self.contains(position) {
            Ok(())
        } else {
            Err(DomainError::PositionOutOfRange {
                position: position.0,
                min: self.min.0,
                max: self.max.0,
            })
        }
    }
}

impl ValueObject for PositionRange {}

impl TryFrom<RangeRepr> for PositionRange {
    type Error = DomainError;

    fn try_from(value: RangeRepr) -> Result<Self, Self::Error> {
        PositionRange::new(value.min, value.max)
    }
}

impl From<PositionRange> for RangeRepr {
    fn from(value: PositionRange) -> Self {
        RangeRepr {
            min: value.min.0,
            max: value.max.0,
        }
    }
}
