//! Position hierarchy: the rank comparator every policy is built on.

use serde::{Deserialize, Serialize};

use teamhub_core::{Position, TeamType};

/// Immutable ranking configuration, passed to the comparator and policies at
/// construction instead of living in ambient constants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankConfig {
    /// Sentinel position meaning "no effective floor": a holder outranks every
    /// other rank of its own tier.
    catch_all: Position,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            catch_all: Position::new(i32::MAX),
        }
    }
}

impl RankConfig {
    pub fn new(catch_all: i32) -> Self {
        Self {
            catch_all: Position::new(catch_all),
        }
    }

    pub fn catch_all(&self) -> Position {
        self.catch_all
    }

    pub fn is_catch_all(&self, position: Position) -> bool {
        position == self.catch_all
    }

    /// Compare a principal's rank against a target's rank.
    ///
    /// Tier dominates; within a tier the catch-all holder outranks everyone
    /// else, then the lower position value wins.
    pub fn compare(&self, principal: Rank, target: Rank) -> RankOrdering {
        if principal.tier != target.tier {
            return if principal.tier.dominates(target.tier) {
                RankOrdering::Higher
            } else {
                RankOrdering::Lower
            };
        }

        match (
            self.is_catch_all(principal.position),
            self.is_catch_all(target.position),
        ) {
            (true, true) => return RankOrdering::Equal,
            (true, false) => return RankOrdering::Higher,
            (false, true) => return RankOrdering::Lower,
            (false, false) => {}
        }

        match principal.position.value().cmp(&target.position.value()) {
            core::cmp::Ordering::Less => RankOrdering::Higher,
            core::cmp::Ordering::Equal => RankOrdering::Equal,
            core::cmp::Ordering::Greater => RankOrdering::Lower,
        }
    }

    /// True if `principal` strictly outranks `target`.
    pub fn outranks(&self, principal: Rank, target: Rank) -> bool {
        self.compare(principal, target) == RankOrdering::Higher
    }
}

/// Tier + position pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rank {
    pub tier: TeamType,
    pub position: Position,
}

impl Rank {
    pub fn new(tier: TeamType, position: impl Into<Position>) -> Self {
        Self {
            tier,
            position: position.into(),
        }
    }
}

/// Outcome of comparing a principal's rank with a target's.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrdering {
    Higher,
    Equal,
    Lower,
}

impl RankOrdering {
    pub fn reverse(self) -> Self {
        match self {
            RankOrdering::Higher => RankOrdering::Lower,
            RankOrdering::Equal => RankOrdering::Equal,
            RankOrdering::Lower => RankOrdering::Higher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tier() -> impl Strategy<Value = TeamType> {
        prop_oneof![
            Just(TeamType::Super),
            Just(TeamType::Maintenance),
            Just(TeamType::Customer),
        ]
    }

    #[test]
    fn super_outranks_every_other_tier_regardless_of_position() {
        let cfg = RankConfig::default();
        let principal = Rank::new(TeamType::Super, 1_000);
        assert_eq!(
            cfg.compare(principal, Rank::new(TeamType::Maintenance, 1)),
            RankOrdering::Higher
        );
        assert_eq!(
            cfg.compare(principal, Rank::new(TeamType::Customer, 1)),
            RankOrdering::Higher
        );
    }

    #[test]
    fn lower_number_is_senior_within_a_tier() {
        let cfg = RankConfig::default();
        let p = Rank::new(TeamType::Customer, 5);
        assert_eq!(cfg.compare(p, Rank::new(TeamType::Customer, 3)), RankOrdering::Lower);
        assert_eq!(cfg.compare(p, Rank::new(TeamType::Customer, 5)), RankOrdering::Equal);
        assert_eq!(cfg.compare(p, Rank::new(TeamType::Customer, 9)), RankOrdering::Higher);
    }

    #[test]
    fn catch_all_outranks_its_own_tier_only() {
        let cfg = RankConfig::new(999);
        let holder = Rank::new(TeamType::Maintenance, 999);
        assert!(cfg.outranks(holder, Rank::new(TeamType::Maintenance, 1)));
        assert!(!cfg.outranks(holder, Rank::new(TeamType::Super, 500)));
        assert_eq!(cfg.compare(holder, holder), RankOrdering::Equal);
    }

    proptest! {
        #[test]
        fn comparison_is_antisymmetric(
            t1 in tier(), p1 in -100i32..100,
            t2 in tier(), p2 in -100i32..100,
        ) {
            let cfg = RankConfig::new(50);
            let a = Rank::new(t1, p1);
            let b = Rank::new(t2, p2);
            prop_assert_eq!(cfg.compare(a, b), cfg.compare(b, a).reverse());
        }

        #[test]
        fn dominant_tier_always_wins(p1 in any::<i32>(), p2 in any::<i32>()) {
            let cfg = RankConfig::default();
            prop_assert!(cfg.outranks(
                Rank::new(TeamType::Maintenance, p1),
                Rank::new(TeamType::Customer, p2),
            ));
        }
    }
}
