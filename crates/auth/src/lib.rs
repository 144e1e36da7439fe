//! `teamhub-auth` — pure authorization boundary.
//!
//! Rank comparison, principal context and the team policies. Decoupled from
//! transport and storage: callers hand in loaded targets and get a decision.

pub mod claims;
pub mod policy;
pub mod principal;
pub mod rank;

pub use claims::{ClaimsPrincipal, PrincipalClaims, TokenValidationError, validate_claims};
pub use policy::{Decision, MemberTarget, TeamPolicy, TeamTarget, validate_leader_candidate};
pub use principal::{PrincipalContext, PrincipalProvider};
pub use rank::{Rank, RankConfig, RankOrdering};
