//! Team aggregate (pure domain logic, no IO).
//!
//! The team is the unit of consistency: members, leader, position band and
//! owned subscriptions change only through its mutators and are saved as a
//! whole.

pub mod member;
pub mod team;

pub use member::{Member, MemberProfile};
pub use team::{LoadDepth, Team};
