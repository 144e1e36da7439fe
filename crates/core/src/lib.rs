//! `teamhub-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod hierarchy;
pub mod id;
pub mod outcome;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use hierarchy::{Position, PositionRange, TeamType};
pub use id::{DeviceId, PlanId, SubscriptionId, TeamId, UserId};
pub use outcome::Outcome;
pub use value_object::ValueObject;
