//! Team persistence boundary.
//!
//! Defines the unit-of-work contract the services and jobs consume, plus an
//! in-memory adapter (tests/dev) and a Postgres adapter (production).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryTeamRepository;
pub use postgres::PostgresTeamRepository;
pub use r#trait::{RepositoryError, TeamRepository};
