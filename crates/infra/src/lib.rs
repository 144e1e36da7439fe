//! Infrastructure layer: persistence adapters, application services,
//! background jobs and configuration.

pub mod clock;
pub mod config;
pub mod jobs;
pub mod repository;
pub mod services;


pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
