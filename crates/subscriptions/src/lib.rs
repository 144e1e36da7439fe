//! Subscription & device lifecycle owned by a team.
//!
//! Pure domain logic: status machine, device registry bounded by the plan's
//! device limit, payment bookkeeping. No IO.

pub mod device;
pub mod subscription;

pub use device::TeamDevice;
pub use subscription::{SubscriptionPlan, SubscriptionStatus, TeamSubscription};
