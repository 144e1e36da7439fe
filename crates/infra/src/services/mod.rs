//! Request-side application services.
//!
//! Every operation follows the same pipeline:
//!
//! ```text
//! load aggregate → build policy target → decide → mutate → (cancelled?) → save once
//! ```
//!
//! Expected outcomes (denials, validation failures, missing resources) come
//! back as [`Outcome`] values. Only unexpected faults surface as
//! [`ServiceError`].

pub mod subscriptions;
pub mod team_members;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use teamhub_auth::Decision;
use teamhub_core::{DomainError, Outcome};

use crate::repository::RepositoryError;

pub use subscriptions::{SubscriptionService, SubscriptionServiceFactory};
pub use team_members::{MemberUpdate, TeamMemberService};

/// Unexpected fault raised by a service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The team changed between load and save. Safe to retry the whole
    /// operation.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error(transparent)]
    Repository(RepositoryError),

    /// The caller cancelled before anything was written.
    #[error("operation cancelled before save")]
    Cancelled,
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Conflict(_) => true,
            ServiceError::Repository(e) => e.is_retryable(),
            ServiceError::Cancelled => false,
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Repository(other),
        }
    }
}

/// Early exit from an operation: either an expected outcome or a fault.
pub(crate) enum Exit {
    NotFound(String),
    Forbidden(String),
    BadRequest(String),
    Fault(ServiceError),
}

impl From<DomainError> for Exit {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(what) => Exit::NotFound(what),
            other => Exit::BadRequest(other.to_string()),
        }
    }
}

impl From<RepositoryError> for Exit {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(id) => Exit::NotFound(format!("team {id}")),
            other => Exit::Fault(other.into()),
        }
    }
}

impl From<ServiceError> for Exit {
    fn from(value: ServiceError) -> Self {
        Exit::Fault(value)
    }
}

/// Collapse an operation body into the public result contract.
pub(crate) fn finish<T>(result: Result<T, Exit>) -> Result<Outcome<T>, ServiceError> {
    match result {
        Ok(v) => Ok(Outcome::Success(v)),
        Err(Exit::NotFound(r)) => Ok(Outcome::NotFound(r)),
        Err(Exit::Forbidden(r)) => Ok(Outcome::Forbidden(r)),
        Err(Exit::BadRequest(r)) => Ok(Outcome::BadRequest(r)),
        Err(Exit::Fault(e)) => Err(e),
    }
}

/// Unwrap an allowed decision. Denials are traced at debug level only.
pub(crate) fn permit<T>(decision: Decision<T>, operation: &'static str) -> Result<T, Exit> {
    match decision {
        Decision::Allowed(v) => Ok(v),
        Decision::Forbidden(reason) => {
            debug!(operation, reason = %reason, "policy denied");
            Err(Exit::Forbidden(reason))
        }
        Decision::NotFound(reason) => Err(Exit::NotFound(reason)),
    }
}

/// Called immediately before the save step.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), Exit> {
    if cancel.is_cancelled() {
        return Err(Exit::Fault(ServiceError::Cancelled));
    }
    Ok(())
}
