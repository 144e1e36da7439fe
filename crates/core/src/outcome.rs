//! Result contract returned to callers of every mutating or query operation.
//!
//! Expected outcomes (policy denial, validation failure, missing resource) are
//! values. Only unexpected faults travel through `Err` in the surrounding
//! `Result`, so callers cannot forget to handle a denial.

use serde::Serialize;

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success(T),
    NotFound(String),
    Forbidden(String),
    BadRequest(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::NotFound(r) => Outcome::NotFound(r),
            Outcome::Forbidden(r) => Outcome::Forbidden(r),
            Outcome::BadRequest(r) => Outcome::BadRequest(r),
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::NotFound(_) => "not_found",
            Outcome::Forbidden(_) => "forbidden",
            Outcome::BadRequest(_) => "bad_request",
        }
    }
}

impl<T> From<DomainError> for Outcome<T> {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(what) => Outcome::NotFound(what),
            other => Outcome::BadRequest(other.to_string()),
        }
    }
}

impl<T> From<Result<T, DomainError>> for Outcome<T> {
    fn from(value: Result<T, DomainError>) -> Self {
        match value {
            Ok(v) => Outcome::Success(v),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_stays_distinct_from_bad_request() {
        let o: Outcome<()> = DomainError::not_found("member").into();
        assert_eq!(o, Outcome::NotFound("member".to_string()));

        let o: Outcome<()> = DomainError::InvalidRange { min: 3, max: 1 }.into();
        assert_eq!(o.kind(), "bad_request");
    }
}
