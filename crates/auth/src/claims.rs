use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use teamhub_core::{TeamId, TeamType, UserId};

use crate::principal::{PrincipalContext, PrincipalProvider};

/// Identity claims (transport-agnostic).
///
/// The minimal set the engine expects once a token has been decoded and
/// verified by whatever security layer the host uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalClaims {
    pub sub: UserId,

    /// Team the subject belongs to.
    pub team_id: TeamId,

    /// Tier of that team.
    pub tier: TeamType,

    /// Subject's position within its team.
    pub position: i32,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Validate the claim time window. Signature checks live outside this crate.
pub fn validate_claims(
    claims: &PrincipalClaims,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

impl PrincipalContext {
    pub fn from_claims(
        claims: &PrincipalClaims,
        now: DateTime<Utc>,
    ) -> Result<Self, TokenValidationError> {
        validate_claims(claims, now)?;
        Ok(PrincipalContext::authenticated(
            claims.sub,
            claims.team_id,
            claims.tier,
            claims.position,
        ))
    }
}

/// Provider backed by optional claims: missing or invalid claims resolve to
/// the anonymous principal.
#[derive(Debug, Clone)]
pub struct ClaimsPrincipal {
    claims: Option<PrincipalClaims>,
    now: DateTime<Utc>,
}

impl ClaimsPrincipal {
    pub fn new(claims: Option<PrincipalClaims>, now: DateTime<Utc>) -> Self {
        Self { claims, now }
    }
}

impl PrincipalProvider for ClaimsPrincipal {
    fn principal(&self) -> PrincipalContext {
        let Some(claims) = &self.claims else {
            return PrincipalContext::anonymous();
        };
        match PrincipalContext::from_claims(claims, self.now) {
            Ok(p) => p,
            Err(e) => {
                debug!(subject = %claims.sub, error = %e, "rejecting principal claims");
                PrincipalContext::anonymous()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(now: DateTime<Utc>) -> PrincipalClaims {
        PrincipalClaims {
            sub: UserId::new(),
            team_id: TeamId::new(),
            tier: TeamType::Customer,
            position: 3,
            issued_at: now - Duration::minutes(5),
            expires_at: now + Duration::minutes(5),
        }
    }

    #[test]
    fn valid_claims_produce_authenticated_principal() {
        let now = Utc::now();
        let c = claims(now);
        let p = ClaimsPrincipal::new(Some(c.clone()), now).principal();
        assert!(p.is_authenticated());
        assert!(p.is_user(c.sub));
        assert!(p.belongs_to(c.team_id));
    }

    #[test]
    fn expired_claims_fall_back_to_anonymous() {
        let now = Utc::now();
        let c = claims(now);
        let later = c.expires_at + Duration::seconds(1);
        assert_eq!(validate_claims(&c, later), Err(TokenValidationError::Expired));
        assert!(!ClaimsPrincipal::new(Some(c), later).principal().is_authenticated());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc::now();
        let mut c = claims(now);
        c.expires_at = c.issued_at;
        assert_eq!(
            validate_claims(&c, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn missing_claims_are_anonymous() {
        assert!(!ClaimsPrincipal::new(None, Utc::now()).principal().is_authenticated());
    }
}
