//! Token Issuer
//! Mission: Produce and verify time-bounded access and refresh credentials

use crate::auth::models::{AccessClaims, RefreshClaims, UserRole};
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;
use uuid::Uuid;

/// Issues and verifies both token kinds. Two independent secrets, so a
/// leaked access token can never be replayed as a refresh token and vice
/// versa.
pub struct TokenIssuer {
    access_secret: String,
    refresh_secret: String,
    access_ttl_hours: i64,
    refresh_ttl_days: i64,
}

impl TokenIssuer {
    pub fn new(access_secret: String, refresh_secret: String) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl_hours: 24,
            refresh_ttl_days: 7,
        }
    }

    /// Sign a short-lived access token carrying identity and role.
    /// Returns the token and its lifetime in seconds.
    pub fn issue_access_token(&self, user_id: Uuid, role: &UserRole) -> Result<(String, usize)> {
        let expiration = Utc::now()
            .checked_add_signed(chrono::Duration::hours(self.access_ttl_hours))
            .context("Invalid timestamp")?
            .timestamp() as usize;

        let claims = AccessClaims {
            sub: user_id.to_string(),
            role: role.clone(),
            exp: expiration,
        };

        debug!(
            user_id = %user_id,
            "Issuing access token, expires in {}h",
            self.access_ttl_hours
        );

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )
        .context("Failed to sign access token")?;

        Ok((token, (self.access_ttl_hours * 3600) as usize))
    }

    /// Sign a refresh token. Returns the token and its absolute expiry as
    /// epoch seconds, for the store row.
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<(String, i64)> {
        let expires_at = Utc::now()
            .checked_add_signed(chrono::Duration::days(self.refresh_ttl_days))
            .context("Invalid timestamp")?
            .timestamp();

        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: expires_at as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )
        .context("Failed to sign refresh token")?;

        Ok((token, expires_at))
    }

    /// Verify an access token: signature and expiry.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        let decoded = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Validation::default(),
        )
        .context("Invalid or expired access token")?;

        Ok(decoded.claims)
    }

    /// Verify a refresh token against the independent refresh secret.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims> {
        let decoded = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::default(),
        )
        .context("Invalid or expired refresh token")?;

        Ok(decoded.claims)
    }
}
