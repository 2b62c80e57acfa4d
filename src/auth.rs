//! Bearer credentials: signed HS256 tokens, plus the unsigned development
//! format `dev-token-<id>` that is only honored when explicitly enabled.
//!
//! Passwords are compared as stored plaintext. Both that and the development
//! format are kept for compatibility with existing deployments.

use crate::identity::{Identity, Resolver, Role};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEV_TOKEN_PREFIX: &str = "dev-token-";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("development tokens are disabled")]
    DevTokensDisabled,
    #[error("token subject no longer exists")]
    UnknownSubject,
    #[error("invalid username or password")]
    BadCredentials,
    #[error("token signing is not configured")]
    SigningUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    /// HMAC secret. Empty means tokens cannot be signed.
    pub secret: String,
    pub allow_dev_tokens: bool,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub identity: Identity,
    /// Signing failed and the development format was issued instead.
    pub dev_token: bool,
}

pub fn dev_token(id: &str) -> String {
    format!("{}{}", DEV_TOKEN_PREFIX, id)
}

/// Role membership check.
pub fn authorize(identity: &Identity, allowed: &[Role]) -> bool {
    allowed.contains(&identity.role())
}

pub struct AuthGate<'a> {
    pub resolver: Resolver<'a>,
    pub settings: &'a AuthSettings,
}

impl<'a> AuthGate<'a> {
    /// Verifies `token` and re-reads its owner from the collections; embedded
    /// profile fields are never trusted.
    pub fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        if let Some(id) = token.strip_prefix(DEV_TOKEN_PREFIX) {
            if !self.settings.allow_dev_tokens {
                return Err(AuthError::DevTokensDisabled);
            }
            if Role::from_id(id).is_none() {
                return Err(AuthError::UnknownSubject);
            }
            return self
                .resolver
                .resolve_by_id(id)
                .ok_or(AuthError::UnknownSubject);
        }

        if self.settings.secret.is_empty() {
            return Err(AuthError::SigningUnavailable);
        }
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.settings.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        let identity = self
            .resolver
            .resolve_by_id(&data.claims.id)
            .ok_or(AuthError::UnknownSubject)?;
        if identity.role() != data.claims.role {
            return Err(AuthError::UnknownSubject);
        }
        Ok(identity)
    }

    pub fn issue_token(&self, identity: &Identity) -> Result<String, AuthError> {
        if self.settings.secret.is_empty() {
            return Err(AuthError::SigningUnavailable);
        }
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: identity.id().to_string(),
            username: identity.username(),
            role: identity.role(),
            name: identity.name(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.settings.secret.as_bytes()),
        )?)
    }

    /// Plaintext comparison against the resolved record. If signing fails the
    /// development format is issued rather than failing the login.
    pub fn login(&self, name: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let identity = self
            .resolver
            .resolve_by_login_name(name)
            .ok_or(AuthError::BadCredentials)?;
        if identity.password() != password {
            return Err(AuthError::BadCredentials);
        }

        let (token, dev) = match self.issue_token(&identity) {
            Ok(t) => (t, false),
            Err(e) => {
                warn!(user_id = %identity.id(), "token signing failed, issuing development token: {e}");
                (dev_token(identity.id()), true)
            }
        };
        info!(user_id = %identity.id(), role = identity.role().as_str(), "login");
        Ok(LoginOutcome {
            token,
            identity,
            dev_token: dev,
        })
    }
}
