use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::jwe::Encrypter;
use crate::crypto::token;
use crate::error::{AppError, Result};
use crate::models::csrf::CsrfPayload;

/// Default lifetime of a CSRF token.
pub const DEFAULT_CSRF_VALIDITY: Duration = Duration::from_secs(12 * 3600);

/// Issues and verifies encrypted CSRF tokens bound to a session ID.
pub struct CsrfStore {
    encrypter: Arc<Encrypter>,
    validity: Duration,
}

impl CsrfStore {
    pub fn new(encrypter: Arc<Encrypter>, validity: Duration) -> Self {
        Self {
            encrypter,
            validity,
        }
    }

    /// Mints a token for `state` (the caller's session ID).
    pub fn new_token(&self, state: &str) -> Result<String> {
        self.new_token_at(state, Utc::now())
    }

    pub(crate) fn new_token_at(&self, state: &str, now: DateTime<Utc>) -> Result<String> {
        let validity = chrono::Duration::from_std(self.validity)
            .map_err(|e| AppError::Config(format!("CSRF validity out of range: {}", e)))?;
        let expire_after = now
            .checked_add_signed(validity)
            .ok_or_else(|| AppError::Config("CSRF validity out of range".to_string()))?;
        let payload = CsrfPayload {
            state: state.to_string(),
            token: token::new_long(),
            expire_after,
        };
        let json = sonic_rs::to_vec(&payload)
            .map_err(|e| AppError::Internal(format!("CSRF serialization failed: {}", e)))?;
        self.encrypter.encrypt(&json)
    }

    fn open(&self, token: &str) -> Result<CsrfPayload> {
        let json = self.encrypter.decrypt(token)?;
        sonic_rs::from_slice(&json)
            .map_err(|e| AppError::Crypto(format!("Malformed CSRF payload: {}", e)))
    }

    /// Decrypts `token`, failing if it cannot be opened or has expired.
    pub fn decode(&self, token: &str) -> Result<CsrfPayload> {
        let payload = self.open(token)?;
        if payload.is_expired_at(Utc::now()) {
            return Err(AppError::Crypto("csrf token expired".to_string()));
        }
        Ok(payload)
    }

    /// Checks `token` against `state`.
    ///
    /// Expired and mismatched tokens both return `Ok(false)`; only tokens
    /// that cannot be decrypted at all are errors.
    pub fn verify(&self, state: &str, token: &str) -> Result<bool> {
        self.verify_at(state, token, Utc::now())
    }

    pub(crate) fn verify_at(&self, state: &str, token: &str, now: DateTime<Utc>) -> Result<bool> {
        let payload = self.open(token)?;
        if payload.is_expired_at(now) {
            tracing::debug!("Expired CSRF token presented");
            return Ok(false);
        }
        Ok(payload.state == state)
    }
}
