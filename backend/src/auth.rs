//! Password hashing and bearer-token sessions.
//!
//! # Passwords
//!
//! Stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>` with a random
//! per-user salt (base64, no padding). Verification is constant time.
//!
//! # Sessions
//!
//! Login issues a random 32-byte token (hex). The backend keeps only
//! SHA-256(token) mapped to the user id, so a leaked session table cannot
//! be replayed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crate::models::ErrorResponse;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use noticeboard_core::UserId;
use ring::digest::{digest, SHA256};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;
use std::sync::Arc;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};
const SALT_LEN: usize = 16;
const CREDENTIAL_LEN: usize = 32;
const SESSION_TOKEN_LEN: usize = 32;

/// Hashing failures. Only the system RNG can fail.
#[derive(Debug, thiserror::Error)]
#[error("secure random generator unavailable")]
pub struct RandomUnavailable;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, RandomUnavailable> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).map_err(|_| RandomUnavailable)?;

    let mut hash = [0u8; CREDENTIAL_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PBKDF2_ITERATIONS,
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!(
        "{HASH_SCHEME}${PBKDF2_ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

/// Check `password` against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Some(iterations) = iterations.parse().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash)) else {
        return false;
    };

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok()
}

/// Session table key for a raw token: hex SHA-256.
pub fn hash_token(token: &str) -> String {
    hex::encode(digest(&SHA256, token.as_bytes()))
}

/// Active sessions, keyed by token hash
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, UserId>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start a session for `user_id` and return the raw token.
    pub fn issue(&self, user_id: &str) -> Result<String, RandomUnavailable> {
        let mut bytes = [0u8; SESSION_TOKEN_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| RandomUnavailable)?;
        let token = hex::encode(bytes);

        self.sessions.insert(hash_token(&token), user_id.to_string());
        Ok(token)
    }

    /// User id behind `token`, if the session is live.
    pub fn resolve(&self, token: &str) -> Option<UserId> {
        self.sessions
            .get(&hash_token(token))
            .map(|entry| entry.value().clone())
    }

    /// End the session. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(&hash_token(token)).is_some()
    }

    /// End every session of a user (e.g. after account deletion).
    pub fn revoke_user(&self, user_id: &str) {
        self.sessions.retain(|_, owner| owner != user_id);
    }
}

/// Why a request carries no usable session.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("User not authenticated")]
    MissingHeader,
    #[error("Authorization must be a bearer session token")]
    InvalidHeader,
    #[error("Session has ended, log in again")]
    SessionEnded,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::InvalidHeader => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AuthError::MissingHeader | AuthError::SessionEnded => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED")
            }
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

/// Session token from an `Authorization: Bearer <token>` value.
/// The scheme is matched case-insensitively.
pub fn extract_bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
