//! Password hashing and bearer-token session context.
//!
//! Every administrative handler receives an explicit [`Actor`] (caller
//! identity plus effective role) extracted from the Authorization
//! header; nothing reads caller identity from ambient state.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use accred_storage::{InstitutionId, Role, User, UserId};

use crate::error::ApiError;
use crate::server::AppServer;

/// Session token lifetime.
const TOKEN_TTL_HOURS: i64 = 12;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token signing failed: {0}")]
    Token(String),
    #[error("invalid or expired session token")]
    InvalidToken,
}

/// Hash a password with Argon2id for storage (PHC string format).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verify a password against a stored PHC hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: String,
    inst: Option<String>,
    exp: i64,
}

/// Caller identity and effective role, passed explicitly into handlers.
#[derive(Clone, Debug)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub institution_id: Option<InstitutionId>,
}

impl Actor {
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            role: user.role,
            institution_id: user.institution_id.clone(),
        }
    }
}

/// Issue a signed session token for a user.
pub fn issue_token(user: &User, secret: &str) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user.id.0.to_string(),
        role: user.role.as_str().to_string(),
        inst: user.institution_id.as_ref().map(|i| i.0.to_string()),
        exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Token(e.to_string()))
}

/// Verify a session token and recover the caller context.
pub fn verify_token(token: &str, secret: &str) -> Result<Actor, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::InvalidToken)?;

    let user_id = Uuid::try_parse(&data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
    let role: Role = data
        .claims
        .role
        .parse()
        .map_err(|_| AuthError::InvalidToken)?;
    let institution_id = data
        .claims
        .inst
        .as_deref()
        .map(Uuid::try_parse)
        .transpose()
        .map_err(|_| AuthError::InvalidToken)?
        .map(InstitutionId);

    Ok(Actor {
        user_id: UserId(user_id),
        role,
        institution_id,
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppServer>> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        server: &Arc<AppServer>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        verify_token(token, &server.config.jwt_secret)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))
    }
}
