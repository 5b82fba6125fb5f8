//! Auth handlers: login

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accred_storage::StoreError;

use crate::auth::{issue_token, verify_password};
use crate::error::ApiError;
use crate::server::AppServer;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserBody,
}

pub async fn login(
    State(server): State<Arc<AppServer>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    // Wrong email and wrong password answer identically.
    let invalid = || ApiError::Unauthorized("invalid credentials".to_string());

    let user = server
        .store
        .get_user_by_email(&req.email)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => invalid(),
            e => e.into(),
        })?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = issue_token(&user, &server.config.jwt_secret)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(LoginResponse {
        token,
        user: UserBody {
            id: user.id.0,
            email: user.email,
            display_name: user.display_name,
            role: user.role.as_str().to_string(),
            institution_id: user.institution_id.map(|i| i.0),
        },
    }))
}
