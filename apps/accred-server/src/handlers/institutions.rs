//! Institution handlers: create, get

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accred_storage::{CreateInstitutionParams, InstitutionId, Role, StoreError};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::server::AppServer;

#[derive(Debug, Deserialize)]
pub struct CreateInstitutionRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct InstitutionResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: String,
}

pub async fn create_institution(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Json(req): Json<CreateInstitutionRequest>,
) -> Result<(StatusCode, Json<InstitutionResponse>), ApiError> {
    if actor.role != Role::PlatformAdmin {
        return Err(ApiError::Forbidden(
            "only platform administrators can create institutions".to_string(),
        ));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }

    let institution = server
        .store
        .create_institution(&CreateInstitutionParams {
            name: req.name.trim().to_string(),
        })
        .await
        .map_err(|e| match e {
            StoreError::AlreadyExists => {
                ApiError::InvalidState("an institution with this name already exists".to_string())
            }
            e => e.into(),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(InstitutionResponse {
            id: institution.id.0,
            name: institution.name,
            created_at: institution.created_at.to_rfc3339(),
        }),
    ))
}

pub async fn get_institution(
    State(server): State<Arc<AppServer>>,
    _actor: Actor,
    Path(institution_id): Path<Uuid>,
) -> Result<Json<InstitutionResponse>, ApiError> {
    let institution = server
        .store
        .get_institution(&InstitutionId(institution_id))
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("institution not found".to_string()),
            e => e.into(),
        })?;

    Ok(Json(InstitutionResponse {
        id: institution.id.0,
        name: institution.name,
        created_at: institution.created_at.to_rfc3339(),
    }))
}
