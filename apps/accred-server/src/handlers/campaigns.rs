//! Campaign handlers: create, add recipients, send, list recipients

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accred_storage::{
    default_expiry, Campaign, CampaignId, CreateCampaignParams, CreateInviteParams,
    RecipientQuery, RecipientStatus, Role, StoreError,
};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::metrics::record_campaign_outcome;
use crate::server::{hash_token, new_invite_token, AppServer};

// ───────────────────────────────────── Wire types ─────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub role: String,
    pub institution_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CampaignBody {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<Uuid>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct AddRecipientsRequest {
    pub emails: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AddRecipientsResponse {
    pub added: u32,
}

#[derive(Debug, Serialize)]
pub struct SendCampaignResponse {
    pub sent: u32,
    pub failed: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListRecipientsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecipientBody {
    pub id: Uuid,
    pub email: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_id: Option<Uuid>,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct RecipientListResponse {
    pub recipients: Vec<RecipientBody>,
    pub total: u64,
}

// ───────────────────────────────────── Helpers ─────────────────────────────────────

fn campaign_body(campaign: &Campaign) -> CampaignBody {
    CampaignBody {
        id: campaign.id.0,
        name: campaign.name.clone(),
        role: campaign.role.as_str().to_string(),
        institution_id: campaign.institution_id.as_ref().map(|i| i.0),
        created_at: campaign.created_at.to_rfc3339(),
    }
}

async fn load_scoped_campaign(
    server: &AppServer,
    actor: &Actor,
    campaign_id: Uuid,
) -> Result<Campaign, ApiError> {
    server.require_invite_admin(actor)?;
    let campaign = server
        .store
        .get_campaign(&CampaignId(campaign_id))
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("campaign not found".to_string()),
            e => e.into(),
        })?;
    server.check_institution_scope(actor, campaign.institution_id.as_ref())?;
    Ok(campaign)
}

// ───────────────────────────────────── Handlers ─────────────────────────────────────

pub async fn create_campaign(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignBody>), ApiError> {
    server.require_invite_admin(&actor)?;

    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }
    let role: Role = req
        .role
        .parse()
        .map_err(|e: accred_storage::ParseRoleError| ApiError::Validation(e.to_string()))?;
    if role.is_institution_scoped() && req.institution_id.is_none() {
        return Err(ApiError::Validation(format!(
            "role {} requires an institution",
            role.as_str()
        )));
    }
    if !role.is_institution_scoped() && req.institution_id.is_some() {
        return Err(ApiError::Validation(format!(
            "role {} cannot be bound to an institution",
            role.as_str()
        )));
    }

    let institution_id = req.institution_id.map(accred_storage::InstitutionId);
    server.check_institution_scope(&actor, institution_id.as_ref())?;
    if let Some(inst) = &institution_id {
        server.store.get_institution(inst).await.map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("institution not found".to_string()),
            e => e.into(),
        })?;
    }

    let campaign = server
        .store
        .create_campaign(&CreateCampaignParams {
            institution_id,
            name: req.name.trim().to_string(),
            role,
            created_by: actor.user_id.clone(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(campaign_body(&campaign))))
}

pub async fn add_recipients(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Path(campaign_id): Path<Uuid>,
    Json(req): Json<AddRecipientsRequest>,
) -> Result<Json<AddRecipientsResponse>, ApiError> {
    let campaign = load_scoped_campaign(&server, &actor, campaign_id).await?;

    if req.emails.is_empty() {
        return Err(ApiError::Validation("no recipients given".to_string()));
    }
    if let Some(bad) = req.emails.iter().find(|e| !e.contains('@')) {
        return Err(ApiError::Validation(format!("invalid email address: {}", bad)));
    }

    let added = server
        .store
        .add_campaign_recipients(&campaign.id, &req.emails)
        .await?;

    Ok(Json(AddRecipientsResponse { added }))
}

/// Walk the recipients still queued, issue each an invite and send the
/// email. A paused or interrupted campaign is resumed by calling this
/// again; already-sent recipients are naturally skipped because only
/// queued rows are picked up. There is no retry logic: a failed
/// recipient stays failed.
pub async fn send_campaign(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<SendCampaignResponse>, ApiError> {
    let campaign = load_scoped_campaign(&server, &actor, campaign_id).await?;

    let queued = server.store.list_queued_recipients(&campaign.id).await?;
    let mut sent = 0u32;
    let mut failed = 0u32;

    for recipient in queued {
        let token = new_invite_token();
        let invite = match server
            .store
            .create_invite(&CreateInviteParams {
                token_hash: hash_token(&token),
                email: recipient.email.clone(),
                role: campaign.role,
                institution_id: campaign.institution_id.clone(),
                expires_at: default_expiry(Utc::now()),
                created_by: actor.user_id.clone(),
            })
            .await
        {
            Ok(invite) => invite,
            Err(e) => {
                tracing::warn!(email = %recipient.email, error = %e, "failed to issue campaign invite");
                let _ = server
                    .store
                    .advance_recipient(&recipient.id, RecipientStatus::Failed, None, Utc::now())
                    .await;
                record_campaign_outcome("failed");
                failed += 1;
                continue;
            }
        };

        let (status, outcome) = match server.deliver_invite(&recipient.email, &token).await {
            Ok(()) => (RecipientStatus::Sent, "sent"),
            Err(e) => {
                tracing::warn!(email = %recipient.email, error = %e, "campaign delivery failed");
                (RecipientStatus::Failed, "failed")
            }
        };

        server
            .store
            .advance_recipient(&recipient.id, status, Some(&invite.id), Utc::now())
            .await?;
        record_campaign_outcome(outcome);
        match status {
            RecipientStatus::Sent => sent += 1,
            _ => failed += 1,
        }
    }

    Ok(Json(SendCampaignResponse { sent, failed }))
}

pub async fn list_recipients(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Path(campaign_id): Path<Uuid>,
    Query(q): Query<ListRecipientsQuery>,
) -> Result<Json<RecipientListResponse>, ApiError> {
    let campaign = load_scoped_campaign(&server, &actor, campaign_id).await?;

    let status = q
        .status
        .as_deref()
        .map(|s| s.parse::<RecipientStatus>())
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let page = server
        .store
        .list_campaign_recipients(
            &campaign.id,
            &RecipientQuery {
                page: q.page.unwrap_or(1).max(1),
                limit: q.limit.unwrap_or(50).clamp(1, 500),
                status,
                search: q.search.clone(),
            },
        )
        .await?;

    Ok(Json(RecipientListResponse {
        recipients: page
            .recipients
            .iter()
            .map(|r| RecipientBody {
                id: r.id.0,
                email: r.email.clone(),
                status: r.status.as_str().to_string(),
                invite_id: r.invite_id.as_ref().map(|i| i.0),
                updated_at: r.updated_at.to_rfc3339(),
            })
            .collect(),
        total: page.total,
    }))
}
