//! Invite handlers: create, list, validate, track view, accept, decline, edit, revoke

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accred_storage::{
    default_expiry, CreateInviteParams, CreateUserParams, DeclineReason, Invite, InviteId,
    InviteStatus, InviteUpdate, RecipientStatus, Role, StoreError, User,
};

use crate::auth::{hash_password, Actor};
use crate::error::ApiError;
use crate::metrics::record_invite_transition;
use crate::server::{hash_token, new_invite_token, AppServer};

// ───────────────────────────────────── Wire types ─────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct InstitutionBody {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct InviteBody {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<InstitutionBody>,
    pub status: String,
    pub created_at: String,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declined_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub email: String,
    pub role: String,
    pub institution_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct InviteCreatedResponse {
    pub invite: InviteBody,
    /// The plaintext token, returned exactly once.
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct InviteListResponse {
    pub invites: Vec<InviteBody>,
}

#[derive(Debug, Deserialize)]
pub struct ListInvitesQuery {
    pub institution_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite: Option<InviteBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_user: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackViewRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub token: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DeclineRequest {
    pub token: String,
    pub reason: Option<String>,
    pub reason_other: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditInviteRequest {
    pub role: Option<String>,
    pub extend_expiry: Option<bool>,
}

// ───────────────────────────────────── Helpers ─────────────────────────────────────

/// Message shown when a transition is attempted from a settled state.
fn state_message(status: InviteStatus) -> &'static str {
    match status {
        InviteStatus::Used => "already used",
        InviteStatus::Expired => "expired",
        // Declined invites are reported the same as any other
        // unavailable invite.
        InviteStatus::Declined | InviteStatus::Pending => "no longer valid",
    }
}

async fn invite_body(server: &AppServer, invite: &Invite) -> Result<InviteBody, ApiError> {
    let institution = match &invite.institution_id {
        Some(id) => {
            let inst = server.store.get_institution(id).await?;
            Some(InstitutionBody {
                id: inst.id.0,
                name: inst.name,
            })
        }
        None => None,
    };

    Ok(InviteBody {
        id: invite.id.0,
        email: invite.email.clone(),
        role: invite.role.as_str().to_string(),
        institution,
        status: invite.status(Utc::now()).as_str().to_string(),
        created_at: invite.created_at.to_rfc3339(),
        expires_at: invite.expires_at.to_rfc3339(),
        viewed_at: invite.viewed_at.map(|t| t.to_rfc3339()),
        used_at: invite.used_at.map(|t| t.to_rfc3339()),
        declined_at: invite.declined_at.map(|t| t.to_rfc3339()),
        decline_reason: invite.decline_reason.map(|r| r.as_str().to_string()),
        decline_note: invite.decline_note.clone(),
    })
}

fn parse_role(s: &str) -> Result<Role, ApiError> {
    s.parse::<Role>()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

/// An institution-scoped role must carry an institution and a
/// platform-wide role must not.
fn check_role_scoping(role: Role, has_institution: bool) -> Result<(), ApiError> {
    if role.is_institution_scoped() && !has_institution {
        return Err(ApiError::Validation(format!(
            "role {} requires an institution",
            role.as_str()
        )));
    }
    if !role.is_institution_scoped() && has_institution {
        return Err(ApiError::Validation(format!(
            "role {} cannot be bound to an institution",
            role.as_str()
        )));
    }
    Ok(())
}

/// Best-effort bump of the campaign recipient backed by this invite.
/// Never fails the caller: recipient tracking is analytics, not state.
async fn advance_recipient_for_invite(server: &AppServer, invite: &InviteId, to: RecipientStatus) {
    if let Ok(recipient) = server.store.get_recipient_by_invite(invite).await {
        let _ = server
            .store
            .advance_recipient(&recipient.id, to, None, Utc::now())
            .await;
    }
}

// ───────────────────────────────────── Handlers ─────────────────────────────────────

pub async fn create_invite(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Json(req): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<InviteCreatedResponse>), ApiError> {
    server.require_invite_admin(&actor)?;

    if req.email.is_empty() || !req.email.contains('@') {
        return Err(ApiError::Validation("invalid email address".to_string()));
    }

    let role = parse_role(&req.role)?;
    check_role_scoping(role, req.institution_id.is_some())?;

    let institution_id = req.institution_id.map(accred_storage::InstitutionId);
    server.check_institution_scope(&actor, institution_id.as_ref())?;
    if let Some(inst) = &institution_id {
        server.store.get_institution(inst).await.map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("institution not found".to_string()),
            e => e.into(),
        })?;
    }

    let token = new_invite_token();
    let invite = server
        .store
        .create_invite(&CreateInviteParams {
            token_hash: hash_token(&token),
            email: req.email.clone(),
            role,
            institution_id,
            expires_at: default_expiry(Utc::now()),
            created_by: actor.user_id.clone(),
        })
        .await
        .map_err(|e| match e {
            StoreError::AlreadyExists => ApiError::Internal("token collision".to_string()),
            e => e.into(),
        })?;

    if let Err(e) = server.deliver_invite(&invite.email, &token).await {
        tracing::warn!(email = %invite.email, error = %e, "invite created but email delivery failed");
    }

    record_invite_transition("created");
    let body = invite_body(&server, &invite).await?;
    Ok((
        StatusCode::CREATED,
        Json(InviteCreatedResponse { invite: body, token }),
    ))
}

pub async fn list_invites(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Query(q): Query<ListInvitesQuery>,
) -> Result<Json<InviteListResponse>, ApiError> {
    server.require_invite_admin(&actor)?;

    // Institution admins only ever see their own institution's invites.
    let scope = if actor.role == Role::PlatformAdmin {
        q.institution_id.map(accred_storage::InstitutionId)
    } else {
        match actor.institution_id.clone() {
            Some(own) => Some(own),
            None => {
                return Err(ApiError::Forbidden(
                    "cannot act outside your institution".to_string(),
                ))
            }
        }
    };

    let invites = server.store.list_invites(scope.as_ref()).await?;
    let mut bodies = Vec::with_capacity(invites.len());
    for invite in &invites {
        bodies.push(invite_body(&server, invite).await?);
    }
    Ok(Json(InviteListResponse { invites: bodies }))
}

pub async fn validate_invite(
    State(server): State<Arc<AppServer>>,
    Query(q): Query<ValidateQuery>,
) -> Result<Json<ValidateResponse>, ApiError> {
    // No authentication required: the token itself is the credential.
    if q.token.is_empty() {
        return Err(ApiError::Validation("token is required".to_string()));
    }

    let invite = server
        .store
        .get_invite_by_token(&hash_token(&q.token))
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::invalid_invite(),
            e => e.into(),
        })?;

    let status = invite.status(Utc::now());
    if status != InviteStatus::Pending {
        return Ok(Json(ValidateResponse {
            valid: false,
            invite: None,
            existing_user: None,
            reason: Some(state_message(status).to_string()),
        }));
    }

    let existing_user = match server.store.get_user_by_email(&invite.email).await {
        Ok(_) => true,
        Err(StoreError::NotFound) => false,
        Err(e) => return Err(e.into()),
    };

    Ok(Json(ValidateResponse {
        valid: true,
        invite: Some(invite_body(&server, &invite).await?),
        existing_user: Some(existing_user),
        reason: None,
    }))
}

/// Fire-and-forget view tracking. Always answers 204: a broken or
/// missing invite must never surface an error on the landing page's
/// background call.
pub async fn track_view(
    State(server): State<Arc<AppServer>>,
    Json(req): Json<TrackViewRequest>,
) -> StatusCode {
    let token_hash = hash_token(&req.token);
    let now = Utc::now();

    match server.store.mark_invite_viewed(&token_hash, now).await {
        Ok(()) => {
            record_invite_transition("viewed");
            // A viewed campaign invite also counts as opened.
            if let Ok(invite) = server.store.get_invite_by_token(&token_hash).await {
                advance_recipient_for_invite(&server, &invite.id, RecipientStatus::Opened).await;
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "view tracking skipped");
        }
    }

    StatusCode::NO_CONTENT
}

pub async fn accept_invite(
    State(server): State<Arc<AppServer>>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<AcceptResponse>, ApiError> {
    if req.token.is_empty() {
        return Err(ApiError::Validation("token is required".to_string()));
    }
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }

    let token_hash = hash_token(&req.token);
    let invite = server
        .store
        .get_invite_by_token(&token_hash)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::invalid_invite(),
            e => e.into(),
        })?;

    // Re-derived at submit time: significant time may have passed since
    // the page-load validate call.
    let status = invite.status(Utc::now());
    if status != InviteStatus::Pending {
        return Err(ApiError::InvalidState(state_message(status).to_string()));
    }

    // Create or link the account first, keyed by email uniqueness, so a
    // retry after a partial failure finds the account and only has the
    // consume step left.
    let user = find_or_create_account(&server, &invite, name, &req.password).await?;

    // First writer wins; the loser of a double-submit race lands here
    // with Conflict and must not see a success.
    server
        .store
        .consume_invite(&token_hash, Utc::now())
        .await
        .map_err(|e| match e {
            StoreError::Conflict => ApiError::InvalidState("no longer valid".to_string()),
            StoreError::NotFound => ApiError::invalid_invite(),
            e => e.into(),
        })?;

    advance_recipient_for_invite(&server, &invite.id, RecipientStatus::Accepted).await;
    record_invite_transition("accepted");

    Ok(Json(AcceptResponse {
        user_id: user.id.0,
        email: user.email,
        display_name: user.display_name,
        role: invite.role.as_str().to_string(),
        institution_id: invite.institution_id.map(|i| i.0),
    }))
}

async fn find_or_create_account(
    server: &AppServer,
    invite: &Invite,
    name: &str,
    password: &str,
) -> Result<User, ApiError> {
    match server.store.get_user_by_email(&invite.email).await {
        Ok(user) => {
            // Existing account: bind the invited role and institution.
            server
                .store
                .link_user_role(&user.id, invite.role, invite.institution_id.as_ref())
                .await?;
            Ok(user)
        }
        Err(StoreError::NotFound) => {
            let password_hash =
                hash_password(password).map_err(|e| ApiError::Internal(e.to_string()))?;
            let created = server
                .store
                .create_user(&CreateUserParams {
                    email: invite.email.clone(),
                    display_name: name.to_string(),
                    password_hash,
                    role: invite.role,
                    institution_id: invite.institution_id.clone(),
                })
                .await;
            match created {
                Ok(user) => Ok(user),
                // A near-simultaneous accept created it in between; the
                // email key guarantees there is exactly one account.
                Err(StoreError::AlreadyExists) => {
                    let user = server.store.get_user_by_email(&invite.email).await?;
                    server
                        .store
                        .link_user_role(&user.id, invite.role, invite.institution_id.as_ref())
                        .await?;
                    Ok(user)
                }
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn decline_invite(
    State(server): State<Arc<AppServer>>,
    Json(req): Json<DeclineRequest>,
) -> Result<StatusCode, ApiError> {
    if req.token.is_empty() {
        return Err(ApiError::Validation("token is required".to_string()));
    }

    let reason = req
        .reason
        .as_deref()
        .map(|s| s.parse::<DeclineReason>())
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    // Free text is only recorded alongside the catch-all reason.
    let note = match reason {
        Some(DeclineReason::Other) => req.reason_other.as_deref(),
        _ => None,
    };

    let token_hash = hash_token(&req.token);
    let invite = server
        .store
        .get_invite_by_token(&token_hash)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::invalid_invite(),
            e => e.into(),
        })?;

    let status = invite.status(Utc::now());
    if status != InviteStatus::Pending {
        return Err(ApiError::InvalidState(state_message(status).to_string()));
    }

    server
        .store
        .decline_invite(&token_hash, reason, note, Utc::now())
        .await
        .map_err(|e| match e {
            StoreError::Conflict => ApiError::InvalidState("no longer valid".to_string()),
            StoreError::NotFound => ApiError::invalid_invite(),
            e => e.into(),
        })?;

    record_invite_transition("declined");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn edit_invite(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Path(invite_id): Path<Uuid>,
    Json(req): Json<EditInviteRequest>,
) -> Result<Json<InviteBody>, ApiError> {
    server.require_invite_admin(&actor)?;

    let invite_id = InviteId(invite_id);
    let invite = server
        .store
        .get_invite(&invite_id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("invite not found".to_string()),
            e => e.into(),
        })?;
    server.check_institution_scope(&actor, invite.institution_id.as_ref())?;

    if invite.used_at.is_some() {
        return Err(ApiError::InvalidState("cannot edit used invite".to_string()));
    }

    let role = match &req.role {
        Some(r) => {
            let role = parse_role(r)?;
            check_role_scoping(role, invite.institution_id.is_some())?;
            Some(role)
        }
        None => None,
    };

    let extend = req.extend_expiry.unwrap_or(false);
    let update = InviteUpdate {
        role,
        // Replaces the current expiry outright, which also resurrects
        // an expired-but-unused invite.
        expires_at: extend.then(|| default_expiry(Utc::now())),
    };

    server
        .store
        .update_invite(&invite_id, &update)
        .await
        .map_err(|e| match e {
            StoreError::Conflict => ApiError::InvalidState("cannot edit used invite".to_string()),
            e => e.into(),
        })?;

    if extend {
        record_invite_transition("extended");
    }

    let refreshed = server.store.get_invite(&invite_id).await?;
    Ok(Json(invite_body(&server, &refreshed).await?))
}

pub async fn revoke_invite(
    State(server): State<Arc<AppServer>>,
    actor: Actor,
    Path(invite_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    server.require_invite_admin(&actor)?;

    let invite_id = InviteId(invite_id);
    let invite = server
        .store
        .get_invite(&invite_id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("invite not found".to_string()),
            e => e.into(),
        })?;
    server.check_institution_scope(&actor, invite.institution_id.as_ref())?;

    server
        .store
        .delete_invite(&invite_id)
        .await
        .map_err(|e| match e {
            StoreError::Conflict => {
                ApiError::InvalidState("cannot revoke used invite".to_string())
            }
            e => e.into(),
        })?;

    record_invite_transition("revoked");
    Ok(StatusCode::NO_CONTENT)
}
