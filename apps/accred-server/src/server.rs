//! Shared server state and cross-cutting helpers.

use std::sync::Arc;

use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use accred_storage::{InstitutionId, Role, Store};

use crate::auth::Actor;
use crate::config::ServerConfig;
use crate::email::{EmailError, EmailProvider};
use crate::error::ApiError;

pub struct AppServer {
    pub store: Arc<dyn Store>,
    pub config: ServerConfig,
    /// Absent in tests and in deployments without a provider; sends
    /// then degrade to logged no-ops.
    pub mailer: Option<Box<dyn EmailProvider>>,
}

impl AppServer {
    pub fn new(
        store: Arc<dyn Store>,
        config: ServerConfig,
        mailer: Option<Box<dyn EmailProvider>>,
    ) -> Self {
        Self {
            store,
            config,
            mailer,
        }
    }

    /// Only platform and institution admins may issue or manage invites.
    pub fn require_invite_admin(&self, actor: &Actor) -> Result<(), ApiError> {
        if actor.role.can_manage_invites() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "only administrators can manage invites".to_string(),
            ))
        }
    }

    /// Institution admins act within their own institution; platform
    /// admins may target any (or none).
    pub fn check_institution_scope(
        &self,
        actor: &Actor,
        target: Option<&InstitutionId>,
    ) -> Result<(), ApiError> {
        if actor.role == Role::PlatformAdmin {
            return Ok(());
        }
        match (&actor.institution_id, target) {
            (Some(own), Some(requested)) if own == requested => Ok(()),
            _ => Err(ApiError::Forbidden(
                "cannot act outside your institution".to_string(),
            )),
        }
    }

    /// The join link embedded in invite emails.
    pub fn invite_url(&self, token: &str) -> String {
        format!("{}/invites?token={}", self.config.public_url, token)
    }

    /// Deliver an invite email, or log when no provider is configured.
    pub async fn deliver_invite(&self, to: &str, token: &str) -> Result<(), EmailError> {
        match (&self.mailer, &self.config.email) {
            (Some(mailer), Some(email)) => {
                mailer
                    .send_invite(
                        to,
                        &self.invite_url(token),
                        &email.from_address,
                        email.from_name.as_deref(),
                    )
                    .await
            }
            _ => {
                tracing::info!(%to, "no email provider configured, skipping invite delivery");
                Ok(())
            }
        }
    }
}

/// Generate a fresh invite token: 32 alphanumeric characters of
/// secret, shown to the caller exactly once.
pub fn new_invite_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Only the SHA-256 of the token is persisted and used for lookup.
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
