//! Handler modules for the REST API
//!
//! This module contains handler functions organized by domain:
//! - auth: login
//! - invites: create, list, validate, track view, accept, decline, edit, revoke
//! - institutions: create, get
//! - campaigns: create, add recipients, send, list recipients

pub mod auth;
pub mod campaigns;
pub mod institutions;
pub mod invites;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::server::AppServer;

/// The API routes. Health, readiness and metrics are wired separately
/// in main so they stay up even if the API state changes shape.
pub fn api_router(server: Arc<AppServer>) -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route(
            "/invites",
            post(invites::create_invite).get(invites::list_invites),
        )
        .route("/invites/validate", get(invites::validate_invite))
        .route("/invites/track/view", post(invites::track_view))
        .route("/invites/accept", post(invites::accept_invite))
        .route("/invites/decline", post(invites::decline_invite))
        .route(
            "/invites/:invite_id",
            patch(invites::edit_invite).delete(invites::revoke_invite),
        )
        .route("/institutions", post(institutions::create_institution))
        .route(
            "/institutions/:institution_id",
            get(institutions::get_institution),
        )
        .route("/campaigns", post(campaigns::create_campaign))
        .route(
            "/campaigns/:campaign_id/recipients",
            post(campaigns::add_recipients).get(campaigns::list_recipients),
        )
        .route("/campaigns/:campaign_id/send", post(campaigns::send_campaign))
        .with_state(server)
}
