//! Campaign handler tests: bulk recipient tracking from queue through
//! delivery and engagement.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use chrono::Utc;

use accred_storage::{CampaignId, InstitutionId, InviteId, RecipientStatus, Role, Store};

use super::super::common::*;
use crate::auth::Actor;
use crate::error::ApiError;
use crate::handlers::campaigns::*;
use crate::handlers::invites::{self, AcceptRequest, TrackViewRequest};
use crate::server::AppServer;

async fn create_campaign_for(
    server: &Arc<AppServer>,
    actor: &Actor,
    role: &str,
    institution_id: Option<InstitutionId>,
) -> CampaignBody {
    let (_status, Json(campaign)) = create_campaign(
        State(server.clone()),
        actor.clone(),
        Json(CreateCampaignRequest {
            name: "2026 intake".to_string(),
            role: role.to_string(),
            institution_id: institution_id.map(|i| i.0),
        }),
    )
    .await
    .unwrap();
    campaign
}

#[tokio::test]
async fn add_recipients_dedups_and_lists() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let inst = create_test_institution(&server, "College").await;
    let campaign = create_campaign_for(&server, &actor, "STUDENT", Some(inst.id.clone())).await;

    let Json(resp) = add_recipients(
        State(server.clone()),
        actor.clone(),
        Path(campaign.id),
        Json(AddRecipientsRequest {
            emails: vec![
                "a@college.test".to_string(),
                "b@college.test".to_string(),
                "a@college.test".to_string(),
            ],
        }),
    )
    .await
    .unwrap();
    assert_eq!(resp.added, 2);

    let Json(listed) = list_recipients(
        State(server.clone()),
        actor,
        Path(campaign.id),
        Query(ListRecipientsQuery {
            page: None,
            limit: None,
            status: Some("queued".to_string()),
            search: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(listed.total, 2);
    assert!(listed.recipients.iter().all(|r| r.status == "queued"));
}

#[tokio::test]
async fn add_recipients_rejects_bad_email() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let campaign = create_campaign_for(&server, &actor, "QCTO_REVIEWER", None).await;

    let err = add_recipients(
        State(server.clone()),
        actor,
        Path(campaign.id),
        Json(AddRecipientsRequest {
            emails: vec!["not-an-email".to_string()],
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn campaign_create_rejects_scoping_mismatch() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;

    // An institution-scoped role needs an institution behind it.
    let err = create_campaign(
        State(server.clone()),
        actor,
        Json(CreateCampaignRequest {
            name: "broken".to_string(),
            role: "STUDENT".to_string(),
            institution_id: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn send_issues_invites_and_advances_to_sent() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let inst = create_test_institution(&server, "College").await;
    let campaign = create_campaign_for(&server, &actor, "STUDENT", Some(inst.id.clone())).await;

    add_recipients(
        State(server.clone()),
        actor.clone(),
        Path(campaign.id),
        Json(AddRecipientsRequest {
            emails: vec!["a@college.test".to_string(), "b@college.test".to_string()],
        }),
    )
    .await
    .unwrap();

    let Json(outcome) = send_campaign(State(server.clone()), actor.clone(), Path(campaign.id))
        .await
        .unwrap();
    assert_eq!(outcome.sent, 2);
    assert_eq!(outcome.failed, 0);

    let Json(listed) = list_recipients(
        State(server.clone()),
        actor.clone(),
        Path(campaign.id),
        Query(ListRecipientsQuery {
            page: None,
            limit: None,
            status: Some("sent".to_string()),
            search: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(listed.total, 2);
    // Every sent recipient is backed by a real invite whose stored
    // lookup key is a hex digest, never the secret itself.
    for recipient in &listed.recipients {
        let invite_id = InviteId(recipient.invite_id.unwrap());
        let invite = server.store.get_invite(&invite_id).await.unwrap();
        assert_eq!(invite.token_hash.len(), 64);
        assert!(invite.token_hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(invite.role, Role::Student);
    }

    // Resuming a campaign re-invokes send; with nothing queued it is a
    // no-op rather than a duplicate delivery.
    let Json(outcome) = send_campaign(State(server.clone()), actor, Path(campaign.id))
        .await
        .unwrap();
    assert_eq!(outcome.sent, 0);
    assert_eq!(outcome.failed, 0);
}

#[tokio::test]
async fn engagement_follows_the_invite_lifecycle() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let inst = create_test_institution(&server, "College").await;
    let campaign = create_campaign_for(&server, &actor, "STUDENT", Some(inst.id.clone())).await;

    add_recipients(
        State(server.clone()),
        actor.clone(),
        Path(campaign.id),
        Json(AddRecipientsRequest {
            emails: vec!["learner@college.test".to_string()],
        }),
    )
    .await
    .unwrap();

    // Issue the invite through the invite handler so the plaintext
    // token is known, then bind it to the recipient as the send step
    // would.
    let (invite, token) = create_invite_via_handler(
        &server,
        &actor,
        "learner@college.test",
        "STUDENT",
        Some(inst.id.clone()),
    )
    .await;
    let recipient = &server
        .store
        .list_queued_recipients(&CampaignId(campaign.id))
        .await
        .unwrap()[0];
    server
        .store
        .advance_recipient(
            &recipient.id,
            RecipientStatus::Sent,
            Some(&InviteId(invite.id)),
            Utc::now(),
        )
        .await
        .unwrap();

    // Opening the invite page marks the recipient opened.
    invites::track_view(
        State(server.clone()),
        Json(TrackViewRequest {
            token: token.clone(),
        }),
    )
    .await;
    let rec = server
        .store
        .get_recipient_by_invite(&InviteId(invite.id))
        .await
        .unwrap();
    assert_eq!(rec.status, RecipientStatus::Opened);

    // Accepting moves it to the terminal accepted state.
    invites::accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token,
            name: "Learner".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap();
    let rec = server
        .store
        .get_recipient_by_invite(&InviteId(invite.id))
        .await
        .unwrap();
    assert_eq!(rec.status, RecipientStatus::Accepted);
}

#[tokio::test]
async fn recipient_search_is_case_insensitive() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let campaign = create_campaign_for(&server, &actor, "QCTO_REVIEWER", None).await;

    add_recipients(
        State(server.clone()),
        actor.clone(),
        Path(campaign.id),
        Json(AddRecipientsRequest {
            emails: vec![
                "Alice.Reviewer@qcto.test".to_string(),
                "bob@qcto.test".to_string(),
            ],
        }),
    )
    .await
    .unwrap();

    let Json(found) = list_recipients(
        State(server.clone()),
        actor,
        Path(campaign.id),
        Query(ListRecipientsQuery {
            page: None,
            limit: None,
            status: None,
            search: Some("alice".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.recipients[0].email, "Alice.Reviewer@qcto.test");
}

#[tokio::test]
async fn recipient_listing_paginates() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let campaign = create_campaign_for(&server, &actor, "QCTO_REVIEWER", None).await;

    let emails: Vec<String> = (0..12).map(|i| format!("r{}@qcto.test", i)).collect();
    add_recipients(
        State(server.clone()),
        actor.clone(),
        Path(campaign.id),
        Json(AddRecipientsRequest { emails }),
    )
    .await
    .unwrap();

    let Json(page2) = list_recipients(
        State(server.clone()),
        actor,
        Path(campaign.id),
        Query(ListRecipientsQuery {
            page: Some(2),
            limit: Some(5),
            status: None,
            search: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(page2.total, 12);
    assert_eq!(page2.recipients.len(), 5);
}

#[tokio::test]
async fn institution_admin_cannot_touch_foreign_campaign() {
    let server = create_test_server().await;
    let (_padmin, platform_actor) = create_platform_admin(&server).await;
    let own = create_test_institution(&server, "Own").await;
    let other = create_test_institution(&server, "Other").await;
    let campaign =
        create_campaign_for(&server, &platform_actor, "STUDENT", Some(other.id.clone())).await;

    let (_iadmin, inst_actor) = create_test_user(
        &server,
        "inst-admin@own.test",
        Role::InstitutionAdmin,
        Some(own.id.clone()),
    )
    .await;

    let err = send_campaign(State(server.clone()), inst_actor, Path(campaign.id))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}
