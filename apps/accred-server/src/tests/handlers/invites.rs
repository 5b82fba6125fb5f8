//! Invite handler tests: the full lifecycle from creation through
//! validation, viewing, acceptance, decline, expiry and admin edits.

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use chrono::{Duration, Utc};

use accred_storage::{CreateInviteParams, InviteStatus, Role, Store};

use super::super::common::*;
use crate::error::ApiError;
use crate::handlers::invites::*;
use crate::server::hash_token;

#[tokio::test]
async fn validate_roundtrip_returns_role_and_institution() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let inst = create_test_institution(&server, "Tech College").await;

    let (_invite, token) = create_invite_via_handler(
        &server,
        &actor,
        "staff@college.test",
        "INSTITUTION_STAFF",
        Some(inst.id.clone()),
    )
    .await;

    let Json(resp) = validate_invite(
        State(server.clone()),
        Query(ValidateQuery { token }),
    )
    .await
    .unwrap();

    assert!(resp.valid);
    assert_eq!(resp.existing_user, Some(false));
    let invite = resp.invite.unwrap();
    assert_eq!(invite.role, "INSTITUTION_STAFF");
    assert_eq!(invite.institution.unwrap().id, inst.id.0);
    assert_eq!(invite.status, "pending");
}

#[tokio::test]
async fn validate_reports_existing_account() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    create_test_user(&server, "known@x.test", Role::QctoReviewer, None).await;

    let (_invite, token) =
        create_invite_via_handler(&server, &actor, "known@x.test", "QCTO_ADMIN", None).await;

    let Json(resp) = validate_invite(State(server.clone()), Query(ValidateQuery { token }))
        .await
        .unwrap();
    assert_eq!(resp.existing_user, Some(true));
}

#[tokio::test]
async fn validate_unknown_token_is_generic_invalid_invite() {
    let server = create_test_server().await;

    let err = validate_invite(
        State(server.clone()),
        Query(ValidateQuery {
            token: "garbled-link-token".to_string(),
        }),
    )
    .await
    .unwrap_err();

    // Existence must not leak; the message is the generic one.
    match err {
        ApiError::NotFound(msg) => assert_eq!(msg, "invalid invite"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn validate_after_expiry_reports_expired() {
    let server = create_test_server().await;
    let (admin, actor) = create_platform_admin(&server).await;

    // Shortest expiry the schema allows, then let it lapse.
    let token = "short-lived-token";
    server
        .store
        .create_invite(&CreateInviteParams {
            token_hash: hash_token(token),
            email: "late@x.test".to_string(),
            role: Role::QctoReviewer,
            institution_id: None,
            expires_at: Utc::now() + Duration::seconds(2),
            created_by: admin.id.clone(),
        })
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    let Json(resp) = validate_invite(
        State(server.clone()),
        Query(ValidateQuery {
            token: token.to_string(),
        }),
    )
    .await
    .unwrap();
    assert!(!resp.valid);
    assert_eq!(resp.reason.as_deref(), Some("expired"));
    assert!(resp.invite.is_none());

    // An accept attempt from the stale form fails the same way.
    let err = accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token: token.to_string(),
            name: "Too Late".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(ref msg) if msg == "expired"));

    // An admin extension replaces the expiry and resurrects the invite.
    let invite = server.store.get_invite_by_token(&hash_token(token)).await.unwrap();
    let Json(edited) = edit_invite(
        State(server.clone()),
        actor,
        Path(invite.id.0),
        Json(EditInviteRequest {
            role: None,
            extend_expiry: Some(true),
        }),
    )
    .await
    .unwrap();
    assert_eq!(edited.status, "pending");

    let Json(resp) = validate_invite(
        State(server.clone()),
        Query(ValidateQuery {
            token: token.to_string(),
        }),
    )
    .await
    .unwrap();
    assert!(resp.valid);
}

#[tokio::test]
async fn accept_creates_account_and_consumes_invite() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let inst = create_test_institution(&server, "College").await;
    let (_invite, token) = create_invite_via_handler(
        &server,
        &actor,
        "learner@college.test",
        "STUDENT",
        Some(inst.id.clone()),
    )
    .await;

    let Json(resp) = accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token: token.clone(),
            name: "New Learner".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(resp.email, "learner@college.test");
    assert_eq!(resp.role, "STUDENT");
    assert_eq!(resp.institution_id, Some(inst.id.0));

    let user = server
        .store
        .get_user_by_email("learner@college.test")
        .await
        .unwrap();
    assert_eq!(user.id.0, resp.user_id);
    assert_eq!(user.role, Role::Student);

    let invite = server
        .store
        .get_invite_by_token(&hash_token(&token))
        .await
        .unwrap();
    assert_eq!(invite.status(Utc::now()), InviteStatus::Used);

    // Second submit of the same form observes the settled state.
    let err = accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token: token.clone(),
            name: "New Learner".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(ref msg) if msg == "already used"));

    // Exactly one account exists for the email.
    let Json(resp) = validate_invite(
        State(server.clone()),
        Query(ValidateQuery { token }),
    )
    .await
    .unwrap();
    assert!(!resp.valid);
    assert_eq!(resp.reason.as_deref(), Some("already used"));
}

#[tokio::test]
async fn accept_links_existing_account_instead_of_duplicating() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let inst = create_test_institution(&server, "College").await;

    let (existing, _) =
        create_test_user(&server, "member@college.test", Role::Student, None).await;

    let (_invite, token) = create_invite_via_handler(
        &server,
        &actor,
        "member@college.test",
        "INSTITUTION_ADMIN",
        Some(inst.id.clone()),
    )
    .await;

    let Json(resp) = accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token,
            name: "Member".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(resp.user_id, existing.id.0);
    let user = server.store.get_user_by_id(&existing.id).await.unwrap();
    assert_eq!(user.role, Role::InstitutionAdmin);
    assert_eq!(user.institution_id, Some(inst.id));
}

#[tokio::test]
async fn accept_enforces_input_validation_server_side() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let (_invite, token) =
        create_invite_via_handler(&server, &actor, "who@x.test", "QCTO_REVIEWER", None).await;

    let err = accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token: token.clone(),
            name: "   ".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token: token.clone(),
            name: "Who".to_string(),
            password: "short".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Failed validation must not consume the invite.
    let invite = server
        .store
        .get_invite_by_token(&hash_token(&token))
        .await
        .unwrap();
    assert_eq!(invite.status(Utc::now()), InviteStatus::Pending);
}

#[tokio::test]
async fn decline_is_terminal_and_blocks_accept() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let (_invite, token) =
        create_invite_via_handler(&server, &actor, "no@x.test", "QCTO_REVIEWER", None).await;

    let status = decline_invite(
        State(server.clone()),
        Json(DeclineRequest {
            token: token.clone(),
            reason: Some("other".to_string()),
            reason_other: Some("duplicate account".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let invite = server
        .store
        .get_invite_by_token(&hash_token(&token))
        .await
        .unwrap();
    assert_eq!(invite.status(Utc::now()), InviteStatus::Declined);
    assert_eq!(invite.decline_note.as_deref(), Some("duplicate account"));

    let Json(resp) = validate_invite(
        State(server.clone()),
        Query(ValidateQuery {
            token: token.clone(),
        }),
    )
    .await
    .unwrap();
    assert!(!resp.valid);
    assert_eq!(resp.reason.as_deref(), Some("no longer valid"));

    let err = accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token,
            name: "Late".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));
}

#[tokio::test]
async fn decline_note_only_kept_for_other_reason() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let (_invite, token) =
        create_invite_via_handler(&server, &actor, "no@x.test", "QCTO_REVIEWER", None).await;

    decline_invite(
        State(server.clone()),
        Json(DeclineRequest {
            token: token.clone(),
            reason: Some("not-interested".to_string()),
            reason_other: Some("should be dropped".to_string()),
        }),
    )
    .await
    .unwrap();

    let invite = server
        .store
        .get_invite_by_token(&hash_token(&token))
        .await
        .unwrap();
    assert_eq!(
        invite.decline_reason,
        Some(accred_storage::DeclineReason::NotInterested)
    );
    assert!(invite.decline_note.is_none());
}

#[tokio::test]
async fn decline_rejects_unknown_reason() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let (_invite, token) =
        create_invite_via_handler(&server, &actor, "no@x.test", "QCTO_REVIEWER", None).await;

    let err = decline_invite(
        State(server.clone()),
        Json(DeclineRequest {
            token: token.clone(),
            reason: Some("changed-my-mind".to_string()),
            reason_other: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Rejected input left the invite untouched.
    let invite = server
        .store
        .get_invite_by_token(&hash_token(&token))
        .await
        .unwrap();
    assert_eq!(invite.status(Utc::now()), InviteStatus::Pending);
}

#[tokio::test]
async fn track_view_is_fire_and_forget() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let (_invite, token) =
        create_invite_via_handler(&server, &actor, "viewer@x.test", "QCTO_REVIEWER", None).await;

    // Unknown token still answers 204.
    let status = track_view(
        State(server.clone()),
        Json(TrackViewRequest {
            token: "nonsense".to_string(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Known token records the view.
    let status = track_view(
        State(server.clone()),
        Json(TrackViewRequest {
            token: token.clone(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let invite = server
        .store
        .get_invite_by_token(&hash_token(&token))
        .await
        .unwrap();
    assert!(invite.viewed_at.is_some());
    // Viewing does not consume anything.
    assert_eq!(invite.status(Utc::now()), InviteStatus::Pending);
}

#[tokio::test]
async fn edit_used_invite_always_fails() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let (invite, token) =
        create_invite_via_handler(&server, &actor, "done@x.test", "QCTO_REVIEWER", None).await;

    accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token,
            name: "Done".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap();

    let err = edit_invite(
        State(server.clone()),
        actor.clone(),
        Path(invite.id),
        Json(EditInviteRequest {
            role: None,
            extend_expiry: Some(true),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(ref msg) if msg == "cannot edit used invite"));

    let err = edit_invite(
        State(server.clone()),
        actor,
        Path(invite.id),
        Json(EditInviteRequest {
            role: Some("QCTO_ADMIN".to_string()),
            extend_expiry: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));
}

#[tokio::test]
async fn edit_changes_role_within_scoping_rules() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let inst = create_test_institution(&server, "College").await;
    let (invite, _token) = create_invite_via_handler(
        &server,
        &actor,
        "staff@college.test",
        "STUDENT",
        Some(inst.id.clone()),
    )
    .await;

    // Institution-bound invite can move between institution roles.
    let Json(edited) = edit_invite(
        State(server.clone()),
        actor.clone(),
        Path(invite.id),
        Json(EditInviteRequest {
            role: Some("INSTITUTION_ADMIN".to_string()),
            extend_expiry: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(edited.role, "INSTITUTION_ADMIN");

    // A platform-wide role cannot keep the institution binding.
    let err = edit_invite(
        State(server.clone()),
        actor,
        Path(invite.id),
        Json(EditInviteRequest {
            role: Some("PLATFORM_ADMIN".to_string()),
            extend_expiry: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn revoke_deletes_unused_and_refuses_used() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;

    let (unused, _token) =
        create_invite_via_handler(&server, &actor, "a@x.test", "QCTO_REVIEWER", None).await;
    let status = revoke_invite(State(server.clone()), actor.clone(), Path(unused.id))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (used, token) =
        create_invite_via_handler(&server, &actor, "b@x.test", "QCTO_REVIEWER", None).await;
    accept_invite(
        State(server.clone()),
        Json(AcceptRequest {
            token,
            name: "B".to_string(),
            password: "long-enough-password".to_string(),
        }),
    )
    .await
    .unwrap();

    let err = revoke_invite(State(server.clone()), actor, Path(used.id))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));
}

#[tokio::test]
async fn create_requires_admin_role() {
    let server = create_test_server().await;
    let (_user, actor) = create_test_user(&server, "student@x.test", Role::Student, None).await;

    let err = create_invite(
        State(server.clone()),
        actor,
        Json(CreateInviteRequest {
            email: "friend@x.test".to_string(),
            role: "STUDENT".to_string(),
            institution_id: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn institution_admin_is_confined_to_own_institution() {
    let server = create_test_server().await;
    let own = create_test_institution(&server, "Own College").await;
    let other = create_test_institution(&server, "Other College").await;
    let (_user, actor) = create_test_user(
        &server,
        "inst-admin@own.test",
        Role::InstitutionAdmin,
        Some(own.id.clone()),
    )
    .await;

    let err = create_invite(
        State(server.clone()),
        actor.clone(),
        Json(CreateInviteRequest {
            email: "poached@other.test".to_string(),
            role: "STUDENT".to_string(),
            institution_id: Some(other.id.0),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // Inviting into their own institution works.
    let (invite, _token) = create_invite_via_handler(
        &server,
        &actor,
        "learner@own.test",
        "STUDENT",
        Some(own.id.clone()),
    )
    .await;
    assert_eq!(invite.institution.unwrap().id, own.id.0);
}

#[tokio::test]
async fn create_rejects_scoping_mismatches() {
    let server = create_test_server().await;
    let (_admin, actor) = create_platform_admin(&server).await;
    let inst = create_test_institution(&server, "College").await;

    // Institution role without an institution.
    let err = create_invite(
        State(server.clone()),
        actor.clone(),
        Json(CreateInviteRequest {
            email: "a@x.test".to_string(),
            role: "INSTITUTION_STAFF".to_string(),
            institution_id: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Platform role with an institution.
    let err = create_invite(
        State(server.clone()),
        actor,
        Json(CreateInviteRequest {
            email: "a@x.test".to_string(),
            role: "PLATFORM_ADMIN".to_string(),
            institution_id: Some(inst.id.0),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn list_scopes_institution_admins_to_their_institution() {
    let server = create_test_server().await;
    let (_padmin, platform_actor) = create_platform_admin(&server).await;
    let own = create_test_institution(&server, "Own").await;
    let other = create_test_institution(&server, "Other").await;

    create_invite_via_handler(
        &server,
        &platform_actor,
        "a@own.test",
        "STUDENT",
        Some(own.id.clone()),
    )
    .await;
    create_invite_via_handler(
        &server,
        &platform_actor,
        "b@other.test",
        "STUDENT",
        Some(other.id.clone()),
    )
    .await;

    let (_iadmin, inst_actor) = create_test_user(
        &server,
        "inst-admin@own.test",
        Role::InstitutionAdmin,
        Some(own.id.clone()),
    )
    .await;

    let Json(listed) = list_invites(
        State(server.clone()),
        inst_actor,
        Query(ListInvitesQuery {
            institution_id: Some(other.id.0),
        }),
    )
    .await
    .unwrap();

    // The requested filter is ignored for institution admins.
    assert_eq!(listed.invites.len(), 1);
    assert_eq!(listed.invites[0].email, "a@own.test");

    let Json(all) = list_invites(
        State(server.clone()),
        platform_actor,
        Query(ListInvitesQuery {
            institution_id: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(all.invites.len(), 2);
}
