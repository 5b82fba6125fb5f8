//! Auth handler tests.

use axum::extract::{Json, State};

use accred_storage::Role;

use super::super::common::*;
use crate::auth::verify_token;
use crate::error::ApiError;
use crate::handlers::auth::*;

#[tokio::test]
async fn login_issues_verifiable_token() {
    let server = create_test_server().await;
    let (user, _actor) = create_platform_admin(&server).await;

    let Json(resp) = login(
        State(server.clone()),
        Json(LoginRequest {
            email: user.email.clone(),
            password: "correct-password".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(resp.user.email, user.email);
    assert_eq!(resp.user.role, "PLATFORM_ADMIN");

    let actor = verify_token(&resp.token, &server.config.jwt_secret).unwrap();
    assert_eq!(actor.user_id, user.id);
    assert_eq!(actor.role, Role::PlatformAdmin);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let server = create_test_server().await;
    let (user, _actor) = create_platform_admin(&server).await;

    let err = login(
        State(server.clone()),
        Json(LoginRequest {
            email: user.email,
            password: "wrong-password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
}

#[tokio::test]
async fn login_unknown_email_answers_like_wrong_password() {
    let server = create_test_server().await;

    let err = login(
        State(server.clone()),
        Json(LoginRequest {
            email: "nobody@x.test".to_string(),
            password: "whatever-password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    match err {
        ApiError::Unauthorized(msg) => assert_eq!(msg, "invalid credentials"),
        other => panic!("expected Unauthorized, got {:?}", other),
    }
}
