//! Validation (introspection) endpoint behavior.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

/// An access-token-shaped JWT with the given expiration offset, signed with
/// the server's own key.
fn access_token(issued_offset: i64, expires_offset: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    signed_jwt(&json!({
        "sub": "alice",
        "iss": TEST_ISSUER,
        "aud": "c1",
        "iat": now + issued_offset,
        "exp": now + expires_offset,
        "scope": "openid",
    }))
}

#[tokio::test]
async fn valid_access_token_discloses_claims_and_lifetime() {
    let token = access_token(-60, 3_600);
    let app = default_app();

    let response = post_form(&app, "/validate", &format!("token={token}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["audiences"], json!(["c1"]));
    assert!(json["expires_in"].as_i64().unwrap() > 0);
    assert!(
        json["claims"]
            .as_array()
            .unwrap()
            .iter()
            .any(|claim| claim["type"] == "sub" && claim["value"] == "alice")
    );
}

#[tokio::test]
async fn expired_access_token_is_reported_as_such() {
    let token = access_token(-7_200, -3_600);
    let app = default_app();

    let response = post_form(&app, "/validate", &format!("token={token}")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_grant");
    assert_eq!(json["error_description"], "Expired access token received");
}

#[tokio::test]
async fn garbage_token_is_invalid() {
    let app = default_app();

    let response = post_form(&app, "/validate", "token=not.a.jwt").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_grant");
    assert_eq!(json["error_description"], "Invalid access token received");
}

#[tokio::test]
async fn exactly_one_token_parameter_is_required() {
    let app = default_app();

    let token = access_token(-60, 3_600);
    let response = post_form(
        &app,
        "/validate",
        &format!("token={token}&refresh_token=whatever"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");

    let response = post_form(&app, "/validate", "").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn requested_audiences_must_be_a_subset() {
    let token = access_token(-60, 3_600);
    let app = default_app();

    // Asking about an audience the token was not issued for fails.
    let response = post_form(
        &app,
        "/validate",
        &format!("token={token}&audience=c1%20other"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    // Asking about the granted audience succeeds.
    let response = post_form(&app, "/validate", &format!("token={token}&audience=c1")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_tokens_can_be_introspected() {
    let app = default_app();

    let json = body_json(
        post_form(
            &app,
            "/token",
            "grant_type=password&username=bob&password=hunter2&client_id=c1\
             &scope=openid%20read",
        )
        .await,
    )
    .await;
    let refresh_token = json["refresh_token"].as_str().unwrap().to_string();

    let response = post_form(
        &app,
        "/validate",
        &format!("refresh_token={refresh_token}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["expires_in"].as_i64().unwrap() > 0);
    assert!(
        json["claims"]
            .as_array()
            .unwrap()
            .iter()
            .any(|claim| claim["type"] == "sub" && claim["value"] == "bob")
    );
}

#[tokio::test]
async fn introspection_accepts_get_requests() {
    let token = access_token(-60, 3_600);
    let app = default_app();

    let response = get(&app, &format!("/validate?token={token}")).await;
    assert_eq!(response.status(), StatusCode::OK);
}
