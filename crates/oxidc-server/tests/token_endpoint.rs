//! Token endpoint grants: resource owner credentials, scope narrowing,
//! client authentication and the grant-dispatch defaults.

mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn password_grant_issues_all_token_kinds() {
    let app = default_app();

    let response = post_form(
        &app,
        "/token",
        "grant_type=password&username=bob&password=hunter2&client_id=c1&scope=openid%20read",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["access_token"].is_string());
    assert!(json["id_token"].is_string());
    assert!(json["refresh_token"].is_string());
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["scope"], "openid read");

    let access = decode_jwt_payload(json["access_token"].as_str().unwrap());
    assert_eq!(access["sub"], "bob");
}

#[tokio::test]
async fn password_grant_with_bad_credentials_is_invalid_grant() {
    let app = default_app();

    let response = post_form(
        &app,
        "/token",
        "grant_type=password&username=bob&password=wrong&client_id=c1",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn refresh_token_scope_escalation_is_rejected() {
    let app = default_app();

    // A refresh token granted for {openid, read}.
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

    // Asking for {openid, read, write} on refresh must fail.
    let response = post_form(
        &app,
        "/token",
        &format!(
            "grant_type=refresh_token&refresh_token={refresh_token}&client_id=c1\
             &scope=openid%20read%20write"
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    // Narrowing to {read} is allowed.
    let response = post_form(
        &app,
        "/token",
        &format!(
            "grant_type=refresh_token&refresh_token={refresh_token}&client_id=c1&scope=read"
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unimplemented_client_credentials_grant_is_unauthorized() {
    let app = default_app();

    let response = post_form(
        &app,
        "/token",
        "grant_type=client_credentials&client_id=c1&client_secret=s3cr3t",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unauthorized_client");
}

#[tokio::test]
async fn unknown_grant_type_is_unsupported() {
    let app = default_app();

    let response = post_form(
        &app,
        "/token",
        "grant_type=urn%3Aexample%3Agrant&client_id=c1",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "unsupported_grant_type"
    );

    let response = post_form(&app, "/token", "client_id=c1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "unsupported_grant_type"
    );
}

#[tokio::test]
async fn unauthenticated_client_is_rejected() {
    let app = default_app();

    let response = post_form(
        &app,
        "/token",
        "grant_type=password&username=bob&password=hunter2&client_id=evil",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn token_endpoint_requires_a_form_post() {
    let app = default_app();

    // GET is not acceptable.
    let response = get(&app, "/token?grant_type=password").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");

    // Neither is a JSON body.
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/token")
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from(r#"{"grant_type":"password"}"#))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.clone(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn bogus_refresh_token_is_invalid_grant() {
    let app = default_app();

    let response = post_form(
        &app,
        "/token",
        "grant_type=refresh_token&refresh_token=bogus&client_id=c1",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_grant");
    assert_eq!(json["error_description"], "Invalid ticket");
}

#[tokio::test]
async fn form_content_type_parameters_are_tolerated() {
    let app = default_app();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/token")
        .header(
            "Content-Type",
            "Application/X-WWW-Form-URLEncoded; charset=UTF-8",
        )
        .body(axum::body::Body::from(
            "grant_type=password&username=bob&password=hunter2&client_id=c1&scope=openid",
        ))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.clone(), request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
