//! Authorization code flow, end to end: authorization, redemption, refresh,
//! claim filtering and the hybrid-flow hash claims.

mod common;

use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::*;

#[tokio::test]
async fn code_flow_happy_path() {
    let app = default_app();

    // Authorization: the host signs alice in immediately.
    let response = get(
        &app,
        "/auth?response_type=code&client_id=c1&redirect_uri=https%3A%2F%2Frp%2Fcb\
         &scope=openid&state=s1&nonce=n1",
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let target = location(&response);
    assert!(
        target.starts_with("https://rp/cb?code="),
        "unexpected redirect: {target}"
    );
    let params = response_params(&target, '?');
    assert_eq!(params["state"], "s1");
    let code = params["code"].clone();

    // Redemption.
    let body = format!(
        "grant_type=authorization_code&code={code}\
         &redirect_uri=https%3A%2F%2Frp%2Fcb&client_id=c1"
    );
    let response = post_form(&app, "/token", &body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-cache"
    );
    assert_eq!(response.headers().get("pragma").unwrap(), "no-cache");

    let json = body_json(response).await;
    assert_eq!(json["token_type"], "Bearer");
    assert!(json["access_token"].is_string());
    assert!(json["id_token"].is_string());
    assert!(json["refresh_token"].is_string());
    assert!(json["expires_in"].as_i64().unwrap() > 0);

    // A code is redeemable at most once.
    let response = post_form(&app, "/token", &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn issued_tokens_carry_only_destination_claims() {
    let app = default_app();

    let response = get(
        &app,
        "/auth?response_type=code&client_id=c1&redirect_uri=https%3A%2F%2Frp%2Fcb\
         &scope=openid&state=s1&nonce=n1",
    )
    .await;
    let code = response_params(&location(&response), '?')["code"].clone();

    let body = format!(
        "grant_type=authorization_code&code={code}\
         &redirect_uri=https%3A%2F%2Frp%2Fcb&client_id=c1"
    );
    let json = body_json(post_form(&app, "/token", &body).await).await;

    // The access token keeps sub, drops the id_token-only email claim, and
    // never discloses a claim with no destinations.
    let access = decode_jwt_payload(json["access_token"].as_str().unwrap());
    assert_eq!(access["sub"], "alice");
    assert_eq!(access["iss"], TEST_ISSUER);
    assert!(access.get("email").is_none());
    assert!(access.get("internal_note").is_none());

    // The identity token keeps email, targets the client, and also never
    // discloses the destination-less claim.
    let identity = decode_jwt_payload(json["id_token"].as_str().unwrap());
    assert_eq!(identity["sub"], "alice");
    assert_eq!(identity["aud"], "c1");
    assert_eq!(identity["email"], "alice@example.com");
    assert!(identity.get("internal_note").is_none());
}

#[tokio::test]
async fn refresh_token_grant_issues_new_tokens() {
    let app = default_app();

    let response = get(
        &app,
        "/auth?response_type=code&client_id=c1&redirect_uri=https%3A%2F%2Frp%2Fcb\
         &scope=openid&state=s1&nonce=n1",
    )
    .await;
    let code = response_params(&location(&response), '?')["code"].clone();

    let body = format!(
        "grant_type=authorization_code&code={code}\
         &redirect_uri=https%3A%2F%2Frp%2Fcb&client_id=c1"
    );
    let json = body_json(post_form(&app, "/token", &body).await).await;
    let refresh_token = json["refresh_token"].as_str().unwrap().to_string();
    let first_access = json["access_token"].as_str().unwrap().to_string();

    let body = format!("grant_type=refresh_token&refresh_token={refresh_token}&client_id=c1");
    let response = post_form(&app, "/token", &body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["access_token"].is_string());
    assert_ne!(json["access_token"].as_str().unwrap(), first_access);

    // Refresh tokens are not single-use; the same one still works.
    let response = post_form(&app, "/token", &body).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn code_bound_redirect_uri_must_match_on_redemption() {
    let app = default_app();

    let response = get(
        &app,
        "/auth?response_type=code&client_id=c1&redirect_uri=https%3A%2F%2Frp%2Fcb\
         &scope=openid&state=s1&nonce=n1",
    )
    .await;
    let code = response_params(&location(&response), '?')["code"].clone();

    let body = format!(
        "grant_type=authorization_code&code={code}\
         &redirect_uri=https%3A%2F%2Fattacker%2Fcb&client_id=c1"
    );
    let response = post_form(&app, "/token", &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn hybrid_flow_identity_token_carries_c_hash_and_nonce() {
    let app = default_app();

    let response = get(
        &app,
        "/auth?response_type=code%20id_token&client_id=c1\
         &redirect_uri=https%3A%2F%2Frp%2Fcb&scope=openid&state=s1&nonce=n1",
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let target = location(&response);
    let params = response_params(&target, '#');
    let code = &params["code"];
    let identity = decode_jwt_payload(&params["id_token"]);

    // c_hash is the left half of SHA-256 over the code, base64 with padding
    // stripped and URL-safe substitution.
    let digest = oxidc_crypto::sha256(code.as_bytes());
    let expected = STANDARD
        .encode(&digest[..digest.len() / 2])
        .trim_end_matches('=')
        .replace('+', "-")
        .replace('/', "_");
    assert_eq!(identity["c_hash"], expected.as_str());
    assert_eq!(identity["nonce"], "n1");
    assert_eq!(params["state"], "s1");
}

#[tokio::test]
async fn token_endpoint_accepts_basic_client_authentication() {
    let app = default_app();

    let response = get(
        &app,
        "/auth?response_type=code&client_id=c1&redirect_uri=https%3A%2F%2Frp%2Fcb\
         &scope=openid&state=s1&nonce=n1",
    )
    .await;
    let code = response_params(&location(&response), '?')["code"].clone();

    let credentials = STANDARD.encode(format!("{TEST_CLIENT_ID}:{TEST_CLIENT_SECRET}"));
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/token")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Authorization", format!("Basic {credentials}"))
        .body(axum::body::Body::from(format!(
            "grant_type=authorization_code&code={code}&redirect_uri=https%3A%2F%2Frp%2Fcb"
        )))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.clone(), request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["access_token"].is_string());
}
