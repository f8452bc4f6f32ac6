/// Router tests that never reach the database
///
/// Requests here are rejected (or answered) before any query runs, so the
/// app is built over a pool pointing at a closed port.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{offline_app, request, send, test_config};
use foundry_shared::auth::oauth::{create_state, OAuthProviderConfig};
use serde_json::json;

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = offline_app(test_config());

    for (method, uri) in [
        (Method::GET, "/v1/auth/session"),
        (Method::POST, "/v1/auth/sign-out"),
        (Method::GET, "/v1/me"),
        (Method::GET, "/v1/me/preferences"),
        (Method::GET, "/v1/admin/users"),
        (Method::GET, "/v1/admin/audit-logs"),
    ] {
        let response = send(&app, request(method.clone(), uri, None, None)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(response.body["error"], "unauthorized");
    }
}

#[tokio::test]
async fn test_non_bearer_authorization_is_rejected() {
    let app = offline_app(test_config());

    let req = axum::http::Request::builder()
        .uri("/v1/me")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = send(&app, req).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "bad_request");
}

#[tokio::test]
async fn test_forged_token_is_rejected() {
    let app = offline_app(test_config());

    let response = send(&app, request(Method::GET, "/v1/me", Some("not.a.jwt"), None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_up_validation_errors() {
    let app = offline_app(test_config());

    let body = json!({ "email": "not-an-email", "password": "x", "name": "" });
    let response = send(&app, request(Method::POST, "/v1/auth/sign-up/email", None, Some(body))).await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["error"], "validation_error");

    let fields: Vec<&str> = response.body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"name"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = offline_app(test_config());

    let req = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/v1/auth/sign-in/email")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{\"email\":"))
        .unwrap();
    let response = send(&app, req).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "bad_request");
}

#[tokio::test]
async fn test_dev_routes_hidden_unless_enabled() {
    let app = offline_app(test_config());
    let response = send(&app, request(Method::GET, "/v1/dev/changes", None, None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let mut config = test_config();
    config.dev_mode.enabled = true;
    let app = offline_app(config);
    let response = send(&app, request(Method::GET, "/v1/dev/changes", None, None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = offline_app(test_config());
    let response = send(&app, request(Method::GET, "/v1/nothing-here", None, None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = offline_app(test_config());
    let response = send(&app, request(Method::GET, "/v1/me", None, None)).await;

    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert_eq!(response.headers["x-frame-options"], "DENY");
    assert!(response.headers.get("strict-transport-security").is_none());

    let mut config = test_config();
    config.api.production = true;
    let app = offline_app(config);
    let response = send(&app, request(Method::GET, "/v1/nothing-here", None, None)).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.headers.get("strict-transport-security").is_some());
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = offline_app(test_config());

    let req = axum::http::Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/auth/sign-in/email")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = send(&app, req).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
}

#[tokio::test]
async fn test_health_reports_degraded_database() {
    let app = offline_app(test_config());
    let response = send(&app, request(Method::GET, "/health", None, None)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "degraded");
    assert_eq!(response.body["database"], "disconnected");
    assert_eq!(response.body["version"], env!("CARGO_PKG_VERSION"));
}

fn github_config() -> foundry_api::config::Config {
    let mut config = test_config();
    config.oauth.providers.insert(
        "github".to_string(),
        OAuthProviderConfig {
            kind: None,
            client_id: "gh-client".to_string(),
            client_secret: "gh-secret".to_string(),
            redirect_url: "http://localhost:8080/v1/auth/oauth/github/callback".to_string(),
            authorize_url: None,
            token_url: None,
            userinfo_url: None,
            scopes: None,
        },
    );
    config
}

#[tokio::test]
async fn test_oauth_authorize_redirects_to_provider() {
    let app = offline_app(github_config());
    let response = send(&app, request(Method::GET, "/v1/auth/oauth/github", None, None)).await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    let location = response.headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://github.com/login/oauth/authorize?"));
    assert!(location.contains("client_id=gh-client"));
    assert!(location.contains("state="));
}

#[tokio::test]
async fn test_oauth_unknown_provider() {
    let app = offline_app(github_config());
    let response = send(&app, request(Method::GET, "/v1/auth/oauth/myspace", None, None)).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "not_found");
}

#[tokio::test]
async fn test_oauth_callback_rejections() {
    let app = offline_app(github_config());

    let denied = send(
        &app,
        request(
            Method::GET,
            "/v1/auth/oauth/github/callback?error=access_denied",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(denied.status, StatusCode::BAD_REQUEST);

    let no_code = send(
        &app,
        request(Method::GET, "/v1/auth/oauth/github/callback?state=abc", None, None),
    )
    .await;
    assert_eq!(no_code.status, StatusCode::BAD_REQUEST);

    let bad_state = send(
        &app,
        request(
            Method::GET,
            "/v1/auth/oauth/github/callback?code=abc&state=forged",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(bad_state.status, StatusCode::BAD_REQUEST);

    // State minted for another provider
    let state = create_state("google", common::TEST_SECRET).unwrap();
    let mismatched = send(
        &app,
        request(
            Method::GET,
            &format!("/v1/auth/oauth/github/callback?code=abc&state={}", state),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(mismatched.status, StatusCode::BAD_REQUEST);
}
