mod common;

use axum::http::StatusCode;
use common::{TestApp, create_test_app, create_test_app_with};
use microblog::jwt::{ACCESS_TOKEN_DURATION_SECS, JwtError};
use serde_json::json;

async fn refresh(app: &TestApp, token: &str) -> (StatusCode, serde_json::Value) {
    app.post("/auth/refresh", json!({ "refresh_token": token }))
        .await
}

#[tokio::test]
async fn test_full_session_scenario() {
    let app = create_test_app().await;

    let (status, json) = app
        .post(
            "/auth/register",
            json!({"username": "alice", "email": "alice@x.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["message"], "User registered successfully");
    assert_eq!(json["user"]["username"], "alice");
    assert_eq!(json["user"]["email"], "alice@x.com");
    assert!(json["user"]["id"].as_i64().is_some());

    let (status, json) = app
        .post(
            "/auth/login",
            json!({"email": "alice@x.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = json["access_token"].as_str().unwrap().to_string();
    let refresh_token = json["refresh_token"].as_str().unwrap().to_string();
    assert!(!access.is_empty());
    assert!(!refresh_token.is_empty());
    assert_ne!(access, refresh_token);
    assert_eq!(json["user"]["username"], "alice");

    let (status, json) = refresh(&app, &refresh_token).await;
    assert_eq!(status, StatusCode::OK);
    let new_access = json["access_token"].as_str().unwrap();
    let new_refresh = json["refresh_token"].as_str().unwrap();
    assert_ne!(new_access, new_refresh);
    assert_ne!(new_access, access);
    assert_ne!(new_refresh, refresh_token);

    let (status, json) = refresh(&app, &refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_password_hash_never_returned_or_stored_plain() {
    let app = create_test_app().await;

    let registered = app.register("alice", "alice@x.com", "secret1").await;
    let (status, login) = app
        .post(
            "/auth/login",
            json!({"email": "alice@x.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let stored = app
        .db
        .users()
        .get_by_username("alice")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password_hash, "secret1");

    for body in [registered.to_string(), login.to_string()] {
        assert!(!body.contains(&stored.password_hash));
        assert!(!body.contains("secret1"));
        assert!(!body.contains("password"));
    }
}

#[tokio::test]
async fn test_register_duplicate_username() {
    let app = create_test_app().await;
    app.register("alice", "alice@x.com", "secret1").await;

    let (status, json) = app
        .post(
            "/auth/register",
            json!({"username": "alice", "email": "other@x.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Username already taken");
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = create_test_app().await;
    app.register("alice", "alice@x.com", "secret1").await;

    let (status, json) = app
        .post(
            "/auth/register",
            json!({"username": "bob", "email": "alice@x.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Email already registered");
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = create_test_app().await;

    let cases = [
        json!({"username": "al", "email": "al@x.com", "password": "secret1"}),
        json!({"username": "al!ce", "email": "alice@x.com", "password": "secret1"}),
        json!({"username": "alice", "email": "alice", "password": "secret1"}),
        json!({"username": "alice", "email": "alice@x.com", "password": "12345"}),
        json!({"username": "alice", "email": "alice@x.com"}),
        json!({"username": 5, "email": "alice@x.com", "password": "secret1"}),
    ];

    for body in cases {
        let (status, json) = app.post("/auth/register", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let app = create_test_app().await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid request data");
}

#[tokio::test]
async fn test_login_failures_identical() {
    let app = create_test_app().await;
    app.register("alice", "alice@x.com", "secret1").await;

    let wrong_password = app
        .post(
            "/auth/login",
            json!({"email": "alice@x.com", "password": "wrong-password"}),
        )
        .await;
    let unknown_email = app
        .post(
            "/auth/login",
            json!({"email": "nobody@x.com", "password": "secret1"}),
        )
        .await;

    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password.1["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_missing_fields() {
    let app = create_test_app().await;

    let (status, _) = app
        .post("/auth/login", json!({"email": "alice@x.com"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/auth/login", json!({"email": "", "password": ""}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_rejects_bad_email_and_oversized_password() {
    let app = create_test_app().await;
    let password = "p".repeat(72);
    app.register("alice", "alice@x.com", &password).await;

    let (status, json) = app
        .post(
            "/auth/login",
            json!({"email": "alice-at-x.com", "password": password}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid email format");

    let (status, _) = app
        .post(
            "/auth/login",
            json!({"email": "alice@x.com", "password": format!("{password}extra")}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/auth/login",
            json!({"email": "alice@x.com", "password": password}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_access_token_expires_on_simulated_clock() {
    let app = create_test_app().await;
    app.register("alice", "alice@x.com", "secret1").await;
    let (access, _) = app.login("alice@x.com", "secret1").await;

    assert_eq!(app.jwt.validate_access(&access).unwrap(), "alice");

    app.clock.advance(ACCESS_TOKEN_DURATION_SECS);
    assert!(matches!(
        app.jwt.validate_access(&access),
        Err(JwtError::Expired)
    ));

    let (status, _) = app
        .request("POST", "/auth/logout", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rejects_bad_tokens() {
    let app = create_test_app().await;
    app.register("alice", "alice@x.com", "secret1").await;
    let (access, _) = app.login("alice@x.com", "secret1").await;

    // Access tokens are signed with a different key
    let (status, _) = refresh(&app, &access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = refresh(&app, "garbage").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = refresh(&app, "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/auth/refresh", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_token_expires_after_seven_days() {
    let app = create_test_app().await;
    app.register("alice", "alice@x.com", "secret1").await;
    let (_, refresh_token) = app.login("alice@x.com", "secret1").await;

    app.clock.advance(7 * 24 * 60 * 60);
    let (status, _) = refresh(&app, &refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let app = create_test_app().await;
    app.register("alice", "alice@x.com", "secret1").await;
    let (access, refresh_token) = app.login("alice@x.com", "secret1").await;

    let (status, json) = app
        .request("POST", "/auth/logout", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Logged out successfully");

    let (status, _) = refresh(&app, &refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The access token itself stays valid until it expires
    let (status, _) = app
        .request("POST", "/auth/logout", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_new_login_invalidates_previous_refresh_token() {
    let app = create_test_app().await;
    app.register("alice", "alice@x.com", "secret1").await;

    let (_, first) = app.login("alice@x.com", "secret1").await;
    let (_, second) = app.login("alice@x.com", "secret1").await;

    assert_eq!(refresh(&app, &first).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(refresh(&app, &second).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_ping() {
    let app = create_test_app().await;

    let (status, json) = app.get("/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "pong");
}

#[tokio::test]
async fn test_base_path_prefixes_api_routes() {
    let app = create_test_app_with(Some("/api"), None).await;

    let (status, _) = app
        .post(
            "/api/auth/register",
            json!({"username": "alice", "email": "alice@x.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .post(
            "/auth/login",
            json!({"email": "alice@x.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Ping stays at the root
    let (status, _) = app.get("/ping").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_rate_limit() {
    let app = create_test_app_with(None, Some(2)).await;
    let body = json!({"email": "nobody@x.com", "password": "secret1"});

    assert_eq!(
        app.post("/auth/login", body.clone()).await.0,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.post("/auth/login", body.clone()).await.0,
        StatusCode::UNAUTHORIZED
    );

    let (status, json) = app.post("/auth/login", body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(json["error"].is_string());

    // Refresh is not rate limited
    let (status, _) = refresh(&app, "garbage").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
