#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use microblog::clock::ManualClock;
use microblog::jwt::JwtConfig;
use microblog::password::{MIN_BCRYPT_COST, PasswordHasher};
use microblog::{ServerConfig, create_app, db::Database};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"integration-access-secret-0123456789";
pub const REFRESH_SECRET: &[u8] = b"integration-refresh-secret-0123456789";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub clock: Arc<ManualClock>,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(None, None).await
}

pub async fn create_test_app_with(base: Option<&str>, login_rate_limit: Option<u32>) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = Arc::new(ManualClock::starting_now());
    let jwt = Arc::new(
        JwtConfig::with_clock(ACCESS_SECRET, REFRESH_SECRET, clock.clone())
            .expect("Invalid JWT config"),
    );
    let config = ServerConfig {
        base: base.map(str::to_string),
        db: db.clone(),
        jwt: jwt.clone(),
        hasher: PasswordHasher::new(MIN_BCRYPT_COST).expect("Failed to create hasher"),
        login_rate_limit: login_rate_limit.and_then(NonZeroU32::new),
    };

    TestApp {
        router: create_app(&config),
        db,
        jwt,
        clock,
    }
}

impl TestApp {
    /// Send a request and return the status and parsed JSON body
    /// (`Value::Null` when the body is empty or not JSON).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    /// Send a prebuilt request.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, None, Some(body)).await
    }

    /// Register a user via the API, panicking on failure.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Value {
        let (status, json) = self
            .post(
                "/auth/register",
                serde_json::json!({
                    "username": username,
                    "email": email,
                    "password": password,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {json}");
        json
    }

    /// Log in via the API, returning (access_token, refresh_token).
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let (status, json) = self
            .post(
                "/auth/login",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {json}");
        (
            json["access_token"].as_str().unwrap().to_string(),
            json["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    /// Register and log in, returning the access token.
    pub async fn signed_in(&self, username: &str) -> String {
        let email = format!("{}@example.com", username);
        self.register(username, &email, "secret1").await;
        self.login(&email, "secret1").await.0
    }
}
