#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{
    Method, Request, StatusCode,
    header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
};
use eventshare::{AppState, Config, db, router};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub state: Arc<AppState>,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub session: Option<String>,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = Config::in_memory();
        let pool = db::connect(&config.database_url)
            .await
            .expect("in-memory database");
        let state = AppState::new(pool, config);
        let router = router(state.clone());
        Self { state, router }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.state.pool
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        session: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(session) = session {
            builder = builder.header(COOKIE, session);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let session = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            body,
            session,
        }
    }

    pub async fn get(&self, uri: &str, session: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(session), None).await
    }

    pub async fn post(&self, uri: &str, session: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(session), Some(body))
            .await
    }

    pub async fn patch(&self, uri: &str, session: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, Some(session), Some(body))
            .await
    }

    pub async fn put(&self, uri: &str, session: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(session), Some(body))
            .await
    }

    pub async fn delete(&self, uri: &str, session: &str) -> TestResponse {
        self.request(Method::DELETE, uri, Some(session), None)
            .await
    }

    /// Register `username` (password `password123`) and return the session cookie.
    pub async fn register(&self, username: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "password123",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.session.expect("session cookie")
    }

    pub async fn follow(&self, session: &str, username: &str) {
        let response = self
            .request(
                Method::POST,
                &format!("/api/users/{username}/follow"),
                Some(session),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    }

    /// Create an event and return its id.
    pub async fn create_event(&self, session: &str, body: Value) -> i64 {
        let response = self.post("/api/events", session, body).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"].as_i64().expect("event id")
    }
}
