use super::db::TestDb;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rentdesk::settings::Settings;
use rentdesk::storage::User;
use rentdesk::tokens::TokenManager;
use rentdesk::web::{build_router, AppState};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// In-process application: router, database and upload dir, all temporary.
pub struct TestApp {
    pub router: Router,
    pub tokens: TokenManager,
    pub uploads: TempDir,
    db: TestDb,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = TestDb::new().await;
        let uploads = TempDir::new().expect("Failed to create uploads dir");

        let mut settings = Settings::default();
        settings.uploads.dir = uploads.path().to_path_buf();

        let state = AppState::new(settings, db.connection().clone());
        let tokens = state.tokens.clone();

        Self {
            router: build_router(state),
            tokens,
            uploads,
            db,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.db.connection()
    }

    pub fn token_for(&self, user: &User) -> String {
        self.tokens
            .issue(&user.email, user.role)
            .expect("Failed to issue test token")
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        self.call(Method::PUT, uri, token, body).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.call(Method::DELETE, uri, token, None).await
    }
}
