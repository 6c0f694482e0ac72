//! Shared helpers for the HTTP integration tests.
//!
//! Each test builds its own [`TestApp`] over a private in-memory database, so tests
//! never observe each other's rows.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use projecthub_server::{app, config::Config, db::Database, AppState};

pub const ADMIN_EMAIL: &str = "admin@admin.com";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const PASSWORD: &str = "secret123";
pub const LONG_AGO: &str = "2000-01-01T00:00:00+00:00";

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub config: Config,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();

        let config = Config::default();
        db.ensure_default_admin(&config.default_admin_email, &config.default_admin_password)
            .await
            .unwrap();

        let router = app(AppState {
            db: db.clone(),
            config: config.clone(),
        });

        Self { router, db, config }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Creates an account through the admin API and returns `(user, token)`.
    pub async fn create_user(&self, admin_token: &str, email: &str, role: &str) -> (Value, String) {
        let response = self
            .post(
                "/api/users",
                admin_token,
                json!({
                    "firstName": "Test",
                    "lastName": "Person",
                    "email": email,
                    "password": PASSWORD,
                    "role": role,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);

        let token = self.login(email, PASSWORD).await;
        (response.body, token)
    }

    pub async fn create_project(&self, token: &str, name: &str) -> Value {
        let response = self
            .post("/api/projects", token, json!({ "name": name }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body
    }

    pub async fn create_task(&self, token: &str, project_id: &str, title: &str) -> Value {
        let response = self
            .post(
                "/api/tasks",
                token,
                json!({ "title": title, "projectId": project_id, "plannedHours": 4.0 }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body
    }

    /// Sets a task's `updated_at` to [`LONG_AGO`] so any later refresh is visible.
    pub async fn backdate_task(&self, id: &str) -> DateTime<FixedOffset> {
        let long_ago = DateTime::parse_from_rfc3339(LONG_AGO).unwrap();
        sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
            .bind(long_ago.with_timezone(&Utc))
            .bind(id)
            .execute(&self.db.pool)
            .await
            .unwrap();
        long_ago
    }
}

pub fn id_of(record: &Value) -> String {
    record["id"].as_str().unwrap().to_string()
}

pub fn timestamp(value: &Value) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value.as_str().unwrap()).unwrap()
}
