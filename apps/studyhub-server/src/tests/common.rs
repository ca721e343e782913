//! Common test helpers: an app over in-memory SQLite and a small HTTP client.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use studyhub_crypto::{PasswordHashing, PasswordParams};
use studyhub_storage::Store;
use studyhub_store_sqlite::SqliteStore;
use tower::ServiceExt;

use crate::backend::StoreBackend;
use crate::config::{LogFormat, ServerConfig};
use crate::metrics::detached_handle;
use crate::server::{router, AppState};

pub const PASSWORD: &str = "correct horse battery";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        jwt_secret: "test-secret-test-secret-test-secret".to_string(),
        token_ttl_hours: 1,
        sweep_interval: None,
        log_format: LogFormat::Text,
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

/// A signed-in user.
pub struct Caller {
    pub id: String,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        // Cheap parameters; the cost is irrelevant here.
        let passwords = PasswordHashing::new(PasswordParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let state = AppState::new(
            StoreBackend::Sqlite(store),
            &test_config(),
            passwords,
            detached_handle(),
        );
        Self {
            router: router(state.clone()),
            state,
        }
    }

    /// Send one request; the body of a reply with no content comes back as `Null`.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, caller: &Caller) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(&caller.token), None).await
    }

    pub async fn post(&self, uri: &str, caller: &Caller, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(&caller.token), Some(body))
            .await
    }

    pub async fn whitelist(&self, email: &str) {
        self.state
            .engine
            .store()
            .add_whitelisted_email(email, None)
            .await
            .unwrap();
    }

    /// Whitelist, register and log in `{name}@example.com`.
    pub async fn signup(&self, name: &str) -> Caller {
        let email = format!("{name}@example.com");
        self.whitelist(&email).await;

        let (status, _) = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": email, "name": name, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        Caller {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    /// Create a group and return its id.
    pub async fn create_group(&self, leader: &Caller, name: &str, max_members: u32) -> String {
        let (status, body) = self
            .post(
                "/api/groups",
                leader,
                json!({
                    "name": name,
                    "description": "weekly reading",
                    "purpose": "LEARNING",
                    "max_members": max_members,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    /// Send a join request and have the leader approve it.
    pub async fn join(&self, leader: &Caller, group_id: &str, applicant: &Caller) {
        let (status, body) = self
            .post(
                &format!("/api/groups/{group_id}/requests"),
                applicant,
                json!({ "message": "Please let me join the group." }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let request_id = body["id"].as_str().unwrap();

        let (status, body) = self
            .post(
                &format!("/api/groups/{group_id}/requests/{request_id}/respond"),
                leader,
                json!({ "action": "approve" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}
