#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use geo_file_manager::config::{AuthConfig, Config, ServerConfig, StorageConfig};
use geo_file_manager::object_store::LocalStore;
use geo_file_manager::storage::Database;
use geo_file_manager::{api, AppState};

pub const BOUNDARY: &str = "geo-file-manager-test-boundary";

pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub state: Arc<AppState>,
    pub router: Router,
}

pub fn test_config(dir: &tempfile::TempDir) -> Config {
    Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            public_base_url: None,
        },
        storage: StorageConfig {
            database_path: dir.path().join("meta.redb").to_string_lossy().to_string(),
            upload_dir: dir.path().join("uploads").to_string_lossy().to_string(),
            public_uploads: true,
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret-0123456789abcdef".to_string(),
            token_ttl_secs: 3600,
            password_iterations: 1_000,
        },
        max_upload_size: 1024 * 1024,
        reconcile_on_startup: false,
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(|_| {})
}

pub fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);

    let db = Database::open(&config.storage.database_path).unwrap();
    let store = LocalStore::new(&config.storage.upload_dir).unwrap();
    let state = Arc::new(AppState::new(config, db, Arc::new(store)));
    let router = api::create_router(Arc::clone(&state));

    TestApp { dir, state, router }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn upload(
        &self,
        token: &str,
        file_name: &str,
        content: &[u8],
        file_type: Option<&str>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/files/upload")
            .header(header::HOST, "maps.test")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(file_name, content, file_type)))
            .unwrap();
        self.send(request).await
    }

    /// Register a user and log in, returning (user id, token).
    pub async fn user(&self, username: &str) -> (String, String) {
        let email = format!("{username}@example.com");
        let (status, body) = self
            .json(
                Method::POST,
                "/users/register",
                None,
                json!({"username": username, "email": email, "password": "hunter22"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

        let (status, body) = self
            .json(
                Method::POST,
                "/users/login",
                None,
                json!({"email": email, "password": "hunter22"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");

        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }
}

pub fn multipart_body(file_name: &str, content: &[u8], file_type: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(file_type) = file_type {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"fileType\"\r\n\r\n{file_type}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn fail_message(body: &Value) -> &str {
    body["message"].as_str().unwrap_or_default()
}
