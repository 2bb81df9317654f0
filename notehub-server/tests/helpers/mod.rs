//! Shared test utilities: temp-dir backed app, request helpers, accounts

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use notehub_common::config::ServerConfig;
use notehub_common::models::{Note, Permission};
use notehub_server::db::notes::{self, NewNote};
use notehub_server::{build_router, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// Router plus the state and folder behind it
///
/// The TempDir must be kept alive for the duration of the test.
pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub router: Router,
}

/// Raw response pieces
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn header(&self, name: header::HeaderName) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

pub async fn test_app_with(configure: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = ServerConfig::for_root(dir.path()).unwrap();
    configure(&mut config);
    config.ensure_directories().unwrap();

    let db = notehub_common::db::init_database(&config.db_path).await.unwrap();
    let state = AppState::new(db, config);
    let router = build_router(state.clone());

    TestApp { dir, state, router }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> RawResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        RawResponse { status, headers, body }
    }

    /// Send a request with an optional session cookie and JSON body
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        session: Option<&str>,
        body: Option<Value>,
    ) -> RawResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = session {
            builder = builder.header(header::COOKIE, format!("session={}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> RawResponse {
        self.call(Method::GET, uri, session, None).await
    }

    /// Register an account and return its id and session token
    pub async fn register(&self, username: &str) -> (Uuid, String) {
        let response = self
            .call(
                Method::POST,
                "/register",
                None,
                Some(serde_json::json!({ "username": username, "password": "secret-password" })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "register failed: {}", response.text());

        let id: Uuid = response.json()["id"].as_str().unwrap().parse().unwrap();
        (id, session_token(&response.headers).unwrap())
    }

    /// Insert a note directly
    pub async fn note(&self, owner: Option<Uuid>, content: &str, permission: Permission) -> Note {
        notes::create_note(
            &self.state.db,
            NewNote {
                owner_id: owner,
                alias: None,
                content: content.to_string(),
                permission,
            },
        )
        .await
        .unwrap()
    }

    /// Create a tag through the API and return its id
    pub async fn tag(&self, session: &str, name: &str) -> i64 {
        let response = self
            .call(
                Method::PUT,
                "/api/tag",
                Some(session),
                Some(serde_json::json!({ "name": name })),
            )
            .await;
        assert_eq!(response.json()["status"], "ok", "tag failed: {}", response.text());
        response.json()["tag"]["id"].as_i64().unwrap()
    }

    pub async fn tag_count(&self, tag_id: i64) -> i64 {
        sqlx::query_scalar("SELECT count FROM tags WHERE id = ?")
            .bind(tag_id)
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }

    /// Number of notes whose tag list holds the tag
    pub async fn tag_references(&self, tag_id: i64) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notes, json_each(notes.tag_id_list) WHERE json_each.value = ?",
        )
        .bind(tag_id)
        .fetch_one(&self.state.db)
        .await
        .unwrap()
    }
}

/// The `session` value among a response's Set-Cookie headers
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| cookie.strip_prefix("session="))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
}

/// All Set-Cookie values of a response
pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}
