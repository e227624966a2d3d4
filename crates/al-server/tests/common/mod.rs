#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;

use al_server::config::{
    AppConfig, LoggingConfig, ModelsConfig, ServerConfig, StorageConfig, UserConfig,
};
use al_server::handler::AppState;
use al_server::rng::StdRandom;

pub const ADMIN_ID: &str = "alice";
pub const ADMIN_KEY: &str = "al-sk-alice0000000000000000";
pub const MEMBER_ID: &str = "bob";
pub const MEMBER_KEY: &str = "al-sk-bob000000000000000000";
pub const OUTSIDER_KEY: &str = "al-sk-carol00000000000000000";

// ---------------------------------------------------------------------------
// TestServer: the real router on an ephemeral port, in-memory store
// ---------------------------------------------------------------------------

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub client: reqwest::Client,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Admin `alice`, plain users `bob` and `carol`.
    pub async fn start() -> Self {
        let users = vec![
            UserConfig {
                id: ADMIN_ID.to_owned(),
                api_key: ADMIN_KEY.to_owned(),
                admin: true,
            },
            UserConfig {
                id: MEMBER_ID.to_owned(),
                api_key: MEMBER_KEY.to_owned(),
                admin: false,
            },
            UserConfig {
                id: "carol".to_owned(),
                api_key: OUTSIDER_KEY.to_owned(),
                admin: false,
            },
        ];

        let config = AppConfig {
            server: ServerConfig {
                listen: "127.0.0.1:0".to_owned(),
            },
            storage: StorageConfig {
                path: ":memory:".to_owned(),
            },
            models: ModelsConfig { seed: Some(7) },
            logging: LoggingConfig::default(),
            users,
        };

        let runtime =
            al_server::bootstrap::into_runtime(config).expect("test config should be valid");
        let store = runtime.storage.open().expect("in-memory store");
        let state = Arc::new(AppState::new(
            runtime.auth_service,
            store,
            Arc::new(StdRandom::new(runtime.seed)),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().unwrap();

        let serve_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            al_server::routes::serve(listener, serve_state).await.ok();
        });

        Self {
            addr,
            state,
            client: reqwest::Client::new(),
            _handle: handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        key: &str,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut req = self
            .client
            .request(method, format!("{}{path}", self.url()))
            .header("Authorization", format!("Bearer {key}"));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.expect("request should succeed");
        let status = resp.status().as_u16();
        let text = resp.text().await.expect("response body");
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).expect("valid JSON")
        };
        (status, value)
    }

    pub async fn get(&self, path: &str, key: &str) -> (u16, Value) {
        self.send(reqwest::Method::GET, path, key, None).await
    }

    pub async fn post(&self, path: &str, key: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, key, Some(body)).await
    }

    pub async fn put(&self, path: &str, key: &str) -> (u16, Value) {
        self.send(reqwest::Method::PUT, path, key, None).await
    }

    pub async fn patch(&self, path: &str, key: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::PATCH, path, key, Some(body)).await
    }

    pub async fn delete(&self, path: &str, key: &str) -> (u16, Value) {
        self.send(reqwest::Method::DELETE, path, key, None).await
    }

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    /// Creates a project as the admin and adds `bob` to it. Returns its id.
    pub async fn project(&self, project_type: &str) -> i64 {
        let (status, body) = self
            .post(
                "/api/projects",
                ADMIN_KEY,
                serde_json::json!({"name": "test", "project_type": project_type}),
            )
            .await;
        assert_eq!(status, 201, "create project: {body}");
        let id = body["id"].as_i64().expect("project id");

        let (status, _) = self
            .post(
                &format!("/api/projects/{id}/members"),
                ADMIN_KEY,
                serde_json::json!({"user": MEMBER_ID}),
            )
            .await;
        assert_eq!(status, 201);
        id
    }

    pub async fn label(&self, project: i64, text: &str) -> i64 {
        let (status, body) = self
            .post(
                &format!("/api/projects/{project}/labels"),
                ADMIN_KEY,
                serde_json::json!({"text": text}),
            )
            .await;
        assert_eq!(status, 201, "create label: {body}");
        body["id"].as_i64().expect("label id")
    }

    pub async fn document(&self, project: i64, text: &str) -> i64 {
        let (status, body) = self
            .post(
                &format!("/api/projects/{project}/docs"),
                ADMIN_KEY,
                serde_json::json!({"text": text}),
            )
            .await;
        assert_eq!(status, 201, "create document: {body}");
        body["id"].as_i64().expect("document id")
    }

    pub async fn annotate(&self, project: i64, doc: i64, key: &str, body: Value) -> (u16, Value) {
        self.post(
            &format!("/api/projects/{project}/docs/{doc}/annotations"),
            key,
            body,
        )
        .await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
