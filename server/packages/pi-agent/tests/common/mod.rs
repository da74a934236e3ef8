#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

use pi_agent::llm::providers::{ProviderEndpoints, Timeouts};
use pi_agent::llm::Orchestrator;
use pi_agent::router::{build_router, AppState};
use pi_agent::session_store::SessionStore;
use pi_agent::terminal::TerminalRegistry;
use pi_agent_credentials::CredentialResolver;

pub struct TestApp {
    pub app: Router,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_endpoints(ProviderEndpoints::all("http://127.0.0.1:1"))
    }

    pub fn with_endpoints(endpoints: ProviderEndpoints) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let credentials = CredentialResolver::new(dir.path().join("config.json")).without_env();
        let llm = Orchestrator::new(endpoints, fast_timeouts()).expect("build orchestrator");
        let state = AppState::new(
            credentials,
            SessionStore::new(dir.path().join("sessions")),
            llm,
            TerminalRegistry::default().with_working_dir(dir.path()),
        );
        Self {
            app: build_router(state),
            dir,
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.dir.path().join("sessions")
    }
}

pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(2),
        request: Duration::from_secs(5),
        idle: Duration::from_secs(5),
    }
}

pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Vec<u8>>,
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request_body = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(body)
        }
        None => Body::empty(),
    };
    let request = builder.body(request_body).expect("build request");
    let response = app.clone().oneshot(request).await.expect("request handled");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    (status, headers, bytes.to_vec())
}

pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, bytes) =
        send_raw(app, method, uri, body.map(|body| body.to_string().into_bytes())).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response json")
    };
    (status, value)
}

/// Split an NDJSON body into its envelopes.
pub fn ndjson(bytes: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("ndjson line"))
        .collect()
}
