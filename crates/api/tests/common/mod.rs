#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use fanfinder_api::config::ServerConfig;
use fanfinder_api::relay::EventRelay;
use fanfinder_api::router::build_app_router;
use fanfinder_api::state::AppState;
use fanfinder_api::ws::WsManager;
use fanfinder_core::browser::BrowserSignature;
use fanfinder_core::job_type::JobType;
use fanfinder_events::EventBus;
use fanfinder_runner::{JobManager, RunnerConfig};

/// Build a test `ServerConfig` whose jobs run scripts from `script_dir` with bash.
pub fn test_config(script_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        runner: RunnerConfig {
            interpreter: "bash".to_string(),
            script_dirs: vec![script_dir.to_path_buf()],
            stop_grace: Duration::from_secs(2),
            // Nothing on a developer machine matches this, so sweeps are harmless.
            signature: BrowserSignature::new(["fanfinder-test-browser"], ["--fanfinder-test"]),
            ..RunnerConfig::default()
        },
    }
}

/// Router plus the scratch script directory and state behind it.
pub struct TestApp {
    pub dir: TempDir,
    pub router: Router,
    pub state: AppState,
    pub relay_cancel: CancellationToken,
}

impl TestApp {
    pub fn write_script(&self, job_type: JobType, body: &str) {
        std::fs::write(self.dir.path().join(job_type.script_file_name()), body).unwrap();
    }

    /// Stop every instance so no worker outlives the test.
    pub async fn teardown(&self) {
        self.state.jobs.stop_all().await;
        self.relay_cancel.cancel();
    }
}

/// Build the full application, with the same middleware stack and event
/// relay as `main.rs`. Must be called inside a Tokio runtime.
pub fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let event_bus = Arc::new(EventBus::default());
    let jobs = Arc::new(JobManager::new(config.runner.clone(), Arc::clone(&event_bus)));
    let ws_manager = Arc::new(WsManager::new());

    let relay_cancel = CancellationToken::new();
    let relay = EventRelay::new(Arc::clone(&ws_manager), Arc::clone(&jobs));
    tokio::spawn(relay.run(event_bus.subscribe(), relay_cancel.clone()));

    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager,
        jobs,
        event_bus,
    };
    let router = build_app_router(state.clone(), &config);

    TestApp {
        dir,
        router,
        state,
        relay_cancel,
    }
}

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}
