use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;

use super::*;
use crate::services::compile::test_support::{EMPTY_MODULE, MockServer, Reply, silent_listener};

fn compile_server() -> MockServer {
    MockServer::start(|hit| match hit.url.as_str() {
        "/rebuild" | "/compile" => Reply::json(
            200,
            json!({"success": true, "output": "ok", "wasm": EMPTY_MODULE}),
        ),
        _ => Reply::text(404, "not found"),
    })
}

fn local_config(server: &MockServer) -> DispatcherConfig {
    DispatcherConfig {
        local_url: server.base_url().to_string(),
        local_artifact_path: None,
        ..DispatcherConfig::default()
    }
}

#[test]
fn test_local_settings_join_paths() {
    let config = DispatcherConfig {
        local_url: "http://localhost:3000/".to_string(),
        ..DispatcherConfig::default()
    };
    let settings = config.local_settings();
    assert_eq!(settings.endpoint, "http://localhost:3000/rebuild");
    assert_eq!(
        settings.artifact_url.as_deref(),
        Some("http://localhost:3000/build/index.wasm")
    );
    assert_eq!(settings.timeout, Duration::from_secs(30));
}

#[tokio::test]
async fn test_defaults_route_to_local_server() {
    let server = compile_server();
    let dispatcher = Dispatcher::new(local_config(&server));
    assert_eq!(dispatcher.selected_kind(), BackendKind::Local);

    let result = dispatcher.compile(CompileRequest::new("x")).await;
    assert!(result.is_success());
    assert_eq!(dispatcher.active_kind().await, Some(BackendKind::Local));
    assert_eq!(server.hits()[0].url, "/rebuild");
}

#[tokio::test]
async fn test_session_options_are_sent() {
    let server = compile_server();
    let mut config = local_config(&server);
    config.options.optimization_level = 3;
    config.options.additional_flags = vec!["-DSAMPLE_RATE=48000".to_string()];
    let dispatcher = Dispatcher::new(config);

    assert!(dispatcher.compile_source("y").await.is_success());
    let body: serde_json::Value = serde_json::from_str(&server.hits()[0].body).unwrap();
    assert_eq!(body["options"]["optimizationLevel"], 3);
    assert_eq!(body["options"]["additionalFlags"][0], "-DSAMPLE_RATE=48000");
}

#[tokio::test]
async fn test_remote_takes_precedence_over_local() {
    let remote = compile_server();
    let local = compile_server();
    let mut config = local_config(&local);
    config.remote_enabled = true;
    config.remote = HttpSettings::new(remote.url("/compile"));

    let dispatcher = Dispatcher::new(config);
    assert!(dispatcher.compile(CompileRequest::new("x")).await.is_success());
    assert_eq!(remote.hits().len(), 1);
    assert!(local.hits().is_empty());
}

#[tokio::test]
async fn test_remote_timeout_is_reported() {
    let (_listener, base) = silent_listener();
    let mut config = DispatcherConfig {
        mode: CompileMode::Remote,
        ..DispatcherConfig::default()
    };
    config.remote = HttpSettings::new(format!("{base}/compile"));
    config.remote.timeout = Duration::from_millis(150);

    let started = Instant::now();
    let result = Dispatcher::new(config)
        .compile(CompileRequest::new("x"))
        .await;
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
}

#[tokio::test]
async fn test_toolchain_asset_failure_falls_back_to_local() {
    let cdn = MockServer::start(|_| Reply::text(404, "not found"));
    let local = compile_server();
    let cache = tempfile::tempdir().unwrap();
    let mut config = local_config(&local);
    config.toolchain_enabled = true;
    config.toolchain = ToolchainSettings::new(cdn.base_url(), cache.path());

    let (tx, mut status) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(config).with_status(tx);
    assert_eq!(dispatcher.selected_kind(), BackendKind::Toolchain);

    assert!(dispatcher.compile(CompileRequest::new("a")).await.is_success());
    assert_eq!(dispatcher.active_kind().await, Some(BackendKind::Local));
    let cdn_hits = cdn.hits().len();

    // the session stays on the fallback
    assert!(dispatcher.compile(CompileRequest::new("b")).await.is_success());
    assert_eq!(cdn.hits().len(), cdn_hits);
    assert_eq!(local.hits().len(), 2);

    let mut lines = Vec::new();
    while let Ok(line) = status.try_recv() {
        lines.push(line);
    }
    assert_eq!(lines[0], "Initializing compiler (mode: toolchain)...");
    assert!(lines.iter().any(|l| l.contains("falling back to local")));
    assert!(lines.iter().any(|l| l == "Compiler ready!"));
}

#[tokio::test]
async fn test_toolchain_without_fallback_surfaces_asset_load() {
    let cdn = MockServer::start(|_| Reply::text(404, "not found"));
    let cache = tempfile::tempdir().unwrap();
    let config = DispatcherConfig {
        toolchain_enabled: true,
        local_enabled: false,
        toolchain: ToolchainSettings::new(cdn.base_url(), cache.path()),
        ..DispatcherConfig::default()
    };

    let dispatcher = Dispatcher::new(config);
    let result = dispatcher.compile(CompileRequest::new("x")).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::AssetLoad));
    assert_eq!(dispatcher.active_kind().await, None);
}
