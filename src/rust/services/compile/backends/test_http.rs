use std::time::{Duration, Instant};

use serde_json::json;

use super::*;
use crate::services::compile::test_support::{EMPTY_MODULE, MockServer, Reply, silent_listener};

fn backend(settings: HttpSettings) -> HttpBackend {
    HttpBackend::new(BackendKind::Local, settings)
}

#[tokio::test]
async fn test_success_with_inline_module() {
    let server = MockServer::start(|_| {
        Reply::json(
            200,
            json!({"success": true, "output": "ok", "warnings": "unused variable", "wasm": EMPTY_MODULE}),
        )
    });
    let backend = backend(HttpSettings::new(server.url("/rebuild")));

    let result = backend
        .compile(&CompileRequest::new("float nextSample() { return 0; }"))
        .await;
    match result {
        CompileResult::Success(ok) => {
            assert_eq!(ok.output, "ok");
            assert_eq!(ok.warnings, vec!["unused variable".to_string()]);
            assert_eq!(ok.artifact.as_bytes(), EMPTY_MODULE);
        }
        CompileResult::Failure(f) => panic!("unexpected failure {f}"),
    }

    let hits = server.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].method, "POST");
    assert_eq!(hits[0].url, "/rebuild");
    let body: serde_json::Value = serde_json::from_str(&hits[0].body).unwrap();
    assert_eq!(body["code"], "float nextSample() { return 0; }");
    assert_eq!(body["options"]["optimizationLevel"], 2);
    assert_eq!(body["options"]["sdlEnabled"], false);
    assert_eq!(body["options"]["optimization"], 2);
    assert_eq!(body["options"]["sdl"], false);
}

#[tokio::test]
async fn test_success_with_base64_module() {
    let server = MockServer::start(|_| {
        Reply::json(
            200,
            json!({"success": true, "output": "ok", "wasm": "AGFzbQEAAAA="}),
        )
    });
    let mut options = CompileOptions::default();
    options.optimization_level = 3;
    options.sdl_enabled = true;
    let result = backend(HttpSettings::new(server.url("/rebuild")))
        .compile(&CompileRequest::new("x").with_options(options))
        .await;
    match result {
        CompileResult::Success(ok) => assert_eq!(ok.artifact.as_bytes(), EMPTY_MODULE),
        CompileResult::Failure(f) => panic!("unexpected failure {f}"),
    }

    let body: serde_json::Value = serde_json::from_str(&server.hits()[0].body).unwrap();
    assert_eq!(body["options"]["optimization"], 3);
    assert_eq!(body["options"]["sdl"], true);
}

#[tokio::test]
async fn test_malformed_base64_module_is_a_protocol_failure() {
    let server = MockServer::start(|_| {
        Reply::json(200, json!({"success": true, "output": "ok", "wasm": "not base64!"}))
    });
    let result = backend(HttpSettings::new(server.url("/rebuild")))
        .compile(&CompileRequest::new("x"))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Protocol));
}

#[tokio::test]
async fn test_success_fetches_artifact_url() {
    let server = MockServer::start(|hit| match hit.url.as_str() {
        "/rebuild" => Reply::json(200, json!({"success": true, "output": "built"})),
        "/build/index.wasm" => Reply::bytes(EMPTY_MODULE),
        _ => Reply::text(404, "missing"),
    });
    let mut settings = HttpSettings::new(server.url("/rebuild"));
    settings.artifact_url = Some(server.url("/build/index.wasm"));

    let result = backend(settings).compile(&CompileRequest::new("x")).await;
    assert!(result.is_success());
    assert_eq!(server.hits().len(), 2);
}

#[tokio::test]
async fn test_success_without_any_artifact_is_a_protocol_failure() {
    let server = MockServer::start(|_| Reply::json(200, json!({"success": true, "output": ""})));
    let result = backend(HttpSettings::new(server.url("/rebuild")))
        .compile(&CompileRequest::new("x"))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Protocol));
}

#[tokio::test]
async fn test_failure_body_is_surfaced() {
    let server = MockServer::start(|_| {
        Reply::json(
            400,
            json!({
                "success": false,
                "error": "Compilation failed",
                "errorDetails": ["user.h:1:1: error: boom"],
                "stdout": "",
                "stderr": "user.h:1:1: error: boom\n"
            }),
        )
    });
    let result = backend(HttpSettings::new(server.url("/rebuild")))
        .compile(&CompileRequest::new("x"))
        .await;
    match result {
        CompileResult::Failure(f) => {
            assert_eq!(f.kind, FailureKind::Compile);
            assert_eq!(f.error, "Compilation failed");
            assert_eq!(f.error_details, vec!["user.h:1:1: error: boom".to_string()]);
            assert_eq!(f.stderr.as_deref(), Some("user.h:1:1: error: boom\n"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_error_is_a_protocol_failure() {
    let server = MockServer::start(|_| Reply::text(502, "Bad Gateway"));
    let result = backend(HttpSettings::new(server.url("/rebuild")))
        .compile(&CompileRequest::new("x"))
        .await;
    match result {
        CompileResult::Failure(f) => {
            assert_eq!(f.kind, FailureKind::Protocol);
            assert!(f.error.contains("502"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_silent_endpoint_times_out() {
    let (_listener, base) = silent_listener();
    let mut settings = HttpSettings::new(format!("{base}/compile"));
    settings.timeout = Duration::from_millis(200);

    let started = Instant::now();
    let result = HttpBackend::new(BackendKind::Remote, settings)
        .compile(&CompileRequest::new("x"))
        .await;
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
}

#[tokio::test]
async fn test_refused_connection_is_a_transport_failure() {
    let (listener, base) = silent_listener();
    drop(listener);
    let result = backend(HttpSettings::new(format!("{base}/rebuild")))
        .compile(&CompileRequest::new("x"))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Transport));
}

#[tokio::test]
async fn test_source_client_round_trip() {
    let server = MockServer::start(|hit| match (hit.method.as_str(), hit.url.as_str()) {
        ("GET", "/source") => Reply::text(200, "float nextSample() { return 0.f; }\n"),
        ("POST", "/update-source") => Reply::json(200, json!({"success": true})),
        _ => Reply::json(404, json!({"success": false, "error": "Not Found"})),
    });
    let client = SourceClient::new(format!("{}/", server.base_url()), Duration::from_secs(5));

    assert_eq!(
        client.fetch_source().await.unwrap(),
        "float nextSample() { return 0.f; }\n"
    );
    client.update_source("// edited\n").await.unwrap();

    let hits = server.hits();
    let body: serde_json::Value = serde_json::from_str(&hits[1].body).unwrap();
    assert_eq!(body, json!({"content": "// edited\n"}));
}

#[tokio::test]
async fn test_source_client_reports_server_errors() {
    let server = MockServer::start(|_| Reply::json(500, json!({"success": false, "error": "disk full"})));
    let client = SourceClient::new(server.base_url(), Duration::from_secs(5));

    assert!(client.fetch_source().await.is_err());
    let err = client.update_source("x").await.unwrap_err();
    assert!(err.to_string().contains("disk full"));
}
