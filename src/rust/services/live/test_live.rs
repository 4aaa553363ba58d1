use std::time::Duration;

use serde_json::json;

use super::*;
use crate::engine::bridge::ProcessorEvent;
use crate::engine::test_fixtures;
use crate::services::compile::DispatcherConfig;
use crate::services::compile::test_support::{MockServer, Reply};

fn dispatcher_for(server: &MockServer) -> Dispatcher {
    Dispatcher::new(DispatcherConfig {
        local_url: server.base_url().to_string(),
        local_artifact_path: None,
        ..DispatcherConfig::default()
    })
}

fn write_source(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("user.h");
    std::fs::write(&path, "float process() { return 0.5f; }\n").unwrap();
    path
}

#[tokio::test]
async fn test_successful_compile_installs_module() {
    let wasm = wat::parse_str(test_fixtures::constant(0.5)).unwrap();
    let server = MockServer::start(move |_| {
        Reply::json(200, json!({"success": true, "output": "ok", "wasm": wasm.clone()}))
    });
    let (compiler, _status) = CompilerClient::spawn(dispatcher_for(&server));

    let Processor {
        mut port,
        mut driver,
        service,
    } = Processor::new(48_000).unwrap();
    tokio::spawn(service.run());

    let loader = ModuleLoader::new(
        Arc::new(Logger::new()),
        compiler,
        CompileOptions::default(),
        port.control(),
    );
    let dir = tempfile::tempdir().unwrap();
    loader.load(&write_source(&dir)).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), port.next_event())
        .await
        .unwrap();
    assert_eq!(event, Some(ProcessorEvent::Ready));

    let mut buffer = [0.0f32; 4];
    driver.process(&mut [buffer.as_mut_slice()]);
    assert_eq!(buffer, [0.5; 4]);

    let hits = server.hits();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].body.contains("return 0.5f"));
}

#[tokio::test]
async fn test_failed_compile_sends_nothing() {
    let server = MockServer::start(|_| {
        Reply::json(
            200,
            json!({"success": false, "error": "user.h:1:1: error: boom"}),
        )
    });
    let (compiler, _status) = CompilerClient::spawn(dispatcher_for(&server));

    let Processor {
        mut port, service, ..
    } = Processor::new(48_000).unwrap();
    tokio::spawn(service.run());

    let loader = ModuleLoader::new(
        Arc::new(Logger::new()),
        compiler,
        CompileOptions::default(),
        port.control(),
    );
    let dir = tempfile::tempdir().unwrap();
    let err = loader.load(&write_source(&dir)).await.unwrap_err();
    assert!(err.to_string().contains("boom"));

    assert!(
        tokio::time::timeout(Duration::from_millis(300), port.next_event())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_missing_source_file_is_an_error() {
    let server = MockServer::start(|_| Reply::text(500, "unreachable"));
    let (compiler, _status) = CompilerClient::spawn(dispatcher_for(&server));
    let Processor { port, .. } = Processor::new(48_000).unwrap();

    let loader = ModuleLoader::new(
        Arc::new(Logger::new()),
        compiler,
        CompileOptions::default(),
        port.control(),
    );
    let err = loader
        .load(Path::new("/definitely/not/here/user.h"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to read"));
    assert!(server.hits().is_empty());
}

#[test]
fn test_duration_formatting() {
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    assert_eq!(format_duration(Duration::from_micros(12_340)), "12.3ms");
}
