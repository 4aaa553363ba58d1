use serde_json::json;

use super::*;
use crate::engine::runtime::CompiledModule;
use crate::services::compile::test_support::{EMPTY_MODULE, MockServer, Reply};
use crate::services::compile::backends::ToolchainSettings;
use crate::services::compile::{CompileSuccess, DispatcherConfig};

fn success(output: &str) -> CompileResult {
    CompileResult::Success(CompileSuccess {
        artifact: CompiledModule::from_bytes(EMPTY_MODULE.to_vec()).unwrap(),
        output: output.to_string(),
        warnings: Vec::new(),
    })
}

fn output_of(result: &CompileResult) -> &str {
    match result {
        CompileResult::Success(ok) => &ok.output,
        CompileResult::Failure(f) => panic!("unexpected failure {f}"),
    }
}

/// Client wired to hand-driven worker channels.
fn manual_client(
    deadline: Duration,
) -> (
    CompilerClient,
    UnboundedReceiver<WorkerRequest>,
    UnboundedSender<WorkerMessage>,
    UnboundedReceiver<WorkerStatus>,
) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let (client, status) = CompilerClient::connect(request_tx, reply_rx, deadline);
    (client, request_rx, reply_tx, status)
}

#[test]
fn test_pending_table_ignores_unknown_and_duplicate_ids() {
    let pending = PendingRequests::default();
    assert!(!pending.resolve(42, success("x")));

    let mut rx = pending.insert(1);
    assert_eq!(pending.len(), 1);
    assert!(pending.resolve(1, success("first")));
    assert!(!pending.resolve(1, success("second")));
    assert!(pending.is_empty());
    assert_eq!(output_of(&rx.try_recv().unwrap()), "first");
}

#[tokio::test]
async fn test_spawned_worker_compiles_through_dispatcher() {
    let server = MockServer::start(|_| {
        Reply::json(200, json!({"success": true, "output": "built", "wasm": EMPTY_MODULE}))
    });
    let dispatcher = Dispatcher::new(DispatcherConfig {
        local_url: server.base_url().to_string(),
        local_artifact_path: None,
        ..DispatcherConfig::default()
    });

    let (client, mut status) = CompilerClient::spawn(dispatcher);
    assert_eq!(client.deadline(), Duration::from_secs(60));

    let result = client.compile(CompileRequest::new("x")).await;
    assert_eq!(output_of(&result), "built");
    assert!(client.pending().is_empty());

    let first = status.recv().await.unwrap();
    assert_eq!(first.message, "Initializing compiler (mode: local)...");
}

#[tokio::test]
async fn test_replies_are_matched_by_id() {
    let (client, mut requests, replies, _status) = manual_client(Duration::from_secs(5));

    let worker = tokio::spawn(async move {
        let mut received = Vec::new();
        for _ in 0..2 {
            match requests.recv().await.unwrap() {
                WorkerRequest::Compile { id, request } => received.push((id, request.source)),
            }
        }
        // answer in reverse order, with noise in between
        replies
            .send(WorkerMessage::Reply {
                id: 999,
                result: success("stray"),
            })
            .unwrap();
        replies
            .send(WorkerMessage::Status {
                message: "Compiling...".to_string(),
            })
            .unwrap();
        for (id, source) in received.into_iter().rev() {
            replies
                .send(WorkerMessage::Reply {
                    id,
                    result: success(&source),
                })
                .unwrap();
        }
        replies
    });

    let (a, b) = tokio::join!(
        client.compile(CompileRequest::new("a")),
        client.compile(CompileRequest::new("b"))
    );
    assert_eq!(output_of(&a), "a");
    assert_eq!(output_of(&b), "b");
    assert!(client.pending().is_empty());
    drop(worker.await.unwrap());
}

#[tokio::test]
async fn test_duplicate_reply_keeps_first_result() {
    let (client, mut requests, replies, _status) = manual_client(Duration::from_secs(5));

    tokio::spawn(async move {
        if let Some(WorkerRequest::Compile { id, .. }) = requests.recv().await {
            for output in ["first", "second"] {
                let _ = replies.send(WorkerMessage::Reply {
                    id,
                    result: success(output),
                });
            }
        }
        // keep the channels open past the replies
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let result = client.compile(CompileRequest::new("x")).await;
    assert_eq!(output_of(&result), "first");
}

#[tokio::test]
async fn test_unanswered_request_times_out_and_is_forgotten() {
    let (client, mut requests, replies, _status) = manual_client(Duration::from_millis(100));

    let result = client.compile(CompileRequest::new("x")).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    assert!(client.pending().is_empty());

    // a late reply for the expired id goes nowhere
    let Some(WorkerRequest::Compile { id, .. }) = requests.recv().await else {
        panic!("request was not sent");
    };
    replies
        .send(WorkerMessage::Reply {
            id,
            result: success("late"),
        })
        .unwrap();
    tokio::task::yield_now().await;
    assert!(client.pending().is_empty());
}

#[tokio::test]
async fn test_stopped_worker_is_a_transport_failure() {
    let (client, requests, _replies, _status) = manual_client(Duration::from_secs(5));
    drop(requests);

    let result = client.compile(CompileRequest::new("x")).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Transport));
    assert!(client.pending().is_empty());
}

#[tokio::test]
async fn test_status_messages_are_forwarded() {
    let (_client, _requests, replies, mut status) = manual_client(Duration::from_secs(5));
    replies
        .send(WorkerMessage::Status {
            message: "Compiler ready!".to_string(),
        })
        .unwrap();
    assert_eq!(
        status.recv().await.unwrap(),
        WorkerStatus {
            message: "Compiler ready!".to_string()
        }
    );
}

#[tokio::test]
async fn test_deadline_follows_fallback_backend() {
    let cdn = MockServer::start(|_| Reply::text(404, "not found"));
    let local = MockServer::start(|_| {
        Reply::json(200, json!({"success": true, "output": "built", "wasm": EMPTY_MODULE}))
    });
    let cache = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(DispatcherConfig {
        toolchain_enabled: true,
        toolchain: ToolchainSettings::new(cdn.base_url(), cache.path()),
        local_url: local.base_url().to_string(),
        local_artifact_path: None,
        ..DispatcherConfig::default()
    });

    let (client, _status) = CompilerClient::spawn(dispatcher);
    assert_eq!(client.deadline(), Duration::from_secs(300));

    assert!(client.compile(CompileRequest::new("x")).await.is_success());
    assert_eq!(client.deadline(), Duration::from_secs(60));
}

#[tokio::test]
async fn test_backend_report_updates_deadline() {
    let (client, mut requests, replies, _status) = manual_client(Duration::from_secs(300));
    let worker = tokio::spawn(async move {
        let WorkerRequest::Compile { id, .. } = requests.recv().await.unwrap();
        replies
            .send(WorkerMessage::Backend {
                kind: BackendKind::Remote,
            })
            .unwrap();
        replies
            .send(WorkerMessage::Reply {
                id,
                result: success("ok"),
            })
            .unwrap();
        requests
    });

    let result = client.compile(CompileRequest::new("x")).await;
    assert_eq!(output_of(&result), "ok");
    assert_eq!(client.deadline(), Duration::from_secs(60));
    drop(worker.await.unwrap());
}
