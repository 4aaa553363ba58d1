use std::io::Read;
use std::sync::Arc;
use std::thread;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;
use tiny_http::{Header, Response, Server};

/// Local compile server answering every request with `body`.
fn serve(body: String) -> (Arc<Server>, String, thread::JoinHandle<()>) {
    let server = Arc::new(Server::http("127.0.0.1:0").expect("bind"));
    let url = format!("http://{}", server.server_addr().to_ip().expect("tcp"));
    let worker = {
        let server = server.clone();
        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut sink = String::new();
                let _ = request.as_reader().read_to_string(&mut sink);
                let header =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                let _ = request.respond(Response::from_string(body.clone()).with_header(header));
            }
        })
    };
    (server, url, worker)
}

fn project(url: &str) -> tempfile::TempDir {
    let dir = tempdir().expect("create tempdir");
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/user.h"), "float nextSample() { return 0; }\n").unwrap();
    std::fs::write(
        dir.path().join("hearc.toml"),
        format!("[compilation]\nmode = \"local\"\n\n[local]\nurl = \"{url}\"\n"),
    )
    .unwrap();
    dir
}

#[test]
fn cli_compile_writes_module() {
    let wasm = wat::parse_str("(module (memory (export \"memory\") 1))").unwrap();
    let body = serde_json::json!({"success": true, "output": "built", "wasm": wasm}).to_string();
    let (server, url, worker) = serve(body);
    let dir = project(&url);

    Command::cargo_bin("hearc")
        .expect("binary not found")
        .current_dir(dir.path())
        .arg("compile")
        .assert()
        .success();

    let written = std::fs::read(dir.path().join("build/module.wasm")).unwrap();
    assert_eq!(written, wasm);

    server.unblock();
    let _ = worker.join();
}

#[test]
fn cli_compile_reports_errors() {
    let body = serde_json::json!({
        "success": false,
        "error": "user.h:1:7: error: expected ';'",
    })
    .to_string();
    let (server, url, worker) = serve(body);
    let dir = project(&url);

    Command::cargo_bin("hearc")
        .expect("binary not found")
        .current_dir(dir.path())
        .args(["compile", "--out", "out/m.wasm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected ';'"));
    assert!(!dir.path().join("out/m.wasm").exists());

    server.unblock();
    let _ = worker.join();
}
