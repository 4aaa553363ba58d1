//! In-process stand-ins for compile services and toolchain CDNs.

use std::io::Read;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Header, Response, Server};

/// Smallest buffer that passes the module header check.
pub const EMPTY_MODULE: &[u8] = b"\0asm\x01\0\0\0";

#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub url: String,
    pub body: String,
}

pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string().into_bytes(),
            content_type: "application/json",
        }
    }

    pub fn bytes(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: "application/octet-stream",
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.as_bytes().to_vec(),
            content_type: "text/plain",
        }
    }
}

/// tiny_http server answering every request through `handler`.
pub struct MockServer {
    server: Arc<Server>,
    base_url: String,
    hits: Arc<Mutex<Vec<Hit>>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Hit) -> Reply + Send + 'static,
    {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind mock server"));
        let addr = server.server_addr().to_ip().expect("tcp listener");
        let hits = Arc::new(Mutex::new(Vec::new()));

        let worker = {
            let server = server.clone();
            let hits = hits.clone();
            thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let hit = Hit {
                        method: request.method().to_string(),
                        url: request.url().to_string(),
                        body,
                    };
                    let reply = handler(&hit);
                    hits.lock().unwrap().push(hit);
                    let header =
                        Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes())
                            .unwrap();
                    let response = Response::from_data(reply.body)
                        .with_status_code(reply.status)
                        .with_header(header);
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            server,
            base_url: format!("http://{addr}"),
            hits,
            worker: Some(worker),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Accepts connections and never answers.
pub fn silent_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind silent listener");
    let addr = listener.local_addr().expect("local addr");
    (listener, format!("http://{addr}"))
}
