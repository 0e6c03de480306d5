//! In-process stand-ins for an Ollama / LM Studio server.
#![allow(dead_code)]

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::routing::post;
use bytes::Bytes;
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub struct MockServer {
    pub base: String,
    pub requests: Arc<Mutex<Vec<Value>>>,
}

impl MockServer {
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

/// Newline-terminate each line.
pub fn lines(lines: &[&str]) -> Vec<Vec<u8>> {
    lines.iter().map(|l| format!("{l}\n").into_bytes()).collect()
}

/// One Ollama line carrying `text` as its response.
pub fn ollama_line(text: &str) -> String {
    serde_json::json!({ "model": "test", "response": text, "done": false }).to_string()
}

pub async fn mock_llm(path: &str, chunks: Vec<Vec<u8>>) -> MockServer {
    mock_llm_with_hook(path, chunks, || {}).await
}

/// Serve `chunks` as a streamed body on POST `path`, calling `hook` as each
/// request arrives.
pub async fn mock_llm_with_hook(
    path: &str,
    chunks: Vec<Vec<u8>>,
    hook: impl Fn() + Send + Sync + 'static,
) -> MockServer {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let hook: Arc<dyn Fn() + Send + Sync> = Arc::new(hook);

    let seen = requests.clone();
    let handler = move |Json(body): Json<Value>| {
        let seen = seen.clone();
        let hook = hook.clone();
        let chunks = chunks.clone();
        async move {
            hook();
            seen.lock().unwrap().push(body);
            let parts = chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from(c)));
            Body::from_stream(futures::stream::iter(parts))
        }
    };

    let app = Router::new().route(path, post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer {
        base: format!("http://{addr}"),
        requests,
    }
}

/// An address nothing is listening on.
pub fn dead_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
