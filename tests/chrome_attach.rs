//! Resolving the DevTools address of a running Chrome.

mod common;

use axum::Json;
use axum::Router;
use axum::routing::get;
use common::dead_endpoint;
use pagemind::chrome::websocket_url;
use serde_json::json;

async fn devtools_server() -> String {
    let app = Router::new().route(
        "/json/version",
        get(|| async {
            Json(json!({
                "Browser": "Chrome/126.0.6478.126",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/4f1c"
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn http_address_resolves_to_browser_websocket() {
    let base = devtools_server().await;
    assert_eq!(
        websocket_url(&base).await.unwrap(),
        "ws://127.0.0.1:9222/devtools/browser/4f1c"
    );
}

#[tokio::test]
async fn websocket_address_is_used_as_is() {
    let ws = "ws://127.0.0.1:9333/devtools/browser/abc";
    assert_eq!(websocket_url(ws).await.unwrap(), ws);
}

#[tokio::test]
async fn no_chrome_listening_names_the_address() {
    let url = dead_endpoint();
    let err = websocket_url(&url).await.unwrap_err();
    assert!(format!("{err:#}").contains(&format!("no Chrome with remote debugging at {url}")));
}
