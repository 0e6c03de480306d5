//! The web panel's trigger endpoints stage pending actions from the page.

use anyhow::Result;
use async_trait::async_trait;
use pagemind::panel::{PanelState, router};
use pagemind::{Command, CommandResult, PageAgent, PageContent, PendingAction, PendingStore};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

struct StaticPage {
    selection: &'static str,
}

#[async_trait]
impl PageAgent for StaticPage {
    async fn get_content(&self) -> Result<PageContent> {
        Ok(PageContent {
            title: "Release notes".into(),
            content: "Version 2 ships today.".into(),
        })
    }

    async fn selected_text(&self) -> Result<String> {
        Ok(self.selection.to_string())
    }

    async fn execute_command(&self, _command: Command) -> Result<CommandResult> {
        Ok(CommandResult::ok("noop"))
    }
}

struct Panel {
    base: String,
    pending: Arc<PendingStore>,
    prompts: mpsc::Receiver<String>,
    _dir: tempfile::TempDir,
}

async fn start(selection: &'static str) -> Panel {
    let dir = tempfile::tempdir().unwrap();
    let pending = Arc::new(PendingStore::new(dir.path().join("pending.json")));
    let (prompt_tx, prompts) = mpsc::channel(4);
    let (events, _) = broadcast::channel(4);

    let app = router(PanelState {
        prompt_tx,
        events,
        pending: pending.clone(),
        agent: Arc::new(StaticPage { selection }),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Panel {
        base: format!("http://{addr}"),
        pending,
        prompts,
        _dir: dir,
    }
}

#[tokio::test]
async fn selection_action_stages_selected_text() {
    let panel = start("hola").await;
    let res = reqwest::Client::new()
        .post(format!("{}/actions/translate", panel.base))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    assert_eq!(
        panel.pending.take().unwrap(),
        Some(PendingAction::new("translate", "hola"))
    );
}

#[tokio::test]
async fn read_page_stages_content_and_title() {
    let panel = start("").await;
    let res = reqwest::Client::new()
        .post(format!("{}/actions/read_page", panel.base))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let staged = panel.pending.take().unwrap().unwrap();
    assert_eq!(staged.kind, "read_page");
    assert_eq!(staged.text, "Version 2 ships today.");
    assert_eq!(staged.title.as_deref(), Some("Release notes"));
}

#[tokio::test]
async fn empty_selection_and_unknown_actions_are_rejected() {
    let panel = start("  ").await;
    let client = reqwest::Client::new();

    let empty = client
        .post(format!("{}/actions/summary", panel.base))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);

    let unknown = client
        .post(format!("{}/actions/dance", panel.base))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(panel.pending.take().unwrap(), None);
}

#[tokio::test]
async fn prompt_is_forwarded_to_the_host() {
    let mut panel = start("").await;
    let res = reqwest::Client::new()
        .post(format!("{}/prompt", panel.base))
        .json(&serde_json::json!({ "prompt": "What is this page about?" }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    assert_eq!(
        panel.prompts.recv().await.as_deref(),
        Some("What is this page about?")
    );
}
