//! Pending-action handoff: a trigger outside the chat (a context-menu style
//! button) stages a request; the chat host picks it up once and turns it into
//! a prompt.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::command::PageContent;
use crate::store::{self, StoreError};

/// Page text is cut to this many characters before it goes into a prompt.
pub const PAGE_CONTENT_LIMIT: usize = 10_000;
const TRUNCATION_MARKER: &str = "\n\n[Content truncated...]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl PendingAction {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
            title: None,
        }
    }

    pub fn read_page(page: PageContent) -> Self {
        Self {
            kind: "read_page".to_string(),
            text: page.content,
            title: Some(page.title),
        }
    }

    /// The prompt this action submits.
    pub fn prompt(&self) -> String {
        let text = &self.text;
        match self.kind.as_str() {
            "summary" => format!("Summarize the following text:\n\n\"{text}\""),
            "explain" => format!("Explain the following text in simple terms:\n\n\"{text}\""),
            "translate" => format!("Translate the following text to Vietnamese:\n\n\"{text}\""),
            "rewrite" => {
                format!("Rewrite the following text to be more professional:\n\n\"{text}\"")
            }
            "read_page" => {
                let title = self
                    .title
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .unwrap_or("this page");
                format!(
                    "Analyze and summarize the following webpage ({title}):\n\n{}",
                    truncate_page_content(text)
                )
            }
            _ => text.clone(),
        }
    }
}

/// Cap page text at [`PAGE_CONTENT_LIMIT`] characters, marking the cut.
pub fn truncate_page_content(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(PAGE_CONTENT_LIMIT) {
        Some((cut, _)) => Cow::Owned(format!("{}{}", &text[..cut], TRUNCATION_MARKER)),
        None => Cow::Borrowed(text),
    }
}

/// The shared slot a pending action is staged in, persisted as JSON. Change
/// notifications only come from [`PendingStore::stage`] on this instance; a
/// record written by anything else waits for the host's next start.
pub struct PendingStore {
    path: PathBuf,
    lock: Mutex<()>,
    changed: broadcast::Sender<()>,
}

impl PendingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (changed, _) = broadcast::channel(16);
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            changed,
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("pagemind"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pending_action.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage an action, replacing any earlier one, and notify subscribers.
    pub fn stage(&self, action: &PendingAction) -> Result<(), StoreError> {
        {
            let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
            store::write_json(&self.path, action)?;
        }
        tracing::info!(kind = %action.kind, "pending action staged");
        let _ = self.changed.send(());
        Ok(())
    }

    /// Remove and return the staged action. The record is deleted before it
    /// is handed out, so it is consumed at most once.
    pub fn take(&self) -> Result<Option<PendingAction>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let action = store::read_json::<PendingAction>(&self.path);
        // A corrupt record is dropped too, or it would block every later take.
        store::remove(&self.path)?;
        action
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates() {
        let cases = [
            ("summary", "Summarize the following text:\n\n\"hola\""),
            (
                "explain",
                "Explain the following text in simple terms:\n\n\"hola\"",
            ),
            (
                "translate",
                "Translate the following text to Vietnamese:\n\n\"hola\"",
            ),
            (
                "rewrite",
                "Rewrite the following text to be more professional:\n\n\"hola\"",
            ),
            ("ai_summarizer_root", "hola"),
        ];
        for (kind, expected) in cases {
            assert_eq!(PendingAction::new(kind, "hola").prompt(), expected, "{kind}");
        }
    }

    #[test]
    fn read_page_uses_title_or_fallback() {
        let page = PendingAction::read_page(PageContent {
            title: "Rust Blog".into(),
            content: "Body".into(),
        });
        assert_eq!(
            page.prompt(),
            "Analyze and summarize the following webpage (Rust Blog):\n\nBody"
        );
        let untitled = PendingAction::new("read_page", "Body");
        assert!(untitled.prompt().contains("(this page)"));
    }

    #[test]
    fn long_pages_are_truncated_with_marker() {
        let long = "é".repeat(PAGE_CONTENT_LIMIT + 5);
        let cut = truncate_page_content(&long);
        assert!(cut.ends_with("[Content truncated...]"));
        assert_eq!(
            cut.chars().count(),
            PAGE_CONTENT_LIMIT + TRUNCATION_MARKER.chars().count()
        );

        let exact = "a".repeat(PAGE_CONTENT_LIMIT);
        assert!(matches!(truncate_page_content(&exact), Cow::Borrowed(_)));
    }

    #[test]
    fn take_consumes_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.json"));
        assert_eq!(store.take().unwrap(), None);

        let action = PendingAction::new("summary", "text");
        store.stage(&action).unwrap();
        assert_eq!(store.take().unwrap(), Some(action));
        assert!(!store.path().exists());
        assert_eq!(store.take().unwrap(), None);
    }

    #[test]
    fn corrupt_record_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.json"));
        std::fs::write(store.path(), "{\"type\":").unwrap();
        assert!(store.take().is_err());
        assert_eq!(store.take().unwrap(), None);
    }

    #[test]
    fn wire_format_uses_type_key() {
        let action: PendingAction =
            serde_json::from_str(r#"{"type":"read_page","text":"t","title":"T"}"#).unwrap();
        assert_eq!(action.kind, "read_page");
        assert_eq!(action.title.as_deref(), Some("T"));
    }

    #[tokio::test]
    async fn staging_notifies_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.json"));
        let mut rx = store.subscribe();
        store.stage(&PendingAction::new("explain", "x")).unwrap();
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn record_from_another_writer_waits_for_take() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let host = PendingStore::new(&path);
        let mut rx = host.subscribe();

        let other = PendingStore::new(&path);
        other.stage(&PendingAction::new("rewrite", "x")).unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(host.take().unwrap().map(|a| a.kind), Some("rewrite".to_string()));
    }
}
