//! Chat history kept across runs, plus a plain-text export of it.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::command::ChatMessage;
use crate::store::{self, StoreError};

#[derive(Serialize, Deserialize, Default)]
struct HistoryFile {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

/// The transcript file, `{"messages": [...]}`.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("pagemind"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chat_history.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved messages. A missing or unreadable file is an empty history.
    pub fn load(&self) -> Vec<ChatMessage> {
        match store::read_json::<HistoryFile>(&self.path) {
            Ok(file) => file.unwrap_or_default().messages,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable chat history");
                Vec::new()
            }
        }
    }

    pub fn save(&self, messages: &[ChatMessage]) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            messages: &'a [ChatMessage],
        }
        store::write_json(&self.path, &Borrowed { messages })
    }

    /// Forget every message. The file is kept, empty.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.save(&[])
    }
}

/// Default file name for an export made at `at`.
pub fn export_file_name(at: DateTime<Local>) -> String {
    format!("chat_{}.txt", at.format("%Y%m%d_%H%M%S"))
}

/// Render a transcript as the text written by `pagemind history export`.
pub fn export_text(messages: &[ChatMessage], provider: &str, at: DateTime<Local>) -> String {
    let mut lines = vec![
        "=== AI Chat Export ===".to_string(),
        format!("Date: {}", at.format("%Y-%m-%d %H:%M:%S")),
        format!("Provider: {provider}"),
        "=".repeat(50),
        String::new(),
    ];

    for message in messages {
        match message.role.as_str() {
            "user" => lines.push("👤 YOU:".to_string()),
            "assistant" => lines.push("🤖 AI:".to_string()),
            "tool" => lines.push("🔧 TOOL RESULT:".to_string()),
            _ => {}
        }
        lines.push(message.content.clone());
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("chat_history.json"));
        assert!(history.load().is_empty());
    }

    #[test]
    fn saved_messages_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("chat_history.json"));
        let messages = vec![
            ChatMessage::new("user", "Xin chào"),
            ChatMessage::new("assistant", "Hello"),
        ];
        history.save(&messages).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(history.path()).unwrap()).unwrap();
        assert_eq!(raw["messages"][0]["content"], "Xin chào");
        assert_eq!(history.load(), messages);
    }

    #[test]
    fn clear_empties_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("chat_history.json"));
        history.save(&[ChatMessage::new("user", "hi")]).unwrap();
        history.clear().unwrap();
        assert!(history.load().is_empty());
        assert!(history.path().exists());
    }

    #[test]
    fn corrupt_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_history.json");
        std::fs::write(&path, "[oops").unwrap();
        assert!(HistoryStore::new(path).load().is_empty());
    }

    #[test]
    fn export_labels_each_role() {
        let messages = vec![
            ChatMessage::new("user", "scroll down"),
            ChatMessage::new("assistant", "{\"action\":\"scroll_down\"}"),
            ChatMessage::new("tool", "✅ Scrolled down"),
        ];
        let text = export_text(&messages, "ollama", at());
        let expected = [
            "=== AI Chat Export ===",
            "Date: 2024-03-09 14:05:07",
            "Provider: ollama",
            "==================================================",
            "",
            "👤 YOU:",
            "scroll down",
            "",
            "🤖 AI:",
            "{\"action\":\"scroll_down\"}",
            "",
            "🔧 TOOL RESULT:",
            "✅ Scrolled down",
            "",
        ]
        .join("\n");
        assert_eq!(text, expected);
    }

    #[test]
    fn export_file_name_is_timestamped() {
        assert_eq!(export_file_name(at()), "chat_20240309_140507.txt");
    }
}
