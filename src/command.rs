use serde::{Deserialize, Serialize};
use std::fmt;

/// The automation vocabulary a model may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ScrollDown,
    ScrollUp,
    ScrollToTop,
    ScrollToBottom,
    Click,
    Type,
    ReadElement,
    GetPageStructure,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::ScrollDown,
        Action::ScrollUp,
        Action::ScrollToTop,
        Action::ScrollToBottom,
        Action::Click,
        Action::Type,
        Action::ReadElement,
        Action::GetPageStructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ScrollDown => "scroll_down",
            Action::ScrollUp => "scroll_up",
            Action::ScrollToTop => "scroll_to_top",
            Action::ScrollToBottom => "scroll_to_bottom",
            Action::Click => "click",
            Action::Type => "type",
            Action::ReadElement => "read_element",
            Action::GetPageStructure => "get_page_structure",
        }
    }

    pub fn parse(name: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command as it appears in model output, e.g.
/// `{"action": "click", "selector": "#submit"}`.
///
/// `action` stays a plain string so that an unknown action still parses and
/// can be reported back to the user instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Command {
    pub fn new(action: Action) -> Self {
        Self {
            action: action.as_str().to_string(),
            selector: None,
            text: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn kind(&self) -> Option<Action> {
        Action::parse(&self.action)
    }
}

/// Outcome of running one command against the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// One-line transcript form: `✅ Scrolled down` / `❌ Element not found: #x`.
    pub fn summary(&self) -> String {
        let icon = if self.success { "✅" } else { "❌" };
        format!("{} {}", icon, self.message)
    }
}

/// Maximum entries per list in a [`PageStructure`].
pub const PAGE_STRUCTURE_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub tag: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub id: String,
    pub class: String,
}

/// Coarse outline of the page returned by `get_page_structure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStructure {
    pub title: String,
    pub headings: Vec<Heading>,
    pub links: Vec<Link>,
    pub buttons: Vec<Button>,
}

/// Readable text of the whole page, as handed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub title: String,
    pub content: String,
}

/// A transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}
