//! The two seams between pagemind and a live page.
//!
//! [`PageContext`] is what runs *inside* the page: synchronous DOM primitives
//! the command executor is written against. [`PageAgent`] is what the chat
//! session talks to: an async message boundary that may cross a process or a
//! DevTools connection.

use anyhow::Result;
use async_trait::async_trait;

use crate::command::{Command, CommandResult, PageContent};

/// Plain description of a DOM element, enough to build a page outline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementInfo {
    pub tag: String,
    /// `innerText`, falling back to `textContent`.
    pub text: String,
    pub href: Option<String>,
    pub value: Option<String>,
    pub id: String,
    pub class: String,
}

/// DOM access used by [`crate::executor::execute`]. Errors are page faults
/// (script exceptions, lost connection) and are turned into failed results by
/// the executor.
pub trait PageContext {
    fn viewport_height(&self) -> Result<f64>;
    fn document_height(&self) -> Result<f64>;
    fn scroll_by(&self, dy: f64) -> Result<()>;
    fn scroll_to(&self, y: f64) -> Result<()>;
    fn title(&self) -> Result<String>;

    /// Whether `selector` matches at least one element.
    fn exists(&self, selector: &str) -> Result<bool>;
    /// Activate the first match.
    fn click(&self, selector: &str) -> Result<()>;
    /// Set the first match's value and fire a bubbling `input` event.
    fn set_value(&self, selector: &str, text: &str) -> Result<()>;
    /// Rendered text of the first match.
    fn text_of(&self, selector: &str) -> Result<String>;
    /// Every match, in document order. Callers cap the length themselves.
    fn query_all(&self, selector: &str) -> Result<Vec<ElementInfo>>;
}

/// The page as seen from the chat session.
#[async_trait]
pub trait PageAgent: Send + Sync {
    async fn get_content(&self) -> Result<PageContent>;

    async fn selected_text(&self) -> Result<String>;

    async fn execute_command(&self, command: Command) -> Result<CommandResult>;
}

/// Agent for sessions with no page attached: every command fails politely.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedAgent;

#[async_trait]
impl PageAgent for DetachedAgent {
    async fn get_content(&self) -> Result<PageContent> {
        anyhow::bail!("no page attached")
    }

    async fn selected_text(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn execute_command(&self, command: Command) -> Result<CommandResult> {
        Ok(CommandResult::failed(format!(
            "No page attached, cannot run {}",
            command.action
        )))
    }
}
