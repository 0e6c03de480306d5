//! The chat host: keeps the transcript, renders streamed replies and runs
//! the commands a reply contains against the page.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::command::{ChatMessage, CommandResult};
use crate::config::{Config, SettingsStore};
use crate::history::HistoryStore;
use crate::page::PageAgent;
use crate::pending::{PendingAction, PendingStore};
use crate::pipeline::{ChatPipeline, PipelineEvent};
use crate::scanner::CommandScanner;

/// Placeholder shown until the first delta arrives.
const THINKING: &str = "...";

/// Transcript changes, for whoever renders the chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    User(String),
    /// The reply being streamed, in full. Replaces the previous render.
    Assistant(String),
    /// A command result or data dump added after the reply.
    Notice(String),
    /// The reply ended. `None` when the request failed.
    Complete(Option<String>),
}

pub struct ChatSession {
    settings: SettingsStore,
    agent: Arc<dyn PageAgent>,
    client: reqwest::Client,
    transcript: Vec<ChatMessage>,
    history: Option<HistoryStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn new(settings: SettingsStore, agent: Arc<dyn PageAgent>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            settings,
            agent,
            client: reqwest::Client::new(),
            transcript: Vec::new(),
            history: None,
            events,
        }
    }

    /// Resume from the saved history and save the transcript after every
    /// reply.
    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.transcript = history.load();
        self.history = Some(history);
        self
    }

    pub fn events(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Settings as of now: the stored file over defaults, then the environment.
    fn current_config(&self) -> Config {
        self.settings.load().with_env_overrides()
    }

    fn push(&mut self, message: ChatMessage) -> usize {
        self.transcript.push(message);
        self.transcript.len() - 1
    }

    fn notice(&mut self, text: String) {
        let _ = self.events.send(SessionEvent::Notice(text.clone()));
        self.push(ChatMessage::new("tool", text));
    }

    fn save_history(&self) {
        if let Some(history) = &self.history
            && let Err(e) = history.save(&self.transcript)
        {
            tracing::warn!(error = %e, "could not save chat history");
        }
    }

    /// Drop the transcript, and the saved history with it.
    pub fn clear_history(&mut self) -> anyhow::Result<()> {
        self.transcript.clear();
        if let Some(history) = &self.history {
            history.clear()?;
        }
        Ok(())
    }

    /// Submit a prompt and stream the reply into the transcript. Returns the
    /// final reply, or `None` if the request failed or the prompt was blank.
    pub async fn send(&mut self, prompt: &str) -> Option<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return None;
        }

        let config = self.current_config();
        self.push(ChatMessage::new("user", prompt));
        let _ = self.events.send(SessionEvent::User(prompt.to_string()));
        let reply = self.push(ChatMessage::new("assistant", THINKING));

        let pipeline = ChatPipeline::with_client(self.client.clone(), config.clone());
        let mut scanner = CommandScanner::new(config.command_scan);
        let mut stream = pipeline.stream(prompt);
        let mut outcome = None;

        while let Some(event) = stream.next().await {
            match event {
                PipelineEvent::Chunk(text) => {
                    self.render(reply, &text);
                    if config.automation_enabled {
                        self.run_commands(&mut scanner, &text).await;
                    }
                }
                PipelineEvent::Completed(text) => outcome = Some(text),
                PipelineEvent::Failed(message) => self.render(reply, &message),
            }
        }

        self.save_history();
        let _ = self.events.send(SessionEvent::Complete(outcome.clone()));
        outcome
    }

    fn render(&mut self, index: usize, text: &str) {
        self.transcript[index].content = text.to_string();
        let _ = self.events.send(SessionEvent::Assistant(text.to_string()));
    }

    /// Run every command found in `text`, one after another, in the order
    /// they appear.
    async fn run_commands(&mut self, scanner: &mut CommandScanner, text: &str) {
        for command in scanner.scan(text) {
            let result = match self.agent.execute_command(command).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "page agent unreachable");
                    CommandResult::failed(format!("Error: {e:#}"))
                }
            };
            self.notice(result.summary());
            if let Some(data) = result.data {
                let pretty = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
                self.notice(format!("Data: {pretty}"));
            }
        }
    }

    /// Consume the staged pending action, if any, and submit its prompt.
    pub async fn consume_pending(&mut self, store: &PendingStore) -> Option<String> {
        let action = match store.take() {
            Ok(Some(action)) => action,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable pending action");
                return None;
            }
        };
        tracing::info!(kind = %action.kind, "submitting pending action");
        self.send(&action.prompt()).await
    }

    /// Ask the model about the whole page the agent is looking at.
    pub async fn read_page(&mut self) -> anyhow::Result<Option<String>> {
        let page = self.agent.get_content().await?;
        let prompt = PendingAction::read_page(page).prompt();
        Ok(self.send(&prompt).await)
    }

    /// Host loop: handle anything already staged, then serve prompts and
    /// pending-action notifications one at a time until the prompt channel
    /// closes.
    pub async fn serve(mut self, mut prompts: mpsc::Receiver<String>, pending: Arc<PendingStore>) {
        let mut changes = pending.subscribe();
        self.consume_pending(&pending).await;

        loop {
            tokio::select! {
                prompt = prompts.recv() => match prompt {
                    Some(prompt) => {
                        self.send(&prompt).await;
                    }
                    None => break,
                },
                changed = changes.recv() => match changed {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        self.consume_pending(&pending).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("chat host stopped");
    }
}
