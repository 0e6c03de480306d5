//! pagemind: chat with a local model about the page in front of you, and let
//! it scroll, click, type and read that page.

pub mod chrome;
pub mod command;
pub mod config;
pub mod decoder;
pub mod executor;
pub mod history;
pub mod page;
pub mod panel;
pub mod pending;
pub mod pipeline;
pub mod prompt;
pub mod scanner;
pub mod session;
pub mod store;

pub use command::{Action, Command, CommandResult, PageContent, PageStructure};
pub use config::{Config, Provider, SettingsStore};
pub use history::HistoryStore;
pub use page::{DetachedAgent, PageAgent, PageContext};
pub use pending::{PendingAction, PendingStore};
pub use pipeline::{ChatPipeline, PipelineEvent};
pub use scanner::{CommandScanner, ScanMode};
pub use session::{ChatSession, SessionEvent};
