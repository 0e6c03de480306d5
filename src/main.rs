use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use pagemind::chrome::{self, BrowserSession, DEFAULT_DEBUG_URL};
use pagemind::history::{self as chat_history, HistoryStore};
use pagemind::panel::{self, PanelState};
use pagemind::{ChatSession, DetachedAgent, PageAgent, PendingStore, SessionEvent, SettingsStore};

#[derive(Parser)]
#[command(name = "pagemind", version, about = "Chat with a local LLM about the page you are on")]
struct Cli {
    /// Settings file (default: <config dir>/pagemind/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chat history file (default: <data dir>/pagemind/chat_history.json)
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Attach to Chrome and serve the chat panel
    Serve {
        /// Run without a browser; page commands will fail
        #[arg(long)]
        no_browser: bool,
        /// Launch Chrome headless when none is running
        #[arg(long)]
        headless: bool,
        /// DevTools address of an already running Chrome
        #[arg(long, default_value = DEFAULT_DEBUG_URL)]
        debug_url: String,
    },
    /// Ask a single question and stream the answer to stdout
    Ask {
        /// Summarize the page open in your running Chrome instead of sending a prompt
        #[arg(long)]
        page: bool,
        #[arg(long, default_value = DEFAULT_DEBUG_URL)]
        debug_url: String,
        prompt: Vec<String>,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
    /// Show, clear or export the saved chat history
    History {
        #[command(subcommand)]
        action: HistoryCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    Show,
    Set { key: String, value: String },
    Reset,
}

#[derive(Subcommand)]
enum HistoryCmd {
    Show,
    Clear,
    /// Write the history as text (default: ./chat_<timestamp>.txt)
    Export { path: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagemind=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = SettingsStore::new(cli.config.unwrap_or_else(SettingsStore::default_path));
    let history = HistoryStore::new(cli.history.unwrap_or_else(HistoryStore::default_path));

    match cli.command {
        Cmd::Serve {
            no_browser,
            headless,
            debug_url,
        } => serve(settings, history, no_browser, headless, debug_url).await,
        Cmd::Ask {
            page,
            debug_url,
            prompt,
        } => ask(settings, page, debug_url, prompt.join(" ")).await,
        Cmd::Config { action } => config(settings, action),
        Cmd::History { action } => history_cmd(settings, history, action),
    }
}

async fn attach_browser(debug_url: &str) -> Result<BrowserSession> {
    tracing::info!(debug_url, "attempting to attach to running Chrome");
    let ws_url = chrome::websocket_url(debug_url).await?;
    tokio::task::spawn_blocking(move || BrowserSession::attach(&ws_url))
        .await
        .map_err(|e| anyhow::anyhow!("Browser attach panicked: {}", e))?
}

/// Attach to the user's Chrome, or launch one when none is listening.
async fn open_browser(debug_url: &str, headless: bool) -> Result<BrowserSession> {
    match attach_browser(debug_url).await {
        Ok(session) => Ok(session),
        Err(e) => {
            tracing::info!(error = %format!("{e:#}"), "no Chrome to attach to, launching a new one");
            tokio::task::spawn_blocking(move || BrowserSession::launch(headless))
                .await
                .map_err(|e| anyhow::anyhow!("Browser launch panicked: {}", e))?
        }
    }
}

async fn serve(
    settings: SettingsStore,
    history: HistoryStore,
    no_browser: bool,
    headless: bool,
    debug_url: String,
) -> Result<()> {
    // Kept alive for the life of the server.
    let browser = if no_browser {
        None
    } else {
        Some(open_browser(&debug_url, headless).await?)
    };
    let agent: Arc<dyn PageAgent> = match &browser {
        Some(session) => Arc::new(session.agent()),
        None => Arc::new(DetachedAgent),
    };

    let pending = Arc::new(PendingStore::new(PendingStore::default_path()));
    let session = ChatSession::new(settings, agent.clone()).with_history(history);
    let (prompt_tx, prompt_rx) = mpsc::channel::<String>(1);

    panel::start_server(PanelState {
        prompt_tx,
        events: session.events(),
        pending: pending.clone(),
        agent,
    })
    .await?;

    session.serve(prompt_rx, pending).await;
    drop(browser);
    Ok(())
}

async fn ask(settings: SettingsStore, page: bool, debug_url: String, prompt: String) -> Result<()> {
    // A freshly launched browser would only show a blank page.
    let browser = if page {
        let session = attach_browser(&debug_url).await.context(
            "`ask --page` reads the page open in your Chrome; start Chrome with --remote-debugging-port=9222",
        )?;
        Some(session)
    } else {
        None
    };
    let agent: Arc<dyn PageAgent> = match &browser {
        Some(session) => Arc::new(session.agent()),
        None => Arc::new(DetachedAgent),
    };

    let mut session = ChatSession::new(settings, agent);
    let printer = tokio::spawn(print_events(session.events().subscribe()));

    if page {
        session.read_page().await?;
    } else {
        anyhow::ensure!(!prompt.trim().is_empty(), "nothing to ask");
        session.send(&prompt).await;
    }
    drop(session);
    printer.await.context("printer task failed")?;
    Ok(())
}

/// Tracks what of the streamed reply is already on the terminal.
#[derive(Default)]
struct ReplyEcho {
    shown: String,
}

impl ReplyEcho {
    /// What to write for the reply now reading `text`. Normally the unseen
    /// suffix; when the reply was replaced, as with an error message after
    /// partial output, a line break and then the whole text.
    fn update(&mut self, text: &str) -> String {
        let out = match text.strip_prefix(self.shown.as_str()) {
            Some(rest) => rest.to_string(),
            None => format!("\n{text}"),
        };
        self.shown = text.to_string();
        out
    }

    fn reset(&mut self) {
        self.shown.clear();
    }
}

/// Print the reply as it grows. Each event carries the whole reply so far.
async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    let mut stdout = std::io::stdout();
    let mut echo = ReplyEcho::default();
    loop {
        match events.recv().await {
            Ok(SessionEvent::Assistant(text)) => {
                let _ = write!(stdout, "{}", echo.update(&text));
                let _ = stdout.flush();
            }
            Ok(SessionEvent::Notice(text)) => {
                let _ = writeln!(stdout, "\n{}", text);
            }
            Ok(SessionEvent::Complete(_)) => {
                let _ = writeln!(stdout);
                echo.reset();
            }
            Ok(SessionEvent::User(_)) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn config(settings: SettingsStore, action: ConfigCmd) -> Result<()> {
    match action {
        ConfigCmd::Show => {
            let config = settings.load();
            println!("# {}", settings.path().display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCmd::Set { key, value } => {
            let mut config = settings.load();
            config.set(&key, &value)?;
            settings.save(&config)?;
            println!("{key} updated");
        }
        ConfigCmd::Reset => {
            settings.reset()?;
            println!("settings reset to defaults");
        }
    }
    Ok(())
}

fn history_cmd(settings: SettingsStore, history: HistoryStore, action: HistoryCmd) -> Result<()> {
    match action {
        HistoryCmd::Show => {
            let messages = history.load();
            println!("# {}", history.path().display());
            for message in &messages {
                println!("[{}] {}", message.role, message.content);
            }
        }
        HistoryCmd::Clear => {
            history.clear()?;
            println!("chat history cleared");
        }
        HistoryCmd::Export { path } => {
            let messages = history.load();
            anyhow::ensure!(!messages.is_empty(), "no messages to export");
            let now = chrono::Local::now();
            let path = path.unwrap_or_else(|| PathBuf::from(chat_history::export_file_name(now)));
            let provider = settings.load().with_env_overrides().provider;
            std::fs::write(&path, chat_history::export_text(&messages, provider.as_str(), now))
                .with_context(|| format!("writing {}", path.display()))?;
            println!("chat exported to {}", path.display());
        }
    }
    Ok(())
}
