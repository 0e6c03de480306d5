//! Chrome as the page context, driven over the DevTools protocol.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Runtime::{RemoteObject, RemoteObjectSubtype};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::command::{Command, CommandResult, PageContent};
use crate::executor;
use crate::page::{ElementInfo, PageAgent, PageContext};

pub const DEFAULT_DEBUG_URL: &str = "http://127.0.0.1:9222";

/// A Chrome instance and the tab pagemind works in. Keep it alive for as long
/// as any [`ChromeAgent`] is in use: dropping it closes a launched browser.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

impl BrowserSession {
    /// Attach to a Chrome already running with remote debugging, given its
    /// browser websocket address (see [`websocket_url`]).
    pub fn attach(ws_url: &str) -> Result<Self> {
        let browser = Browser::connect(ws_url.to_string())
            .with_context(|| format!("attaching to Chrome at {ws_url}"))?;
        tracing::info!("attached to running Chrome");

        let existing = {
            let tabs = browser.get_tabs();
            let tabs = tabs.lock().map_err(|_| anyhow!("tab list lock poisoned"))?;
            tabs.first().cloned()
        };
        let tab = match existing {
            Some(tab) => tab,
            None => browser.new_tab()?,
        };

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Launch a Chrome of our own with a dedicated profile so the user's own
    /// profile is never locked.
    pub fn launch(headless: bool) -> Result<Self> {
        let profile = profile_dir();
        std::fs::create_dir_all(&profile)
            .with_context(|| format!("creating Chrome profile at {}", profile.display()))?;

        let options = LaunchOptions {
            headless,
            user_data_dir: Some(profile),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(60 * 60),
            ..Default::default()
        };

        let browser = Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {}", e))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        tracing::info!("Chrome ready");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    pub fn agent(&self) -> ChromeAgent {
        ChromeAgent::new(self.tab.clone())
    }
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Resolve a DevTools address such as `http://127.0.0.1:9222` to the
/// browser's websocket URL. `ws://` addresses are returned as they are.
pub async fn websocket_url(debug_url: &str) -> Result<String> {
    if debug_url.starts_with("ws://") || debug_url.starts_with("wss://") {
        return Ok(debug_url.to_string());
    }
    let version_url = format!("{}/json/version", debug_url.trim_end_matches('/'));
    let info: VersionInfo = reqwest::get(&version_url)
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("no Chrome with remote debugging at {debug_url}"))?
        .json()
        .await
        .with_context(|| format!("unexpected answer from {version_url}"))?;
    Ok(info.web_socket_debugger_url)
}

fn profile_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pagemind"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chrome-profile")
}

/// Quote a Rust string as a JS string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// The value of an evaluated script. A script that threw comes back as an
/// error object, not a value.
fn remote_value(remote: RemoteObject) -> Result<Value> {
    if remote.subtype == Some(RemoteObjectSubtype::Error) {
        let description = remote
            .description
            .unwrap_or_else(|| "script threw an exception".to_string());
        bail!("{description}");
    }
    Ok(remote.value.unwrap_or(Value::Null))
}

/// [`PageContext`] backed by `Runtime.evaluate` on a tab.
pub struct ChromePage {
    tab: Arc<Tab>,
}

#[derive(Deserialize)]
struct RawElement {
    tag: String,
    text: String,
    href: Option<String>,
    value: Option<String>,
    id: String,
    class: String,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    fn eval(&self, js: &str) -> Result<Value> {
        remote_value(self.tab.evaluate(js, false)?)
    }

    fn eval_f64(&self, js: &str) -> Result<f64> {
        self.eval(js)?
            .as_f64()
            .ok_or_else(|| anyhow!("`{js}` did not return a number"))
    }

    fn eval_string(&self, js: &str) -> Result<String> {
        Ok(self.eval(js)?.as_str().map(String::from).unwrap_or_default())
    }
}

impl PageContext for ChromePage {
    fn viewport_height(&self) -> Result<f64> {
        self.eval_f64("window.innerHeight")
    }

    fn document_height(&self) -> Result<f64> {
        self.eval_f64("document.body.scrollHeight")
    }

    fn scroll_by(&self, dy: f64) -> Result<()> {
        self.eval(&format!("window.scrollBy(0, {dy})"))?;
        Ok(())
    }

    fn scroll_to(&self, y: f64) -> Result<()> {
        self.eval(&format!("window.scrollTo(0, {y})"))?;
        Ok(())
    }

    fn title(&self) -> Result<String> {
        self.eval_string("document.title")
    }

    fn exists(&self, selector: &str) -> Result<bool> {
        let found = self.eval(&format!(
            "document.querySelector({}) !== null",
            js_str(selector)
        ))?;
        Ok(found.as_bool().unwrap_or(false))
    }

    fn click(&self, selector: &str) -> Result<()> {
        self.eval(&format!(
            "document.querySelector({}).click()",
            js_str(selector)
        ))?;
        Ok(())
    }

    fn set_value(&self, selector: &str, text: &str) -> Result<()> {
        self.eval(&format!(
            r#"(() => {{
  const el = document.querySelector({});
  el.value = {};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
}})()"#,
            js_str(selector),
            js_str(text)
        ))?;
        Ok(())
    }

    fn text_of(&self, selector: &str) -> Result<String> {
        self.eval_string(&format!(
            "(() => {{ const el = document.querySelector({}); return el.innerText || el.textContent || ''; }})()",
            js_str(selector)
        ))
    }

    fn query_all(&self, selector: &str) -> Result<Vec<ElementInfo>> {
        let raw = self.eval(&format!(
            r#"JSON.stringify(Array.from(document.querySelectorAll({})).map(el => ({{
  tag: el.tagName,
  text: el.innerText || el.textContent || '',
  href: el.href || null,
  value: el.value === undefined ? null : String(el.value),
  id: el.id || '',
  class: typeof el.className === 'string' ? el.className : ''
}})))"#,
            js_str(selector)
        ))?;
        let json = raw.as_str().unwrap_or("[]");
        let elements: Vec<RawElement> = serde_json::from_str(json)?;
        Ok(elements
            .into_iter()
            .map(|e| ElementInfo {
                tag: e.tag,
                text: e.text,
                href: e.href,
                value: e.value,
                id: e.id,
                class: e.class,
            })
            .collect())
    }
}

/// [`PageAgent`] over a Chrome tab. Each call runs on the blocking pool since
/// DevTools calls are synchronous.
#[derive(Clone)]
pub struct ChromeAgent {
    tab: Arc<Tab>,
}

impl ChromeAgent {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    async fn with_page<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ChromePage) -> Result<T> + Send + 'static,
    {
        let page = ChromePage::new(self.tab.clone());
        tokio::task::spawn_blocking(move || f(&page))
            .await
            .map_err(|e| anyhow!("page task panicked: {}", e))?
    }
}

#[async_trait]
impl PageAgent for ChromeAgent {
    async fn get_content(&self) -> Result<PageContent> {
        self.with_page(|page| {
            Ok(PageContent {
                title: page.title()?,
                content: page.eval_string("document.body ? document.body.innerText : ''")?,
            })
        })
        .await
    }

    async fn selected_text(&self) -> Result<String> {
        self.with_page(|page| page.eval_string("window.getSelection().toString()"))
            .await
    }

    async fn execute_command(&self, command: Command) -> Result<CommandResult> {
        tracing::info!(action = %command.action, selector = ?command.selector, "executing command");
        let result = self
            .with_page(move |page| Ok(executor::execute(page, &command)))
            .await?;
        if !result.success {
            tracing::warn!(message = %result.message, "command failed");
        }
        Ok(result)
    }
}
