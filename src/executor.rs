use anyhow::Result;
use serde_json::json;

use crate::command::{
    Action, Button, Command, CommandResult, Heading, Link, PAGE_STRUCTURE_LIMIT, PageStructure,
};
use crate::page::PageContext;

/// Fraction of the viewport a single scroll step covers.
const SCROLL_STEP: f64 = 0.8;

/// Apply one command to the page. Never fails: bad commands and page faults
/// come back as `success: false`.
pub fn execute(page: &dyn PageContext, command: &Command) -> CommandResult {
    let Some(action) = command.kind() else {
        return CommandResult::failed(format!("Unknown action: {}", command.action));
    };

    match run(page, action, command) {
        Ok(result) => result,
        Err(e) => {
            tracing::debug!(action = %action, error = %e, "command faulted");
            CommandResult::failed(format!("Error: {e:#}"))
        }
    }
}

fn run(page: &dyn PageContext, action: Action, command: &Command) -> Result<CommandResult> {
    let selector = command.selector.as_deref().filter(|s| !s.is_empty());

    let result = match action {
        Action::ScrollDown => {
            page.scroll_by(page.viewport_height()? * SCROLL_STEP)?;
            CommandResult::ok("Scrolled down")
        }
        Action::ScrollUp => {
            page.scroll_by(-page.viewport_height()? * SCROLL_STEP)?;
            CommandResult::ok("Scrolled up")
        }
        Action::ScrollToTop => {
            page.scroll_to(0.0)?;
            CommandResult::ok("Scrolled to top")
        }
        Action::ScrollToBottom => {
            page.scroll_to(page.document_height()?)?;
            CommandResult::ok("Scrolled to bottom")
        }
        Action::Click => {
            let Some(selector) = selector else {
                return Ok(CommandResult::failed("No selector provided"));
            };
            if !page.exists(selector)? {
                return Ok(not_found(selector));
            }
            page.click(selector)?;
            CommandResult::ok(format!("Clicked element: {selector}"))
        }
        Action::Type => {
            let text = command.text.as_deref().filter(|t| !t.is_empty());
            let (Some(selector), Some(text)) = (selector, text) else {
                return Ok(CommandResult::failed("Selector and text required"));
            };
            if !page.exists(selector)? {
                return Ok(not_found(selector));
            }
            page.set_value(selector, text)?;
            CommandResult::ok(format!("Typed \"{text}\" into {selector}"))
        }
        Action::ReadElement => {
            let Some(selector) = selector else {
                return Ok(CommandResult::failed("No selector provided"));
            };
            if !page.exists(selector)? {
                return Ok(not_found(selector));
            }
            let text = page.text_of(selector)?;
            CommandResult::ok_with_data("Element read", json!(text))
        }
        Action::GetPageStructure => {
            let structure = page_structure(page)?;
            CommandResult::ok_with_data("Page structure retrieved", serde_json::to_value(structure)?)
        }
    };
    Ok(result)
}

fn not_found(selector: &str) -> CommandResult {
    CommandResult::failed(format!("Element not found: {selector}"))
}

fn page_structure(page: &dyn PageContext) -> Result<PageStructure> {
    let headings = page
        .query_all("h1, h2, h3")?
        .into_iter()
        .take(PAGE_STRUCTURE_LIMIT)
        .map(|h| Heading {
            tag: h.tag.to_lowercase(),
            text: h.text.trim().to_string(),
        })
        .collect();

    let links = page
        .query_all("a[href]")?
        .into_iter()
        .take(PAGE_STRUCTURE_LIMIT)
        .map(|a| Link {
            text: a.text.trim().to_string(),
            href: a.href.unwrap_or_default(),
        })
        .collect();

    let buttons = page
        .query_all("button, input[type=\"submit\"]")?
        .into_iter()
        .take(PAGE_STRUCTURE_LIMIT)
        .map(|b| Button {
            // submit inputs have no text, only a value
            text: if b.text.is_empty() {
                b.value.unwrap_or_default()
            } else {
                b.text
            },
            id: b.id,
            class: b.class,
        })
        .collect();

    Ok(PageStructure {
        title: page.title()?,
        headings,
        links,
        buttons,
    })
}
