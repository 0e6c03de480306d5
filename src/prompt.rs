use serde_json::{Value, json};

use crate::config::{Config, Provider};

const COMMAND_CATALOG: &str = r#"You can control the browser by outputting JSON commands. Available commands:
- {"action": "scroll_down"} - Scroll down the page
- {"action": "scroll_up"} - Scroll up the page
- {"action": "scroll_to_top"} - Scroll to top
- {"action": "scroll_to_bottom"} - Scroll to bottom
- {"action": "click", "selector": "CSS_SELECTOR"} - Click an element
- {"action": "type", "selector": "CSS_SELECTOR", "text": "TEXT"} - Type into an input
- {"action": "read_element", "selector": "CSS_SELECTOR"} - Read element content
- {"action": "get_page_structure"} - Get page headings, links, buttons

Output commands on a separate line. Example:
{"action": "scroll_down"}"#;

/// A ready-to-send streaming request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub url: String,
    pub body: Value,
}

/// System message for OpenAI-compatible servers.
pub fn system_prompt(config: &Config) -> String {
    let mut prompt = format!(
        "You are a helpful assistant. Please answer in {}.",
        config.language
    );
    if config.automation_enabled {
        prompt.push_str("\n\n");
        prompt.push_str(COMMAND_CATALOG);
    }
    prompt
}

pub fn build_request(config: &Config, prompt: &str) -> ChatRequest {
    let base = config.base_url();
    match config.provider {
        Provider::Ollama => ChatRequest {
            url: format!("{base}/api/generate"),
            body: json!({
                "model": config.model,
                "prompt": prompt,
                "stream": true,
            }),
        },
        Provider::LmStudio => ChatRequest {
            url: format!("{base}/chat/completions"),
            body: json!({
                "model": config.model,
                "messages": [
                    {"role": "system", "content": system_prompt(config)},
                    {"role": "user", "content": prompt},
                ],
                "stream": true,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_generate_request() {
        let config = Config {
            endpoint: "http://localhost:11434/".into(),
            model: "gemma3:1b".into(),
            ..Config::default()
        };
        let req = build_request(&config, "Hello");
        assert_eq!(req.url, "http://localhost:11434/api/generate");
        assert_eq!(
            req.body,
            json!({"model": "gemma3:1b", "prompt": "Hello", "stream": true})
        );
    }

    #[test]
    fn lmstudio_chat_request_without_automation() {
        let config = Config {
            provider: Provider::LmStudio,
            endpoint: "http://127.0.0.1:1234/v1".into(),
            model: "llama-3.1-8b".into(),
            language: "English".into(),
            ..Config::default()
        };
        let req = build_request(&config, "Hi");
        assert_eq!(req.url, "http://127.0.0.1:1234/v1/chat/completions");
        assert_eq!(req.body["stream"], json!(true));
        assert_eq!(req.body["messages"][1], json!({"role": "user", "content": "Hi"}));
        assert_eq!(
            req.body["messages"][0]["content"],
            json!("You are a helpful assistant. Please answer in English.")
        );
    }

    #[test]
    fn automation_adds_command_catalog() {
        let config = Config {
            provider: Provider::LmStudio,
            automation_enabled: true,
            ..Config::default()
        };
        let system = system_prompt(&config);
        for action in crate::command::Action::ALL {
            assert!(
                system.contains(&format!("\"action\": \"{}\"", action.as_str())),
                "catalog is missing {action}"
            );
        }
        assert!(system.contains("separate line"));
    }
}
