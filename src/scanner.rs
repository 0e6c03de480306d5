//! Finds command objects embedded in free-form model output.
//!
//! Model output is prose with the occasional `{"action": ...}` object mixed
//! in, and while streaming the last object is usually incomplete. The scanner
//! never fails: anything that does not parse is skipped.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::command::Command;
use crate::config::ConfigError;

/// Signature of a candidate: an opening brace, then an `"action": "<name>"` field.
static CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"action"\s*:\s*"[^"]+""#).expect("candidate pattern is valid")
});

/// How repeated scans of a growing buffer treat commands already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Every scan reports every command in the buffer, so a command is run
    /// again for each later chunk of the same reply.
    #[default]
    Rescan,
    /// Each closed command object is reported once per reply.
    Once,
}

impl FromStr for ScanMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rescan" => Ok(ScanMode::Rescan),
            "once" => Ok(ScanMode::Once),
            other => Err(ConfigError::InvalidValue {
                key: "command_scan",
                value: other.to_string(),
            }),
        }
    }
}

/// Scanner state for one streamed reply.
#[derive(Debug, Default)]
pub struct CommandScanner {
    mode: ScanMode,
    /// Byte offsets of commands already reported (`Once` mode only).
    reported: HashSet<usize>,
}

impl CommandScanner {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            reported: HashSet::new(),
        }
    }

    /// Commands found in `text`, in the order they appear.
    pub fn scan(&mut self, text: &str) -> Vec<Command> {
        let mut commands = Vec::new();

        for m in CANDIDATE.find_iter(text) {
            let start = m.start();
            let (candidate, closed) = match text[m.end()..].find('}') {
                Some(offset) => (text[start..=m.end() + offset].to_string(), true),
                None => (format!("{}}}", &text[start..]), false),
            };

            if self.mode == ScanMode::Once && (!closed || self.reported.contains(&start)) {
                continue;
            }

            match serde_json::from_str::<Command>(&candidate) {
                Ok(command) => {
                    if self.mode == ScanMode::Once {
                        self.reported.insert(start);
                    }
                    commands.push(command);
                }
                Err(e) => tracing::debug!(%candidate, error = %e, "skipping command candidate"),
            }
        }

        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Action;

    fn actions(commands: &[Command]) -> Vec<&str> {
        commands.iter().map(|c| c.action.as_str()).collect()
    }

    #[test]
    fn finds_command_in_prose() {
        let mut scanner = CommandScanner::default();
        let found = scanner.scan("Sure, scrolling now.\n{\"action\": \"scroll_down\"}\nDone.");
        assert_eq!(found, vec![Command::new(Action::ScrollDown)]);
    }

    #[test]
    fn keeps_fields_up_to_the_closing_brace() {
        let mut scanner = CommandScanner::default();
        let found = scanner.scan(r#"{"action":"type","selector":"input[name=q]","text":"rust"}"#);
        assert_eq!(
            found,
            vec![
                Command::new(Action::Type)
                    .with_selector("input[name=q]")
                    .with_text("rust")
            ]
        );
    }

    #[test]
    fn reports_commands_left_to_right() {
        let mut scanner = CommandScanner::default();
        let text = "{\"action\":\"click\",\"selector\":\"#more\"}\nthen\n{\"action\":\"read_element\",\"selector\":\"#details\"}";
        assert_eq!(actions(&scanner.scan(text)), vec!["click", "read_element"]);
    }

    #[test]
    fn unterminated_candidate_gets_a_closing_brace() {
        let mut scanner = CommandScanner::default();
        assert_eq!(
            scanner.scan("ok {\"action\": \"scroll_up\""),
            vec![Command::new(Action::ScrollUp)]
        );
    }

    #[test]
    fn malformed_candidates_are_skipped() {
        let mut scanner = CommandScanner::default();
        let text = "{\"action\": \"click\", \"selector\": } and {\"action\": \"scroll_to_top\"}";
        assert_eq!(actions(&scanner.scan(text)), vec!["scroll_to_top"]);
    }

    #[test]
    fn candidate_starts_at_innermost_brace() {
        let mut scanner = CommandScanner::default();
        let found = scanner.scan("{ \"plan\": {\"action\": \"scroll_to_bottom\"} }");
        assert_eq!(actions(&found), vec!["scroll_to_bottom"]);
    }

    #[test]
    fn rescan_reports_the_same_command_every_time() {
        let mut scanner = CommandScanner::new(ScanMode::Rescan);
        let first = "{\"action\":\"scroll_down\"}";
        let second = format!("{first} and more text");
        assert_eq!(scanner.scan(first).len(), 1);
        assert_eq!(scanner.scan(&second).len(), 1);
    }

    #[test]
    fn once_mode_reports_each_closed_command_once() {
        let mut scanner = CommandScanner::new(ScanMode::Once);
        assert!(scanner.scan("{\"action\":\"click\"").is_empty());
        let closed = "{\"action\":\"click\",\"selector\":\"#a\"}";
        assert_eq!(
            scanner.scan(closed),
            vec![Command::new(Action::Click).with_selector("#a")]
        );
        let grown = format!("{closed}\n{{\"action\":\"scroll_up\"}}");
        assert_eq!(actions(&scanner.scan(&grown)), vec!["scroll_up"]);
        assert!(scanner.scan(&grown).is_empty());
    }

    #[test]
    fn scan_mode_parses() {
        assert_eq!("Once".parse::<ScanMode>().unwrap(), ScanMode::Once);
        assert!("sometimes".parse::<ScanMode>().is_err());
    }
}
