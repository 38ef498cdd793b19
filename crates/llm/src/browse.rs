//! Browse-intent classification prompts and parsers.
//!
//! The LLM turns a browse-mode utterance into a small JSON intent record.
//! Deterministic keyword overrides (in `talkie-pipeline`) then correct the
//! record for trigger phrases the model routinely misparses. The web-mode
//! command parser handles deployments that configure a plain-command system
//! prompt instead of the JSON one.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::prompts::strip_fence;

pub const BROWSE_INTENT_SYSTEM: &str = "You classify a short voice command for controlling a web browser. Output a single JSON object with an \"action\" key and, when applicable, one of \"query\" (for search), \"url\" (for open_url), \"link_text\" or \"link_index\" (for click_link / select_link). Allowed actions: search, open_url, click_link, select_link, scroll_up, scroll_down, scroll_left, scroll_right, store_page, go_back, close_tab, browse_on, browse_off, unknown. Use unknown when the command is not a browser action. No other text, no markdown.";

pub const DEFAULT_WEB_MODE_SYSTEM: &str = "The user controls a web browser by voice. Reply with exactly one short command: \"browse on\", \"browse off\", \"search <terms>\", \"open <number>\", \"click <link>\", \"select <link>\", \"scroll up\", \"scroll down\", \"save page\", \"back\", \"close tab\", or \"unknown\" when it is not a browser command. No other text.";

static OPEN_SIR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^open[,.]?\s+sir\.?$").unwrap());

static LINK_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:link\s+number\s+)?(\d+)\s*(?:link\s*)?(?:down)?\.?$").unwrap());

/// Browser action requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowseAction {
    Search,
    OpenUrl,
    ClickLink,
    SelectLink,
    ScrollUp,
    ScrollDown,
    ScrollLeft,
    ScrollRight,
    StorePage,
    GoBack,
    CloseTab,
    BrowseOn,
    BrowseOff,
    #[default]
    Unknown,
}

/// Classified browse intent. Fields beyond `action` are filled only when
/// the action uses them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowseIntent {
    #[serde(default)]
    pub action: BrowseAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_index: Option<u32>,
}

impl BrowseIntent {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_action(action: BrowseAction) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    /// Switch the action, dropping every field the new action does not use.
    pub fn set_action(&mut self, action: BrowseAction) {
        self.action = action;
        if action != BrowseAction::Search {
            self.query = None;
        }
        if action != BrowseAction::OpenUrl {
            self.url = None;
        }
        if !matches!(action, BrowseAction::ClickLink | BrowseAction::SelectLink) {
            self.link_text = None;
            self.link_index = None;
        }
    }

    pub fn set_link_index(&mut self, index: u32) {
        self.link_index = Some(index);
        self.link_text = None;
    }

    pub fn set_link_text(&mut self, text: impl Into<String>) {
        self.link_text = Some(text.into());
        self.link_index = None;
    }
}

/// Rewrite common STT mishears before classification: "open sir" is how
/// recognizers routinely render "open 1".
pub fn normalize_browse_utterance(utterance: &str) -> String {
    if OPEN_SIR_RE.is_match(utterance.trim()) {
        return "open 1".to_string();
    }
    utterance.to_string()
}

/// `(system, user)` prompts asking the model for a JSON intent record.
pub fn build_browse_intent_prompts(utterance: &str) -> (String, String) {
    let user = format!("User said: {}", normalize_browse_utterance(utterance).trim());
    (BROWSE_INTENT_SYSTEM.to_string(), user)
}

/// `(system, user)` prompts for the plain-command web mode. A configured
/// `system_prompt` replaces the default wholesale.
pub fn build_web_mode_prompts(utterance: &str, system_prompt: Option<&str>) -> (String, String) {
    let system = system_prompt
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_WEB_MODE_SYSTEM)
        .to_string();
    let user = format!("User said: {}", utterance.trim());
    (system, user)
}

fn action_from_str(s: &str) -> BrowseAction {
    match s.trim().to_lowercase().as_str() {
        "search" => BrowseAction::Search,
        "open_url" => BrowseAction::OpenUrl,
        "click_link" => BrowseAction::ClickLink,
        "select_link" => BrowseAction::SelectLink,
        "scroll_up" => BrowseAction::ScrollUp,
        "scroll_down" => BrowseAction::ScrollDown,
        "scroll_left" => BrowseAction::ScrollLeft,
        "scroll_right" => BrowseAction::ScrollRight,
        "store_page" => BrowseAction::StorePage,
        "go_back" => BrowseAction::GoBack,
        "close_tab" => BrowseAction::CloseTab,
        "browse_on" => BrowseAction::BrowseOn,
        "browse_off" => BrowseAction::BrowseOff,
        _ => BrowseAction::Unknown,
    }
}

/// Parse the JSON intent reply. Anything that is not a JSON object with a
/// recognized action comes back as `unknown`.
pub fn parse_browse_intent(raw: &str) -> BrowseIntent {
    let text = raw.trim();
    if text.is_empty() {
        return BrowseIntent::unknown();
    }
    let text = strip_fence(text);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return BrowseIntent::unknown();
    };
    let Some(obj) = value.as_object() else {
        return BrowseIntent::unknown();
    };
    let mut intent = BrowseIntent::unknown();
    if let Some(action) = obj.get("action").and_then(|v| v.as_str()) {
        intent.action = action_from_str(action);
    }
    intent.query = obj
        .get("query")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    intent.url = obj
        .get("url")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    intent.link_text = obj
        .get("link_text")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    intent.link_index = obj
        .get("link_index")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32);
    intent
}

/// Parse a plain-command web-mode reply ("search cats", "scroll down",
/// "open 2") into an intent record.
pub fn parse_web_mode_command(raw: &str) -> BrowseIntent {
    let normalized = normalize_browse_utterance(raw.trim());
    let command = normalized.trim().trim_end_matches(['.', '!']).trim();
    if command.is_empty() {
        return BrowseIntent::unknown();
    }
    let lower = command.to_lowercase();

    match lower.as_str() {
        "browse on" => return BrowseIntent::with_action(BrowseAction::BrowseOn),
        "browse off" => return BrowseIntent::with_action(BrowseAction::BrowseOff),
        "save page" | "save the page" | "store page" | "store this page" | "store the page" => {
            return BrowseIntent::with_action(BrowseAction::StorePage)
        }
        "back" | "go back" | "previous page" => {
            return BrowseIntent::with_action(BrowseAction::GoBack)
        }
        "scroll up" => return BrowseIntent::with_action(BrowseAction::ScrollUp),
        "scroll down" => return BrowseIntent::with_action(BrowseAction::ScrollDown),
        "scroll left" => return BrowseIntent::with_action(BrowseAction::ScrollLeft),
        "scroll right" => return BrowseIntent::with_action(BrowseAction::ScrollRight),
        "close" | "close tab" => return BrowseIntent::with_action(BrowseAction::CloseTab),
        _ => {}
    }

    if lower.starts_with("search ") {
        let query = command["search ".len()..].trim();
        if !query.is_empty() {
            let mut intent = BrowseIntent::with_action(BrowseAction::Search);
            intent.query = Some(query.to_string());
            return intent;
        }
    }
    if let Some(rest) = lower.strip_prefix("open ") {
        if let Some(c) = LINK_NUMBER_RE.captures(rest.trim()) {
            let mut intent = BrowseIntent::with_action(BrowseAction::ClickLink);
            if let Ok(index) = c[1].parse::<u32>() {
                intent.set_link_index(index);
            }
            return intent;
        }
    }
    for (prefix, action) in [
        ("click ", BrowseAction::ClickLink),
        ("select ", BrowseAction::SelectLink),
    ] {
        if lower.starts_with(prefix) {
            let rest = command[prefix.len()..].trim();
            let mut intent = BrowseIntent::with_action(action);
            if let Some(c) = LINK_NUMBER_RE.captures(rest) {
                if let Ok(index) = c[1].parse::<u32>() {
                    intent.set_link_index(index);
                    return intent;
                }
            } else if !rest.is_empty() {
                intent.set_link_text(rest);
            }
            return intent;
        }
    }
    if lower == "click" {
        return BrowseIntent::with_action(BrowseAction::ClickLink);
    }
    BrowseIntent::unknown()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_open_sir_becomes_open_1() {
        assert_eq!(normalize_browse_utterance("open sir"), "open 1");
        assert_eq!(normalize_browse_utterance("Open, sir."), "open 1");
        assert_eq!(normalize_browse_utterance("search cats"), "search cats");
        assert_eq!(normalize_browse_utterance(""), "");
    }

    #[test]
    fn intent_prompts_carry_the_utterance() {
        let (system, user) = build_browse_intent_prompts("search trains");
        assert!(system.contains("action"));
        assert_eq!(user, "User said: search trains");
    }

    #[test]
    fn web_mode_prompts_allow_custom_system() {
        let (system, user) = build_web_mode_prompts("scroll down", Some("Custom system."));
        assert_eq!(system, "Custom system.");
        assert_eq!(user, "User said: scroll down");
    }

    #[test]
    fn parse_intent_empty_or_invalid_is_unknown() {
        assert_eq!(parse_browse_intent("").action, BrowseAction::Unknown);
        assert_eq!(parse_browse_intent("   ").action, BrowseAction::Unknown);
        assert_eq!(parse_browse_intent("not json").action, BrowseAction::Unknown);
    }

    #[test]
    fn parse_intent_search_with_query() {
        let intent = parse_browse_intent(r#"{"action": "search", "query": "trains"}"#);
        assert_eq!(intent.action, BrowseAction::Search);
        assert_eq!(intent.query.as_deref(), Some("trains"));
    }

    #[test]
    fn parse_intent_fenced_json() {
        let intent = parse_browse_intent("```json\n{\"action\": \"go_back\"}\n```");
        assert_eq!(intent.action, BrowseAction::GoBack);
    }

    #[test]
    fn parse_intent_link_index() {
        let intent = parse_browse_intent(r#"{"action": "click_link", "link_index": 3}"#);
        assert_eq!(intent.action, BrowseAction::ClickLink);
        assert_eq!(intent.link_index, Some(3));
    }

    #[test]
    fn web_mode_command_table() {
        let cases = [
            ("", BrowseAction::Unknown),
            ("   ", BrowseAction::Unknown),
            ("browse on", BrowseAction::BrowseOn),
            ("browse off", BrowseAction::BrowseOff),
            ("save page", BrowseAction::StorePage),
            ("back", BrowseAction::GoBack),
            ("scroll up", BrowseAction::ScrollUp),
            ("scroll down", BrowseAction::ScrollDown),
            ("close", BrowseAction::CloseTab),
            ("close tab", BrowseAction::CloseTab),
            ("search cats", BrowseAction::Search),
            ("open 1", BrowseAction::ClickLink),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_web_mode_command(raw).action, expected, "input {raw:?}");
        }
    }

    #[test]
    fn web_mode_search_keeps_the_query() {
        let intent = parse_web_mode_command("search high speed rail");
        assert_eq!(intent.query.as_deref(), Some("high speed rail"));
    }

    #[test]
    fn web_mode_open_sir_is_link_one() {
        let intent = parse_web_mode_command("open sir");
        assert_eq!(intent.action, BrowseAction::ClickLink);
        assert_eq!(intent.link_index, Some(1));
    }

    #[test]
    fn web_mode_open_number() {
        let intent = parse_web_mode_command("open 2");
        assert_eq!(intent.action, BrowseAction::ClickLink);
        assert_eq!(intent.link_index, Some(2));
    }

    #[test]
    fn set_action_drops_unrelated_fields() {
        let mut intent = parse_browse_intent(r#"{"action": "search", "query": "cats"}"#);
        intent.set_action(BrowseAction::GoBack);
        assert_eq!(intent.query, None);
    }
}
