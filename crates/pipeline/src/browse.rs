//! Browse-intent classification and dispatch.
//!
//! The LLM proposes an intent record; deterministic overrides then correct
//! it for trigger phrases the model routinely misparses ("search for X"
//! coming back as a click, "scroll down" coming back as a search, ordinals
//! and "the link for X" variants). Mode toggles are applied here; every
//! other action goes to the injected executor, which owns the actual
//! browser work. Actions that must run on the user's client surface
//! through the outcome's `open_url`, which the pipeline emits as an event.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use talkie_core::{BrowseHandler, BrowseOutcome, LlmClient};
use talkie_llm::browse::{
    build_browse_intent_prompts, build_web_mode_prompts, parse_browse_intent,
    parse_web_mode_command, BrowseAction, BrowseIntent,
};

pub const BROWSE_ON_MESSAGE: &str = "Browse mode is on. Say \"search\", then your search term.";
pub const BROWSE_OFF_MESSAGE: &str = "Browse mode is off.";

static ORDINAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:the\s+)?(first|1st|one|second|2nd|two|third|3rd|three|fourth|4th|four|fifth|5th|five)\s*(?:link\s*)?(?:down)?\.?$",
    )
    .unwrap()
});

static LINK_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:link\s+number\s+)?(\d+)\s*(?:link\s*)?(?:down)?\.?$").unwrap());

static SIR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^sir\.?$").unwrap());

fn ordinal_value(word: &str) -> Option<u32> {
    match word.to_lowercase().as_str() {
        "first" | "1st" | "one" => Some(1),
        "second" | "2nd" | "two" => Some(2),
        "third" | "3rd" | "three" => Some(3),
        "fourth" | "4th" | "four" => Some(4),
        "fifth" | "5th" | "five" => Some(5),
        _ => None,
    }
}

/// Parse "the third link", "3rd link", "link number 2", "4", ...
fn link_position(rest: &str) -> Option<u32> {
    let rest = rest.trim();
    if let Some(c) = ORDINAL_RE.captures(rest) {
        return ordinal_value(&c[1]);
    }
    if let Some(c) = LINK_NUMBER_RE.captures(rest) {
        return c[1].parse().ok();
    }
    None
}

/// Strip "the link for " / "link for " so we match page text
/// (e.g. "CNN breaking news").
fn normalize_link_text(rest: &str) -> String {
    let r = rest.trim();
    let rl = r.to_lowercase();
    for prefix in ["the link for ", "link for "] {
        if rl.starts_with(prefix) {
            return r[prefix.len()..].trim().to_string();
        }
    }
    r.to_string()
}

/// Strip trailing speech/STT filler so "... in Chrome. Click." or
/// "... Scroll down." still matches a result title.
fn strip_open_utterance_suffix(rest: &str) -> String {
    let r = rest.trim();
    let rl = r.to_lowercase();
    // Longest first, so " in chrome. scroll down." goes before " in chrome.".
    const SUFFIXES: &[&str] = &[
        " in chrome. scroll down.",
        " in chrome. scroll up.",
        " in chrome. scroll.",
        " in chrome, scroll down.",
        " in chrome, scroll up.",
        " in chrome, scroll.",
        " in chrome. click.",
        " in chrome.",
        " scroll down.",
        " scroll up.",
        " scroll.",
        " click.",
        " click",
    ];
    for suffix in SUFFIXES {
        if rl.ends_with(suffix) {
            return r[..r.len() - suffix.len()].trim().to_string();
        }
    }
    r.to_string()
}

/// Return the utterance from its browse verb onward, dropping leading
/// filler ("please click...", "I want to select...").
fn strip_leading_filler(utterance: &str) -> String {
    let u = utterance.trim();
    if u.is_empty() {
        return u.to_string();
    }
    let ul = u.to_lowercase();
    if ul.starts_with("click")
        || ul.starts_with("select ")
        || ul.starts_with("open ")
        || ul.starts_with("the link for ")
        || ul.starts_with("link for ")
    {
        return u.to_string();
    }
    for phrase in [
        " the link for ",
        " link for ",
        " click ",
        " clicks ",
        " clicked ",
        " select ",
        " open the ",
        " open ",
    ] {
        if let Some(idx) = ul.find(phrase) {
            // Lowercasing can shift byte offsets for some scripts; only
            // slice when the boundary still lines up.
            if u.is_char_boundary(idx + 1) {
                return u[idx + 1..].trim().to_string();
            }
        }
    }
    u.to_string()
}

/// If the user said "search", "searching", or "search for" anywhere, force
/// a search intent with the extracted query, unless the utterance clearly
/// asks for a scroll/click/select/open instead.
fn force_search_intent(utterance: &str, intent: &mut BrowseIntent) {
    let u = utterance.trim();
    if u.is_empty() {
        return;
    }
    let ul = u.to_lowercase();
    if ul.starts_with("scroll ")
        || ul == "scroll"
        || ul.starts_with("click")
        || ul.starts_with("select ")
        || ul.starts_with("open ")
        || ul.starts_with("the link for ")
        || ul.starts_with("link for ")
    {
        return;
    }
    for phrase in ["searching for ", "search for "] {
        if let Some(idx) = ul.find(phrase) {
            if !u.is_char_boundary(idx + phrase.len()) {
                continue;
            }
            let query = u[idx + phrase.len()..].trim();
            if !query.is_empty() {
                intent.set_action(BrowseAction::Search);
                intent.query = Some(query.to_string());
                debug!(query, "browse: forced search intent from utterance");
                return;
            }
        }
    }
    for phrase in [" searching ", " search "] {
        if let Some(idx) = ul.find(phrase) {
            if !u.is_char_boundary(idx + phrase.len()) {
                continue;
            }
            let query = u[idx + phrase.len()..].trim();
            if !query.is_empty() {
                intent.set_action(BrowseAction::Search);
                intent.query = Some(query.to_string());
                debug!(query, "browse: forced search intent from utterance");
                return;
            }
        }
    }
    for prefix in ["searching ", "search "] {
        if ul.starts_with(prefix) && u.len() > prefix.len() {
            let query = u[prefix.len()..].trim().to_string();
            intent.set_action(BrowseAction::Search);
            debug!(query = %query, "browse: forced search intent from utterance");
            intent.query = Some(query);
            return;
        }
    }
}

/// "save page" / "store this page" and friends force `store_page`.
fn force_store_intent(utterance: &str, intent: &mut BrowseIntent) {
    let ul = utterance.trim().to_lowercase();
    if ul.is_empty() {
        return;
    }
    for phrase in [
        "save page",
        "save the page",
        "store this page",
        "store the page",
        "store page",
        "store this",
    ] {
        if ul.contains(phrase) {
            intent.set_action(BrowseAction::StorePage);
            debug!("browse: forced store_page from utterance");
            return;
        }
    }
}

/// "go back" / "previous page" / "back" force `go_back`.
fn force_go_back_intent(utterance: &str, intent: &mut BrowseIntent) {
    let ul = utterance.trim().to_lowercase();
    if ul.is_empty() {
        return;
    }
    for phrase in ["go back", "previous page", "go to previous page", "back"] {
        if ul == phrase
            || ul.contains(phrase)
            || ul.starts_with(&format!("{phrase} "))
            || ul.ends_with(&format!(" {phrase}"))
        {
            intent.set_action(BrowseAction::GoBack);
            debug!("browse: forced go_back from utterance");
            return;
        }
    }
}

fn force_click_from_rest(rest: &str, intent: &mut BrowseIntent) {
    intent.set_action(BrowseAction::ClickLink);
    let rest = rest.trim();
    if rest.is_empty() {
        // Bare "click": use the remembered selection.
        intent.link_index = None;
        intent.link_text = None;
        debug!("browse: forced click_link (no specifier)");
        return;
    }
    if let Some(index) = link_position(rest) {
        intent.set_link_index(index);
        debug!(index, "browse: forced click_link by position");
        return;
    }
    let text = strip_open_utterance_suffix(&normalize_link_text(rest));
    debug!(link_text = %text, "browse: forced click_link by title");
    intent.set_link_text(text);
}

/// "click ...", "select ...", "open ...", and "the link for X" force the
/// matching link action, extracting an index or title.
fn force_click_or_select_intent(utterance: &str, intent: &mut BrowseIntent) {
    let u = strip_leading_filler(utterance);
    if u.is_empty() {
        return;
    }
    let ul = u.to_lowercase();

    // "the link for X": STT often drops the leading "click".
    if ul.starts_with("the link for ") || ul.starts_with("link for ") {
        intent.set_action(BrowseAction::ClickLink);
        intent.set_link_text(normalize_link_text(&u));
        debug!("browse: forced click_link (the link for)");
        return;
    }

    if ul.starts_with("open the ") || ul.starts_with("open ") {
        let rest = if ul.starts_with("open the ") {
            u["open the ".len()..].trim()
        } else {
            u["open ".len()..].trim()
        };
        if rest.is_empty() {
            return;
        }
        let rest_lower = rest.to_lowercase();
        // Bare hostname: open as a URL in a new tab. Titles go through
        // "click [title]" instead.
        if rest.contains('.') && !rest_lower.contains("link") && !rest.contains(' ') {
            intent.set_action(BrowseAction::OpenUrl);
            let url = if rest.contains("://") {
                rest.to_string()
            } else {
                format!("https://{rest}")
            };
            debug!(url = %url, "browse: forced open_url from utterance");
            intent.url = Some(url);
            return;
        }
        // "open sir" is a common STT mishear of "open 1".
        if SIR_RE.is_match(rest) {
            intent.set_action(BrowseAction::ClickLink);
            intent.set_link_index(1);
            debug!("browse: forced click_link from 'open sir'");
            return;
        }
        if let Some(index) = link_position(rest) {
            intent.set_action(BrowseAction::ClickLink);
            intent.set_link_index(index);
            debug!(index, "browse: forced click_link from 'open'");
            return;
        }
        if rest_lower.contains("link") {
            intent.set_action(BrowseAction::ClickLink);
            intent.set_link_text(normalize_link_text(rest));
            debug!("browse: forced click_link from 'open ... link'");
        }
        // "open [title]" is unsupported; open means URL only.
        return;
    }

    if ul == "click"
        || ul == "clicks"
        || ul == "clicked"
        || ul.starts_with("click ")
        || ul.starts_with("clicks ")
        || ul.starts_with("clicked ")
    {
        let rest = ["clicked ", "clicks ", "click "]
            .iter()
            .find_map(|p| ul.starts_with(*p).then(|| u[p.len()..].trim()))
            .unwrap_or("");
        force_click_from_rest(rest, intent);
        return;
    }

    if ul.starts_with("select ") {
        let rest = u["select ".len()..].trim();
        intent.set_action(BrowseAction::SelectLink);
        if rest.is_empty() {
            return;
        }
        if let Some(index) = link_position(rest) {
            intent.set_link_index(index);
            debug!(index, "browse: forced select_link by position");
        } else {
            intent.set_link_text(normalize_link_text(rest));
            debug!("browse: forced select_link by title");
        }
    }
}

/// "scroll up/down/left/right" forces the scroll action, unless the user
/// was actually asking to search for those words.
fn force_scroll_intent(utterance: &str, intent: &mut BrowseIntent) {
    let u = utterance.trim().to_lowercase();
    if u.is_empty() || u == "scroll" {
        return;
    }
    if u.contains("search for ")
        || u.contains("searching for ")
        || (u.starts_with("search ") && u.len() > "search ".len())
    {
        return;
    }
    if !u.starts_with("scroll ") && !u.contains(" scroll ") {
        return;
    }
    let rest = u
        .split_once("scroll")
        .map(|(_, r)| r)
        .unwrap_or("")
        .replace("the page", " ");
    let rest = rest
        .trim()
        .trim_end_matches(|c: char| ".,;!?".contains(c))
        .trim();
    for direction in ["up", "down", "left", "right"] {
        if rest == direction
            || rest.starts_with(&format!("{direction} "))
            || rest.ends_with(&format!(" {direction}"))
        {
            let action = match direction {
                "up" => BrowseAction::ScrollUp,
                "down" => BrowseAction::ScrollDown,
                "left" => BrowseAction::ScrollLeft,
                _ => BrowseAction::ScrollRight,
            };
            intent.set_action(action);
            debug!(direction, "browse: forced scroll intent from utterance");
            return;
        }
    }
}

/// "close" / "close tab" forces `close_tab`.
fn force_close_tab_intent(utterance: &str, intent: &mut BrowseIntent) {
    let u = utterance.trim().to_lowercase();
    for phrase in ["close tab", "close"] {
        if u == phrase || u.starts_with(&format!("{phrase} ")) {
            intent.set_action(BrowseAction::CloseTab);
            debug!("browse: forced close_tab from utterance");
            return;
        }
    }
}

/// Apply every deterministic override, in the order later rules may refine
/// earlier ones.
pub fn apply_overrides(utterance: &str, mut intent: BrowseIntent) -> BrowseIntent {
    force_search_intent(utterance, &mut intent);
    force_store_intent(utterance, &mut intent);
    force_go_back_intent(utterance, &mut intent);
    force_click_or_select_intent(utterance, &mut intent);
    force_scroll_intent(utterance, &mut intent);
    force_close_tab_intent(utterance, &mut intent);
    intent
}

/// Executes classified intents against an actual browser. External to the
/// core: implementations fetch, click, and store pages; anything aimed at
/// the user's client comes back in the outcome's `open_url`.
#[async_trait]
pub trait BrowseActionExecutor: Send + Sync {
    /// `None` means the action produced nothing to say or apply.
    async fn execute(&self, intent: &BrowseIntent) -> Option<BrowseOutcome>;
}

/// The default [`BrowseHandler`]: classify with the LLM, correct with the
/// overrides, handle mode toggles locally, delegate the rest.
pub struct IntentBrowseHandler {
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn BrowseActionExecutor>,
    /// When set, classification uses the plain-command web-mode prompt.
    web_mode_system_prompt: Option<String>,
}

impl IntentBrowseHandler {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<dyn BrowseActionExecutor>) -> Self {
        Self {
            llm,
            executor,
            web_mode_system_prompt: None,
        }
    }

    pub fn with_web_mode_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.web_mode_system_prompt = system_prompt;
        self
    }

    async fn classify(&self, utterance: &str) -> BrowseIntent {
        let intent = if let Some(system) = &self.web_mode_system_prompt {
            let (system, user) = build_web_mode_prompts(utterance, Some(system));
            parse_web_mode_command(&self.llm.generate(&user, Some(&system)).await)
        } else {
            let (system, user) = build_browse_intent_prompts(utterance);
            parse_browse_intent(&self.llm.generate(&user, Some(&system)).await)
        };
        apply_overrides(utterance, intent)
    }
}

#[async_trait]
impl BrowseHandler for IntentBrowseHandler {
    async fn handle(&self, utterance: &str) -> Option<BrowseOutcome> {
        let intent = self.classify(utterance).await;
        debug!(action = ?intent.action, "browse intent classified");
        match intent.action {
            BrowseAction::Unknown => None,
            BrowseAction::BrowseOn => Some(BrowseOutcome {
                message: Some(BROWSE_ON_MESSAGE.to_string()),
                set_browse_mode: Some(true),
                ..BrowseOutcome::default()
            }),
            BrowseAction::BrowseOff => Some(BrowseOutcome {
                message: Some(BROWSE_OFF_MESSAGE.to_string()),
                set_browse_mode: Some(false),
                ..BrowseOutcome::default()
            }),
            _ => self.executor.execute(&intent).await,
        }
    }
}
