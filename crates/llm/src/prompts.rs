//! Prompt builders and response parsers.
//!
//! Prompt text can be overridden from configuration; the constants here are
//! the fallback defaults. The regeneration parser is deliberately forgiving:
//! small local models wrap JSON in code fences, echo the instructions, or
//! append certainty remarks, and every one of those shapes must still yield
//! a speakable sentence.

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_SYSTEM_BASE: &str = "You assist a speech-impaired user in conversation. You will receive a partial or fragmented sentence from their speech recognition (e.g. a few words, a phrase, or an incomplete thought). Your job is to turn that into one clear, complete, natural sentence that conveys what they mean. The sentence is the user speaking for themselves: it must always be in first person (e.g. \"I want water\", \"I'm cold\", \"I need to rest\"). It will be shown and spoken to the person they are talking to (e.g. a caregiver or family member), so it should sound like what the user would say in normal conversation—never third person or \"the user wants...\". Keep it concise. Do not explain or add meta-commentary; output only the completed first-person sentence. Output only the single completed sentence, no preamble or suffix.";

pub const DEFAULT_USER_PROMPT_TEMPLATE: &str =
    "Partial sentence from speech-impaired user: {transcription}";

/// Regeneration: raw STT output -> single sentence most likely reflecting
/// user intent.
pub const DEFAULT_REGENERATION_SYSTEM: &str = "You interpret raw speech-recognition output from a speech-impaired user. The text is often fragmented, misheard, or contains homophones (e.g. \"hockey\" for \"I'm\", \"outlook\" for \"cat out\"). Your job is to output exactly one sentence that has the highest probability of being what the user intended, as the user would say it to the person they are talking to (e.g. a caregiver). Use first person for statements about themselves (e.g. \"I want water.\", \"My leg hurts.\", \"I'm cold.\"). For requests to the listener—asking them to do something—output the request as the user would say it (e.g. \"Pass me the salt.\", \"Pass me the chicken.\", \"Could you turn off the light?\"), not as first-person past tense (\"I passed the salt\" is wrong when they mean pass me the salt). If the user doesn't use \"I\" (or equivalent), or uses \"you\" or refers to the person they're asking, it's likely a question—output it as the question they would ask (e.g. \"Do you have the time?\", \"Could you help?\", \"Are you coming?\"). Output only that sentence—no preamble, no explanation. If the input is gibberish or unintelligible, output exactly: I didn't catch that.";

/// Appended to the regeneration system prompt when certainty is requested,
/// so the model returns JSON.
pub const REGENERATION_JSON_SUFFIX: &str = "Output your reply as a single JSON object with exactly two keys: \"sentence\" (the sentence as above, or \"I didn't catch that.\" if unintelligible) and \"certainty\" (0-100, your confidence that this sentence matches the user's intent). No other text, no markdown.";

pub const DEFAULT_REGENERATION_USER_TEMPLATE: &str = "Raw speech recognition: {transcription}";

pub const DOCUMENT_QA_SYSTEM_BASE: &str = "Answer the following question using only the provided context from the user's documents. If the context does not contain enough information, say so. Do not make up information. Output only the answer, no preamble.";

/// Instruction attached to exported fine-tuning records.
pub const DEFAULT_EXPORT_INSTRUCTION: &str = "You assist a speech-impaired user. Turn their partial speech into one clear, complete sentence in first person (as the user speaking: I want..., I need...). Output only that sentence.";

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").unwrap());

static CERTAINTY_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\(?\s*certainty:?\s*\d+\s*%?\s*\)?[.\s]*$").unwrap());

static OUTPUT_REPLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)output your reply as:?\s*"([^"]+)""#).unwrap());

fn filled_template(template: Option<&str>, default: &str, transcription: &str) -> String {
    let template = template
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(default);
    template.replace("{transcription}", transcription.trim())
}

/// Completion system prompt: base instructions, then profile context, then
/// retrieved background, each only when non-empty.
pub fn build_system_prompt(
    profile_context: Option<&str>,
    system_base: Option<&str>,
    retrieved_context: Option<&str>,
) -> String {
    let base = system_base
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SYSTEM_BASE);
    let mut parts = vec![base.to_string()];
    if let Some(profile) = profile_context.map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(profile.to_string());
    }
    if let Some(context) = retrieved_context.map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(format!(
            "Relevant background (from the user's documents/publications when applicable):\n{context}"
        ));
    }
    parts.join("\n\n")
}

/// Completion user prompt from the (possibly partial) transcription.
pub fn build_user_prompt(transcription: &str, user_prompt_template: Option<&str>) -> String {
    filled_template(user_prompt_template, DEFAULT_USER_PROMPT_TEMPLATE, transcription)
}

/// System and user prompts for the regeneration step. With
/// `request_certainty`, the strict JSON clause is appended to the system
/// prompt. Returns `(system, user)`.
pub fn build_regeneration_prompts(
    transcription: &str,
    system_prompt: Option<&str>,
    user_prompt_template: Option<&str>,
    request_certainty: bool,
) -> (String, String) {
    let mut system = system_prompt
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_REGENERATION_SYSTEM)
        .to_string();
    if request_certainty {
        system = format!("{}\n\n{}", system.trim_end(), REGENERATION_JSON_SUFFIX);
    }
    let user = filled_template(
        user_prompt_template,
        DEFAULT_REGENERATION_USER_TEMPLATE,
        transcription,
    );
    (system, user)
}

/// Document-QA system prompt: constrained instructions plus retrieved
/// context.
pub fn build_document_qa_system_prompt(retrieved_context: &str) -> String {
    let context = retrieved_context.trim();
    if context.is_empty() {
        DOCUMENT_QA_SYSTEM_BASE.to_string()
    } else {
        format!("{DOCUMENT_QA_SYSTEM_BASE}\n\nRelevant context:\n{context}")
    }
}

/// Document-QA user prompt: the question itself.
pub fn build_document_qa_user_prompt(question: &str) -> String {
    let q = question.trim();
    if q.is_empty() {
        "No question provided.".to_string()
    } else {
        q.to_string()
    }
}

/// Remove a trailing `(certainty: N)` style annotation the model sometimes
/// appends to the sentence itself.
pub fn strip_certainty_from_response(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    CERTAINTY_SUFFIX_RE.replace(text, "").trim().to_string()
}

/// Strip one surrounding fenced code block, if present.
pub(crate) fn strip_fence(text: &str) -> &str {
    CODE_FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str().trim())
}

/// Recover a speakable sentence from a non-JSON regeneration reply.
fn fallback_sentence_from_raw(raw: &str) -> String {
    let text = raw.trim();
    // The model echoed the instruction with the sentence quoted after it.
    if let Some(c) = OUTPUT_REPLY_RE.captures(text) {
        return c[1].trim().to_string();
    }
    if let Some(rest) = text.strip_prefix("Sentence:") {
        return strip_certainty_from_response(rest.trim());
    }
    // "I didn't catch that." followed by meta-commentary: keep only the
    // fallback sentence.
    const DIDNT_CATCH: &str = "I didn't catch that.";
    if text.starts_with(DIDNT_CATCH) {
        return DIDNT_CATCH.to_string();
    }
    strip_certainty_from_response(text)
}

fn certainty_from_value(value: &serde_json::Value) -> Option<u8> {
    let c = match value {
        serde_json::Value::Number(n) => n.as_f64()? as i64,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(c.clamp(0, 100) as u8)
}

/// Parse the regeneration model output.
///
/// JSON with `sentence` and optional `certainty` yields
/// `(sentence, certainty clamped to 0..=100)`; anything else falls back to
/// the recovered raw text with no certainty.
pub fn parse_regeneration_response(raw: &str) -> (String, Option<u8>) {
    if raw.trim().is_empty() {
        return (String::new(), None);
    }
    let text = strip_fence(raw.trim());
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return (fallback_sentence_from_raw(raw), None);
    };
    let Some(obj) = value.as_object() else {
        return (raw.trim().to_string(), None);
    };
    let Some(sentence_value) = obj.get("sentence") else {
        return (raw.trim().to_string(), None);
    };
    let sentence = match sentence_value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let sentence = strip_certainty_from_response(sentence.trim());
    let sentence = if sentence.is_empty() {
        raw.trim().to_string()
    } else {
        sentence
    };
    let certainty = obj.get("certainty").and_then(certainty_from_value);
    (sentence, certainty)
}
