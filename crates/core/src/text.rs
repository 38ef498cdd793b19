//! Text normalization helpers shared by the filters, the response
//! selector, and the curation pass.

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalization used to decide "the model repeated the user verbatim":
/// lowercased, whitespace-collapsed, trailing sentence punctuation removed.
pub fn normalize_for_repeat(s: &str) -> String {
    let collapsed = collapse_whitespace(&s.to_lowercase());
    collapsed
        .trim_end_matches(['.', '!', '?', ' '])
        .to_string()
}

/// Grouping key for recurrence counting: lowercased, whitespace-collapsed,
/// trailing punctuation stripped.
pub fn pattern_key(s: &str) -> String {
    let collapsed = collapse_whitespace(&s.to_lowercase());
    collapsed
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .to_string()
}
