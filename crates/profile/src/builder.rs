//! Pure assembly of the profile text.
//!
//! Skips invalid entries and empty sections; bad input degrades to fewer
//! sections, never to an error.

/// Everything the profile text is built from, already fetched.
#[derive(Debug, Clone, Default)]
pub struct ProfileInputs {
    pub user_context: Option<String>,
    pub preferred_name: Option<String>,
    pub pronouns: Option<String>,
    /// Newest first.
    pub training_facts: Vec<String>,
    /// `(original, corrected)`, heaviest first.
    pub corrections: Vec<(String, String)>,
    /// `(transcription, response)`, heaviest first.
    pub accepted: Vec<(String, String)>,
    pub correction_display_cap: usize,
    pub accepted_display_cap: usize,
}

fn section_user_context(uc: Option<&str>) -> Option<String> {
    let uc = uc?.trim();
    if uc.is_empty() {
        return None;
    }
    Some(format!(
        "User context (tailor vocabulary and topic to this person):\n{uc}"
    ))
}

fn section_preferred_name(name: Option<&str>) -> Option<String> {
    let name = name?.trim();
    if name.is_empty() {
        return None;
    }
    Some(format!("The user's preferred name is {name}."))
}

fn section_pronouns(pronouns: Option<&str>) -> Option<String> {
    let pronouns = pronouns?.trim();
    if pronouns.is_empty() {
        return None;
    }
    Some(format!("The user's pronouns are {pronouns}."))
}

fn section_training_facts(facts: &[String]) -> Option<String> {
    let lines: Vec<String> = facts
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(|f| format!("- {f}"))
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "Facts the user has told you (use this context when relevant, e.g. names and relationships):\n{}",
        lines.join("\n")
    ))
}

fn section_corrections(corrections: &[(String, String)], cap: usize) -> Option<String> {
    let mut lines = Vec::new();
    for (orig, corrected) in corrections.iter().take(cap) {
        let orig = orig.trim();
        let corrected = corrected.trim();
        if corrected.is_empty() {
            continue;
        }
        if orig.is_empty() {
            lines.push(format!("- Prefer: \"{corrected}\""));
        } else {
            lines.push(format!("- Prefer: \"{corrected}\" (instead of \"{orig}\")"));
        }
    }
    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "User phrasing preferences (from corrections; prefer these when relevant):\n{}",
        lines.join("\n")
    ))
}

fn section_accepted(accepted: &[(String, String)], cap: usize) -> Option<String> {
    let mut lines = Vec::new();
    for (transcription, response) in accepted.iter().take(cap) {
        let t = transcription.trim();
        let r = response.trim();
        if r.is_empty() {
            continue;
        }
        if t.is_empty() {
            lines.push(format!("- Accepted: \"{r}\""));
        } else {
            lines.push(format!("- When user said \"{t}\", this was accepted: \"{r}\""));
        }
    }
    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "Accepted completions (use similar style when relevant):\n{}",
        lines.join("\n")
    ))
}

/// Build one profile string. Sections appear in a fixed order, each only
/// when non-empty, joined by blank lines.
pub fn build_profile_text(inputs: &ProfileInputs) -> String {
    let sections = [
        section_user_context(inputs.user_context.as_deref()),
        section_preferred_name(inputs.preferred_name.as_deref()),
        section_pronouns(inputs.pronouns.as_deref()),
        section_training_facts(&inputs.training_facts),
        section_corrections(&inputs.corrections, inputs.correction_display_cap),
        section_accepted(&inputs.accepted, inputs.accepted_display_cap),
    ];
    sections
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ProfileInputs {
        ProfileInputs {
            correction_display_cap: 50,
            accepted_display_cap: 30,
            ..ProfileInputs::default()
        }
    }

    #[test]
    fn empty_inputs_build_empty_text() {
        assert_eq!(build_profile_text(&inputs()), "");
    }

    #[test]
    fn sections_appear_in_order() {
        let mut i = inputs();
        i.user_context = Some("Talks about gardening.".to_string());
        i.preferred_name = Some("Sam".to_string());
        i.pronouns = Some("they/them".to_string());
        i.training_facts = vec!["Star is my dog".to_string()];
        i.corrections = vec![("I cold".to_string(), "I'm cold.".to_string())];
        i.accepted = vec![("water".to_string(), "I want water.".to_string())];
        let text = build_profile_text(&i);
        let order = [
            "User context",
            "preferred name is Sam",
            "pronouns are they/them",
            "Facts the user has told you",
            "User phrasing preferences",
            "Accepted completions",
        ];
        let mut last = 0;
        for needle in order {
            let pos = text.find(needle).unwrap_or_else(|| panic!("missing {needle:?}"));
            assert!(pos >= last, "{needle:?} out of order");
            last = pos;
        }
        assert!(text.contains("- Prefer: \"I'm cold.\" (instead of \"I cold\")"));
        assert!(text.contains("- When user said \"water\", this was accepted: \"I want water.\""));
    }

    #[test]
    fn blank_entries_are_skipped() {
        let mut i = inputs();
        i.user_context = Some("   ".to_string());
        i.training_facts = vec!["  ".to_string(), "real fact".to_string()];
        i.corrections = vec![("orig".to_string(), "  ".to_string())];
        let text = build_profile_text(&i);
        assert!(!text.contains("User context"));
        assert!(!text.contains("phrasing preferences"));
        assert!(text.contains("- real fact"));
    }

    #[test]
    fn correction_without_original_has_short_form() {
        let mut i = inputs();
        i.corrections = vec![(String::new(), "I'm cold.".to_string())];
        let text = build_profile_text(&i);
        assert!(text.contains("- Prefer: \"I'm cold.\""));
        assert!(!text.contains("instead of"));
    }

    #[test]
    fn display_caps_bound_the_lists() {
        let mut i = inputs();
        i.correction_display_cap = 2;
        i.corrections = (0..5)
            .map(|n| (format!("o{n}"), format!("c{n}")))
            .collect();
        let text = build_profile_text(&i);
        assert!(text.contains("\"c0\""));
        assert!(text.contains("\"c1\""));
        assert!(!text.contains("\"c2\""));
    }
}
