/// Canonical form: lowercase, non-alphanumerics collapsed to single
/// spaces, trimmed. Two keywords are duplicates iff their canonical forms
/// are equal.
pub fn normalize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Autocomplete noise: a candidate that differs from the seed only by a
/// single one-character token prepended or appended, or by a trailing
/// single character within a ±2 length envelope.
pub fn is_low_signal_variant(candidate: &str, seed: &str) -> bool {
    let candidate = normalize(candidate);
    let seed = normalize(seed);

    if candidate.is_empty() || seed.is_empty() || candidate == seed {
        return false;
    }

    let candidate_tokens: Vec<&str> = candidate.split(' ').collect();
    let seed_tokens: Vec<&str> = seed.split(' ').collect();

    if candidate_tokens.len() == seed_tokens.len() + 1 {
        let first = candidate_tokens.first().copied().unwrap_or("");
        let last = candidate_tokens.last().copied().unwrap_or("");
        if last.len() == 1 && candidate_tokens[..candidate_tokens.len() - 1].join(" ") == seed {
            return true;
        }
        if first.len() == 1 && candidate_tokens[1..].join(" ") == seed {
            return true;
        }
    }

    let last = candidate_tokens.last().copied().unwrap_or("");
    if last.len() == 1
        && candidate.starts_with(seed.as_str())
        && candidate.len().abs_diff(seed.len()) <= 2
    {
        return true;
    }

    if candidate.len() <= seed.len() + 2 && candidate.starts_with(seed.as_str()) {
        let suffix = candidate[seed.len()..].trim();
        if suffix.len() == 1 {
            return true;
        }
    }

    false
}

/// Include/exclude term filtering over canonical forms: every include term
/// must appear, no exclude term may.
pub fn matches_include_exclude(keyword: &str, include: &[String], exclude: &[String]) -> bool {
    let keyword = normalize(keyword);
    let includes: Vec<String> = include
        .iter()
        .map(|t| normalize(t))
        .filter(|t| !t.is_empty())
        .collect();
    let excludes: Vec<String> = exclude
        .iter()
        .map(|t| normalize(t))
        .filter(|t| !t.is_empty())
        .collect();

    if !includes.is_empty() && !includes.iter().all(|term| keyword.contains(term.as_str())) {
        return false;
    }
    if excludes.iter().any(|term| keyword.contains(term.as_str())) {
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_casing_and_punctuation() {
        assert_eq!(normalize(" How to Edit Videos!! "), "how to edit videos");
        assert_eq!(normalize("a---b  c"), "a b c");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn flags_single_letter_appended_variants() {
        assert!(is_low_signal_variant(
            "how to edit videos a",
            "how to edit videos"
        ));
    }

    #[test]
    fn flags_single_letter_prepended_variants() {
        assert!(is_low_signal_variant(
            "a how to edit videos",
            "how to edit videos"
        ));
    }

    #[test]
    fn does_not_flag_real_extensions() {
        assert!(!is_low_signal_variant(
            "how to edit videos fast",
            "how to edit videos"
        ));
        assert!(!is_low_signal_variant(
            "how to edit videos",
            "how to edit videos"
        ));
    }

    #[test]
    fn include_exclude_terms_apply_on_canonical_forms() {
        let none: Vec<String> = Vec::new();
        let terms = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

        assert!(matches_include_exclude(
            "how to edit videos",
            &terms(&["edit", "videos"]),
            &none
        ));
        assert!(!matches_include_exclude(
            "how to edit videos",
            &terms(&["edit", "tiktok"]),
            &none
        ));
        assert!(matches_include_exclude(
            "how to edit videos",
            &none,
            &terms(&["tiktok"])
        ));
        assert!(!matches_include_exclude(
            "how to edit tiktok videos",
            &none,
            &terms(&["tiktok"])
        ));
    }
}
