use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "for", "to", "of", "in", "on", "with", "how", "what", "why",
    "when", "where", "is", "are", "was", "were", "be", "by", "from", "at", "your", "you", "me",
    "my", "we", "our", "us",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercased alphanumeric tokens with stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            current.push(c.to_ascii_lowercase());
        } else if !current.is_empty() {
            if !is_stopword(&current) {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if !current.is_empty() && !is_stopword(&current) {
        tokens.push(current);
    }
    tokens
}

/// Fraction of the unique keyword tokens present in the field, in [0,1].
pub fn overlap_ratio(keyword_tokens: &[String], field_tokens: &[String]) -> f64 {
    if keyword_tokens.is_empty() {
        return 0.0;
    }
    let field: HashSet<&str> = field_tokens.iter().map(|t| t.as_str()).collect();
    let unique: HashSet<&str> = keyword_tokens.iter().map(|t| t.as_str()).collect();
    let overlap = unique.iter().filter(|t| field.contains(**t)).count();
    overlap as f64 / unique.len() as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_punctuation_and_stopwords() {
        assert_eq!(tokenize("How to grow on YouTube!"), vec!["grow", "youtube"]);
        assert!(tokenize("the and of").is_empty());
    }

    #[test]
    fn overlap_counts_unique_keyword_tokens() {
        let keyword = tokenize("grow grow youtube");
        let field = tokenize("grow a channel");
        assert_eq!(overlap_ratio(&keyword, &field), 0.5);
        assert_eq!(overlap_ratio(&[], &field), 0.0);
    }
}
