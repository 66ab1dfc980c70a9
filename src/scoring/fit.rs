use crate::scoring::opportunity::clamp;
use crate::scoring::tokenize::overlap_ratio;

/// Weighted token overlap between a keyword and one result:
/// title 0.6, description 0.3, tags 0.1, clamped to [0,1].
pub fn fit_score(
    keyword_tokens: &[String],
    title_tokens: &[String],
    desc_tokens: &[String],
    tag_tokens: &[String],
) -> f64 {
    let title = overlap_ratio(keyword_tokens, title_tokens);
    let desc = overlap_ratio(keyword_tokens, desc_tokens);
    let tags = overlap_ratio(keyword_tokens, tag_tokens);
    clamp(0.6 * title + 0.3 * desc + 0.1 * tags, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::tokenize::tokenize;

    #[test]
    fn full_overlap_everywhere_scores_one() {
        let tokens = tokenize("grow youtube");
        let fit = fit_score(&tokens, &tokens, &tokens, &tokens);
        assert!((fit - 1.0).abs() < 1e-9, "fit={fit}");
    }

    #[test]
    fn title_carries_most_weight() {
        let keyword = tokenize("grow youtube");
        let title_only = fit_score(&keyword, &keyword, &[], &[]);
        let desc_only = fit_score(&keyword, &[], &keyword, &[]);
        assert!((title_only - 0.6).abs() < 1e-9);
        assert!((desc_only - 0.3).abs() < 1e-9);
    }
}
