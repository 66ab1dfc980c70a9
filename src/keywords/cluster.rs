use std::collections::HashMap;

use serde::Serialize;

use crate::keywords::normalize::normalize;
use crate::scoring::tokenize::tokenize;
use crate::types::KeywordIdea;

#[derive(Debug, Clone, Serialize)]
pub struct KeywordCluster {
    pub id: String,
    /// The member with the highest demand volume, ties broken by the
    /// shorter string.
    pub label: String,
    pub keywords: Vec<String>,
}

/// Groups ideas whose stopword-free sorted token multiset is identical.
/// Pure and deterministic: same token sets in, same clusters out, in
/// first-seen order.
pub fn cluster_ideas(ideas: &[KeywordIdea]) -> Vec<KeywordCluster> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&KeywordIdea>> = HashMap::new();

    for idea in ideas {
        let mut tokens = tokenize(&idea.keyword);
        tokens.sort();
        let base_key = if tokens.is_empty() {
            normalize(&idea.keyword)
        } else {
            tokens.join(" ")
        };
        let key = if base_key.is_empty() {
            idea.keyword.clone()
        } else {
            base_key
        };

        let group = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Vec::new()
        });
        group.push(idea);
    }

    order
        .into_iter()
        .map(|key| {
            let members = groups.remove(&key).unwrap_or_default();
            let mut ranked = members.clone();
            ranked.sort_by(|a, b| {
                b.volume
                    .partial_cmp(&a.volume)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.keyword.len().cmp(&b.keyword.len()))
            });
            KeywordCluster {
                label: ranked
                    .first()
                    .map(|idea| idea.keyword.clone())
                    .unwrap_or_default(),
                keywords: members.iter().map(|idea| idea.keyword.clone()).collect(),
                id: key,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn idea(keyword: &str, volume: f64) -> KeywordIdea {
        KeywordIdea {
            keyword: keyword.to_string(),
            volume,
            monthly_volumes: None,
        }
    }

    #[test]
    fn clusters_by_token_multiset_and_labels_by_volume() {
        let ideas = vec![
            idea("how to edit videos", 1200.0),
            idea("edit videos how to", 900.0),
            idea("best video editor", 700.0),
        ];

        let clusters = cluster_ideas(&ideas);
        assert_eq!(clusters.len(), 2);

        let primary = clusters
            .iter()
            .find(|c| c.keywords.contains(&"how to edit videos".to_string()))
            .expect("cluster containing the seed phrasing");
        assert_eq!(primary.label, "how to edit videos");
        assert_eq!(primary.keywords.len(), 2);
    }

    #[test]
    fn volume_ties_break_toward_shorter_keyword() {
        let ideas = vec![
            idea("video editing tips", 500.0),
            idea("tips video editing", 500.0),
        ];
        let clusters = cluster_ideas(&ideas);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].label, "video editing tips");
    }

    #[test]
    fn stopword_only_keywords_fall_back_to_canonical_form() {
        let ideas = vec![idea("the and of", 10.0), idea("how to", 5.0)];
        let clusters = cluster_ideas(&ideas);
        assert_eq!(clusters.len(), 2, "distinct canonical fallbacks stay apart");
    }
}
