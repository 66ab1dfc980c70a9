use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::cache::{CacheContext, Caches};
use crate::config::{self, Config};
use crate::error::{AppError, Result};
use crate::gateway::{GatewayConfig, ProviderGateway, ReqwestTransport};
use crate::keywords::{cluster_ideas, is_low_signal_variant, matches_include_exclude, normalize};
use crate::keywordtool::KeywordToolClient;
use crate::scoring::{score_keyword_opportunity, OpportunityReport, ScoreInput};
use crate::types::{ChannelProfile, KeywordIdea, Provider, SuggestionMode};
use crate::usage::{UsageLedger, UsageSummary};
use crate::youtube::{SerpBatch, SerpFetch, SerpOptions, YouTubeClient};

// ---------------------------------------------------------------------------
// Discovery request/response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiscoverRequest {
    pub seed: String,
    pub max_keywords: Option<usize>,
    pub videos_per_keyword: Option<usize>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub mode: SuggestionMode,
    pub min_volume: f64,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub hide_noise: bool,
    pub cluster: bool,
    pub channel: Option<String>,
    pub show_weighted: bool,
    pub stale_on_rate_limit: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscoverMeta {
    pub total_suggestions: usize,
    pub filtered_count: usize,
    pub analyzed_count: usize,
    pub clustered: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub seed: String,
    pub generated_at: String,
    pub served_stale: bool,
    pub results: Vec<OpportunityReport>,
    pub meta: DiscoverMeta,
}

#[derive(Debug, Serialize)]
pub struct EngineStatus {
    pub youtube_configured: bool,
    pub keywordtool_configured: bool,
    pub durable_cache: bool,
    pub trends_enabled: bool,
}

struct AnalysisEntry {
    idea: KeywordIdea,
    related_keywords: Vec<String>,
    cluster_id: Option<String>,
    cluster_label: Option<String>,
    cluster_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The signal-acquisition and scoring engine: owns the caches, the usage
/// ledger and one gateway per provider, and exposes the interface the
/// collaborator layers consume. Constructed once at startup and shared.
pub struct Engine {
    youtube: YouTubeClient,
    keywordtool: KeywordToolClient,
    ledger: Arc<UsageLedger>,
    store: CacheContext,
    youtube_configured: bool,
    keywordtool_configured: bool,
}

impl Engine {
    pub fn from_config(cfg: &Config, store: CacheContext) -> Result<Arc<Self>> {
        let caches = Arc::new(Caches::new());
        let ledger = Arc::new(UsageLedger::new(
            Arc::clone(&caches),
            store.clone(),
            cfg.youtube_daily_quota,
            cfg.keywordtool_daily_limit,
        ));

        let youtube_auth = cfg
            .youtube_api_key
            .iter()
            .map(|key| ("X-Goog-Api-Key".to_string(), key.clone()))
            .collect();
        let youtube_gateway = ProviderGateway::new(
            GatewayConfig {
                provider: Provider::Youtube,
                concurrency: config::YOUTUBE_CONCURRENCY,
                min_interval: Duration::from_millis(config::YOUTUBE_MIN_INTERVAL_MS),
                max_retries: config::MAX_RETRIES,
            },
            Arc::new(ReqwestTransport::new(youtube_auth)?),
            Arc::clone(&ledger),
        );
        let keywordtool_gateway = ProviderGateway::new(
            GatewayConfig {
                provider: Provider::Keywordtool,
                concurrency: config::KEYWORDTOOL_CONCURRENCY,
                min_interval: Duration::from_millis(config::KEYWORDTOOL_MIN_INTERVAL_MS),
                max_retries: config::MAX_RETRIES,
            },
            Arc::new(ReqwestTransport::new(Vec::new())?),
            Arc::clone(&ledger),
        );

        Ok(Arc::new(Self {
            youtube: YouTubeClient::new(
                youtube_gateway,
                Arc::clone(&caches),
                store.clone(),
                cfg.youtube_api_url.clone(),
            ),
            keywordtool: KeywordToolClient::new(
                keywordtool_gateway,
                Arc::clone(&caches),
                store.clone(),
                cfg.keywordtool_api_url.clone(),
                cfg.keywordtool_api_key.clone(),
                cfg.trends_enabled,
            ),
            ledger,
            store,
            youtube_configured: cfg.youtube_api_key.is_some(),
            keywordtool_configured: cfg.keywordtool_api_key.is_some(),
        }))
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            youtube_configured: self.youtube_configured,
            keywordtool_configured: self.keywordtool_configured,
            durable_cache: self.store.is_durable(),
            trends_enabled: self.keywordtool.trends_enabled(),
        }
    }

    fn ensure_youtube(&self) -> Result<()> {
        if self.youtube_configured {
            Ok(())
        } else {
            Err(AppError::Config(
                "YOUTUBE_API_KEY is not configured".to_string(),
            ))
        }
    }

    // -----------------------------------------------------------------------
    // Collaborator interface
    // -----------------------------------------------------------------------

    pub async fn ideas_with_demand(
        &self,
        seed: &str,
        limit: usize,
        country: Option<&str>,
        language: Option<&str>,
        mode: SuggestionMode,
    ) -> Result<Vec<KeywordIdea>> {
        self.keywordtool
            .ideas_with_demand(seed, limit, country, language, mode)
            .await
    }

    pub async fn serp_for_keyword(
        &self,
        keyword: &str,
        max_videos: usize,
        options: SerpOptions,
    ) -> Result<SerpFetch> {
        self.ensure_youtube()?;
        self.youtube
            .serp_for_keyword(keyword, max_videos, options)
            .await
    }

    pub async fn serps_for_keywords(
        &self,
        keywords: &[String],
        max_videos: usize,
        options: SerpOptions,
    ) -> Result<SerpBatch> {
        self.ensure_youtube()?;
        self.youtube
            .serps_for_keywords(keywords, max_videos, options)
            .await
    }

    pub async fn resolve_channel(&self, input: &str) -> Result<Option<String>> {
        self.ensure_youtube()?;
        self.youtube.resolve_channel(input).await
    }

    pub async fn channel_profile(&self, channel_id: &str) -> Result<ChannelProfile> {
        self.ensure_youtube()?;
        self.youtube.channel_profile(channel_id).await
    }

    pub fn score(&self, input: ScoreInput<'_>) -> OpportunityReport {
        score_keyword_opportunity(input)
    }

    pub async fn usage_summary(&self) -> UsageSummary {
        self.ledger.summarize().await
    }

    // -----------------------------------------------------------------------
    // Discovery pipeline
    // -----------------------------------------------------------------------

    /// The full flow: suggestions with demand → noise/term/volume filtering
    /// → dedupe → clustering → SERP batch for the representatives → scoring
    /// → ranked reports.
    pub async fn discover(&self, request: DiscoverRequest) -> Result<DiscoverResponse> {
        self.ensure_youtube()?;
        let seed = request.seed.trim().to_string();
        let max_keywords = request.max_keywords.unwrap_or(config::DEFAULT_MAX_KEYWORDS);
        let videos_per_keyword = request
            .videos_per_keyword
            .unwrap_or(config::DEFAULT_VIDEOS_PER_KEYWORD);
        let suggestion_limit = (max_keywords * 3).clamp(10, config::MAX_SUGGESTION_LIMIT);

        let ideas = self
            .keywordtool
            .ideas_with_demand(
                &seed,
                suggestion_limit,
                request.country.as_deref(),
                request.language.as_deref(),
                request.mode,
            )
            .await?;
        let total_suggestions = ideas.len();

        let filtered = dedupe_ideas(
            ideas
                .into_iter()
                .filter(|idea| {
                    if idea.volume < request.min_volume {
                        return false;
                    }
                    if request.hide_noise && is_low_signal_variant(&idea.keyword, &seed) {
                        return false;
                    }
                    matches_include_exclude(&idea.keyword, &request.include, &request.exclude)
                })
                .collect(),
        );
        let filtered_count = filtered.len();

        let volumes: Vec<f64> = filtered.iter().map(|idea| idea.volume).collect();
        let min_volume = volumes.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_volume = volumes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let (min_volume, max_volume) = if volumes.is_empty() {
            (0.0, 0.0)
        } else {
            (min_volume, max_volume)
        };

        let mut entries = build_analysis_entries(&filtered, request.cluster);
        entries.sort_by(|a, b| {
            b.idea
                .volume
                .partial_cmp(&a.idea.volume)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(max_keywords);

        let channel_profile = match (&request.channel, request.show_weighted) {
            (Some(channel), true) => match self.resolve_channel(channel).await? {
                Some(channel_id) => Some(self.channel_profile(&channel_id).await?),
                None => None,
            },
            _ => None,
        };

        let keywords: Vec<String> = entries
            .iter()
            .map(|entry| entry.idea.keyword.clone())
            .collect();
        let batch = self
            .serps_for_keywords(
                &keywords,
                videos_per_keyword,
                SerpOptions {
                    stale_on_rate_limit: request.stale_on_rate_limit,
                },
            )
            .await?;

        let now = Utc::now();
        let mut results: Vec<OpportunityReport> = entries
            .into_iter()
            .filter_map(|entry| {
                let snapshot = batch.snapshots.get(entry.idea.keyword.trim())?;
                let mut report = self.score(ScoreInput {
                    keyword: &entry.idea.keyword,
                    volume: entry.idea.volume,
                    monthly_volumes: entry.idea.monthly_volumes.as_deref(),
                    videos: &snapshot.videos,
                    total_results: snapshot.total_results,
                    min_volume,
                    max_volume,
                    related_keywords: entry.related_keywords,
                    channel_profile: channel_profile.as_ref(),
                    now,
                });
                report.cluster_id = entry.cluster_id;
                report.cluster_label = entry.cluster_label;
                report.cluster_size = entry.cluster_size;
                Some(report)
            })
            .collect();
        results.sort_by(|a, b| b.scores.opportunity_score.cmp(&a.scores.opportunity_score));

        info!(
            seed = %seed,
            analyzed = results.len(),
            served_stale = batch.served_stale,
            "discovery pipeline finished"
        );

        Ok(DiscoverResponse {
            seed,
            generated_at: now.to_rfc3339(),
            served_stale: batch.served_stale,
            meta: DiscoverMeta {
                total_suggestions,
                filtered_count,
                analyzed_count: results.len(),
                clustered: request.cluster,
            },
            results,
        })
    }
}

/// Collapses ideas sharing a canonical form, keeping the higher volume.
fn dedupe_ideas(ideas: Vec<KeywordIdea>) -> Vec<KeywordIdea> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, KeywordIdea> = HashMap::new();
    for idea in ideas {
        let key = normalize(&idea.keyword);
        let replace = match best.get(&key) {
            Some(existing) => existing.volume < idea.volume,
            None => {
                order.push(key.clone());
                true
            }
        };
        if replace {
            best.insert(key, idea);
        }
    }
    order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .collect()
}

fn build_analysis_entries(filtered: &[KeywordIdea], cluster: bool) -> Vec<AnalysisEntry> {
    if !cluster {
        return filtered
            .iter()
            .map(|idea| AnalysisEntry {
                related_keywords: vec![idea.keyword.clone()],
                idea: idea.clone(),
                cluster_id: None,
                cluster_label: None,
                cluster_size: None,
            })
            .collect();
    }

    let by_key: HashMap<String, &KeywordIdea> = filtered
        .iter()
        .map(|idea| (normalize(&idea.keyword), idea))
        .collect();

    cluster_ideas(filtered)
        .into_iter()
        .filter_map(|cluster| {
            let mut members: Vec<&KeywordIdea> = cluster
                .keywords
                .iter()
                .filter_map(|keyword| by_key.get(&normalize(keyword)).copied())
                .collect();
            members.sort_by(|a, b| {
                b.volume
                    .partial_cmp(&a.volume)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let representative = members.first()?;
            Some(AnalysisEntry {
                idea: (*representative).clone(),
                related_keywords: members
                    .iter()
                    .take(12)
                    .map(|idea| idea.keyword.clone())
                    .collect(),
                cluster_id: Some(cluster.id.clone()),
                cluster_label: Some(cluster.label.clone()),
                cluster_size: Some(cluster.keywords.len()),
            })
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
    fn dedupe_keeps_the_higher_volume_variant() {
        let deduped = dedupe_ideas(vec![
            idea("Edit Videos", 100.0),
            idea("edit videos!", 400.0),
            idea("other keyword", 50.0),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].keyword, "edit videos!");
        assert_eq!(deduped[0].volume, 400.0);
    }

    #[test]
    fn cluster_entries_carry_related_keywords_and_metadata() {
        let filtered = vec![
            idea("how to edit videos", 1200.0),
            idea("edit videos how to", 900.0),
            idea("best video editor", 700.0),
        ];
        let entries = build_analysis_entries(&filtered, true);
        assert_eq!(entries.len(), 2);

        let primary = entries
            .iter()
            .find(|e| e.idea.keyword == "how to edit videos")
            .expect("representative by volume");
        assert_eq!(primary.cluster_size, Some(2));
        assert_eq!(primary.related_keywords.len(), 2);
    }

    #[test]
    fn unclustered_entries_relate_only_to_themselves() {
        let filtered = vec![idea("a b", 10.0), idea("c d", 5.0)];
        let entries = build_analysis_entries(&filtered, false);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].related_keywords, vec!["a b".to_string()]);
        assert_eq!(entries[0].cluster_id, None);
    }
}
