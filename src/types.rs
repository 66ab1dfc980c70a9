use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Youtube,
    Keywordtool,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Youtube => "youtube",
            Provider::Keywordtool => "keywordtool",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Keyword demand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionMode {
    Suggestions,
    Questions,
    Prepositions,
    Trends,
}

impl SuggestionMode {
    /// The `type` value the demand provider expects. Trends requests hit a
    /// different endpoint but still post type=suggestions.
    pub fn request_type(&self) -> &'static str {
        match self {
            SuggestionMode::Suggestions | SuggestionMode::Trends => "suggestions",
            SuggestionMode::Questions => "questions",
            SuggestionMode::Prepositions => "prepositions",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionMode::Suggestions => "suggestions",
            SuggestionMode::Questions => "questions",
            SuggestionMode::Prepositions => "prepositions",
            SuggestionMode::Trends => "trends",
        }
    }
}

impl Default for SuggestionMode {
    fn default() -> Self {
        SuggestionMode::Suggestions
    }
}

/// One keyword candidate with its demand signal. Immutable once returned
/// by the demand provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordIdea {
    pub keyword: String,
    pub volume: f64,
    /// Oldest-first monthly demand counts; None when the provider sent no
    /// usable history.
    pub monthly_volumes: Option<Vec<f64>>,
}

/// Demand data as keyed by normalized keyword in the volume cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordDemand {
    pub volume: f64,
    pub monthly_volumes: Option<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Video search results
// ---------------------------------------------------------------------------

/// One enriched search result. Owned by the batch orchestrator until handed
/// to the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// RFC 3339 publish timestamp as reported by the provider.
    pub published_at: String,
    pub view_count: f64,
    pub like_count: f64,
    pub comment_count: f64,
    pub url: String,
    pub channel_id: String,
    pub channel_title: String,
    pub channel_subscriber_count: f64,
    pub thumbnail_url: String,
    pub duration_seconds: u64,
}

/// The cached unit per (query, result-count) pair. Video order always
/// mirrors the search call, never the enrichment calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpSnapshot {
    pub keyword: String,
    pub total_results: Option<f64>,
    pub videos: Vec<VideoRecord>,
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel_id: String,
    pub subscriber_count: f64,
    pub video_count: f64,
    pub view_count: f64,
}

/// Average performance over a channel's most recent uploads.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RecentUploadMetrics {
    pub avg_views: f64,
    pub avg_views_per_day: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelProfile {
    pub channel_id: String,
    pub subscriber_count: f64,
    pub video_count: f64,
    pub view_count: f64,
    pub avg_views: f64,
    pub avg_views_per_day: f64,
}
