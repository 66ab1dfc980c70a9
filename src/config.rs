use crate::error::{AppError, Result};

pub const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const KEYWORDTOOL_API_URL: &str = "https://api.keywordtool.io/v2";

/// Outbound HTTP timeout per attempt.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// At most this many outbound calls per provider run simultaneously;
/// excess calls queue in arrival order on the gateway semaphore.
pub const YOUTUBE_CONCURRENCY: usize = 4;
pub const KEYWORDTOOL_CONCURRENCY: usize = 2;

/// Minimum gap between any two outbound calls to the same provider,
/// regardless of how many logical operations are in flight.
pub const YOUTUBE_MIN_INTERVAL_MS: u64 = 120;
pub const KEYWORDTOOL_MIN_INTERVAL_MS: u64 = 250;

/// Retry policy: up to MAX_RETRIES extra attempts for retryable failures,
/// delay = min(MAX_RETRY_DELAY_MS, retry_after ?? BASE * 2^attempt + jitter).
pub const MAX_RETRIES: u32 = 2;
pub const BASE_RETRY_DELAY_MS: u64 = 500;
pub const MAX_RETRY_DELAY_MS: u64 = 4000;
pub const RETRY_JITTER_MS: u64 = 200;

/// Provider-side maximum for detail and channel-stats lookups.
pub const ID_BATCH_SIZE: usize = 50;

/// Uploads-playlist paging when building recent-upload metrics.
pub const UPLOADS_PAGE_SIZE: usize = 50;
pub const UPLOADS_MAX_PAGES: usize = 3;
pub const RECENT_UPLOAD_SAMPLE: usize = 10;

/// Cache capacities (entries) and TTLs.
pub const SUGGESTIONS_CACHE_SIZE: usize = 200;
pub const VOLUME_CACHE_SIZE: usize = 200;
pub const SERP_CACHE_SIZE: usize = 200;
pub const CHANNEL_CACHE_SIZE: usize = 300;
pub const USAGE_CACHE_SIZE: usize = 7;

pub const HOUR_MS: u64 = 60 * 60 * 1000;
pub const SUGGESTIONS_TTL_MS: u64 = 24 * HOUR_MS;
pub const VOLUME_TTL_MS: u64 = 24 * HOUR_MS;
pub const SERP_TTL_MS: u64 = 6 * HOUR_MS;
pub const CHANNEL_STATS_TTL_MS: u64 = 12 * HOUR_MS;
pub const CHANNEL_RECENT_TTL_MS: u64 = 6 * HOUR_MS;
pub const CHANNEL_RESOLVE_TTL_MS: u64 = 12 * HOUR_MS;
/// Usage counters outlive their day by one more so yesterday stays readable.
pub const USAGE_TTL_MS: u64 = 48 * HOUR_MS;

/// Suggestion request bounds.
pub const DEFAULT_COUNTRY: &str = "US";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const MAX_SUGGESTION_LIMIT: usize = 50;

/// Discovery pipeline defaults.
pub const DEFAULT_MAX_KEYWORDS: usize = 25;
pub const DEFAULT_VIDEOS_PER_KEYWORD: usize = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// YouTube Data API key (YOUTUBE_API_KEY). Calls fail with a config
    /// error when absent; /health reports readiness.
    pub youtube_api_key: Option<String>,
    /// KeywordTool API key (KEYWORDTOOL_API_KEY).
    pub keywordtool_api_key: Option<String>,
    /// SQLite path for the durable cache tier (CACHE_DB_PATH). Unset means
    /// memory-only caching, which is not an error.
    pub cache_db_path: Option<String>,
    /// Daily quota-unit budget for YouTube (YOUTUBE_DAILY_QUOTA).
    pub youtube_daily_quota: Option<u64>,
    /// Daily request budget for KeywordTool (KEYWORDTOOL_DAILY_LIMIT).
    pub keywordtool_daily_limit: Option<u64>,
    /// Whether the Google Trends suggestion mode is enabled
    /// (KEYWORDTOOL_TRENDS_ENABLED=true).
    pub trends_enabled: bool,
    pub youtube_api_url: String,
    pub keywordtool_api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| {
                    AppError::Config("API_PORT must be a valid port number".to_string())
                })?,
            youtube_api_key: non_empty_env("YOUTUBE_API_KEY"),
            keywordtool_api_key: non_empty_env("KEYWORDTOOL_API_KEY"),
            cache_db_path: non_empty_env("CACHE_DB_PATH"),
            youtube_daily_quota: parse_limit_env("YOUTUBE_DAILY_QUOTA"),
            keywordtool_daily_limit: parse_limit_env("KEYWORDTOOL_DAILY_LIMIT"),
            trends_enabled: std::env::var("KEYWORDTOOL_TRENDS_ENABLED")
                .map(|v| v == "true")
                .unwrap_or(false),
            youtube_api_url: std::env::var("YOUTUBE_API_URL")
                .unwrap_or_else(|_| YOUTUBE_API_URL.to_string()),
            keywordtool_api_url: std::env::var("KEYWORDTOOL_API_URL")
                .unwrap_or_else(|_| KEYWORDTOOL_API_URL.to_string()),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// A limit must be a positive integer; anything else means "no limit
/// configured", which summaries report as absent rather than zero.
fn parse_limit_env(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}
