pub mod lru;
pub mod persistent;

pub use self::lru::{CacheEntry, TtlCache};
pub use self::persistent::CacheContext;

use std::collections::HashMap;
use std::time::Duration;

use crate::config;
use crate::types::{ChannelStats, KeywordDemand, RecentUploadMetrics, SerpSnapshot};
use crate::usage::UsageState;

/// One named cache per concern, each with its own capacity and TTL.
/// Keys are provider- and endpoint-qualified strings; values are opaque
/// to the tier itself.
pub struct Caches {
    pub suggestions: TtlCache<Vec<String>>,
    pub volumes: TtlCache<HashMap<String, KeywordDemand>>,
    pub serp: TtlCache<SerpSnapshot>,
    pub channel_stats: TtlCache<ChannelStats>,
    pub channel_recent: TtlCache<RecentUploadMetrics>,
    pub channel_resolve: TtlCache<String>,
    pub channel_uploads: TtlCache<String>,
    pub usage: TtlCache<UsageState>,
}

impl Caches {
    pub fn new() -> Self {
        Self {
            suggestions: TtlCache::new(
                config::SUGGESTIONS_CACHE_SIZE,
                Duration::from_millis(config::SUGGESTIONS_TTL_MS),
            ),
            volumes: TtlCache::new(
                config::VOLUME_CACHE_SIZE,
                Duration::from_millis(config::VOLUME_TTL_MS),
            ),
            serp: TtlCache::new(
                config::SERP_CACHE_SIZE,
                Duration::from_millis(config::SERP_TTL_MS),
            ),
            channel_stats: TtlCache::new(
                config::CHANNEL_CACHE_SIZE,
                Duration::from_millis(config::CHANNEL_STATS_TTL_MS),
            ),
            channel_recent: TtlCache::new(
                config::CHANNEL_CACHE_SIZE,
                Duration::from_millis(config::CHANNEL_RECENT_TTL_MS),
            ),
            channel_resolve: TtlCache::new(
                config::CHANNEL_CACHE_SIZE,
                Duration::from_millis(config::CHANNEL_RESOLVE_TTL_MS),
            ),
            channel_uploads: TtlCache::new(
                config::CHANNEL_CACHE_SIZE,
                Duration::from_millis(config::CHANNEL_STATS_TTL_MS),
            ),
            usage: TtlCache::new(
                config::USAGE_CACHE_SIZE,
                Duration::from_millis(config::USAGE_TTL_MS),
            ),
        }
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}
