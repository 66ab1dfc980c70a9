use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;
use tracing::{debug, warn};

use crate::cache::{CacheContext, Caches};
use crate::config;
use crate::error::Result;
use crate::gateway::{ApiRequest, ProviderGateway};
use crate::types::{ChannelProfile, ChannelStats, RecentUploadMetrics, SerpSnapshot, VideoRecord};
use crate::youtube::parse;

#[derive(Debug, Clone, Copy, Default)]
pub struct SerpOptions {
    /// Opt in to serving expired cached snapshots when a refresh fails on
    /// rate limiting or quota exhaustion.
    pub stale_on_rate_limit: bool,
}

#[derive(Debug)]
pub struct SerpFetch {
    pub snapshot: SerpSnapshot,
    /// Side channel for "temporarily degraded with stale data".
    pub served_stale: bool,
}

#[derive(Debug)]
pub struct SerpBatch {
    pub snapshots: HashMap<String, SerpSnapshot>,
    pub served_stale: bool,
}

#[derive(Debug, Clone)]
struct SearchSnapshot {
    keyword: String,
    ids: Vec<String>,
    total_results: Option<f64>,
}

/// Video-search provider client plus the batch orchestrator: turns keyword
/// queries into the minimal set of provider calls while preserving each
/// keyword's own search-result ordering.
pub struct YouTubeClient {
    gateway: ProviderGateway,
    caches: Arc<Caches>,
    store: CacheContext,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(
        gateway: ProviderGateway,
        caches: Arc<Caches>,
        store: CacheContext,
        base_url: String,
    ) -> Self {
        Self {
            gateway,
            caches,
            store,
            base_url,
        }
    }

    // -----------------------------------------------------------------------
    // SERP fetching
    // -----------------------------------------------------------------------

    pub async fn serp_for_keyword(
        &self,
        keyword: &str,
        max_videos: usize,
        options: SerpOptions,
    ) -> Result<SerpFetch> {
        let trimmed = keyword.trim().to_string();
        if trimmed.is_empty() {
            return Ok(SerpFetch {
                snapshot: SerpSnapshot {
                    keyword: trimmed,
                    total_results: None,
                    videos: Vec::new(),
                },
                served_stale: false,
            });
        }

        let mut batch = self
            .serps_for_keywords(std::slice::from_ref(&trimmed), max_videos, options)
            .await?;
        let snapshot = batch
            .snapshots
            .remove(&trimmed)
            .unwrap_or_else(|| SerpSnapshot {
                keyword: trimmed,
                total_results: None,
                videos: Vec::new(),
            });
        Ok(SerpFetch {
            snapshot,
            served_stale: batch.served_stale,
        })
    }

    /// The batch path:
    /// 1. split cache hits from misses, capturing expired entries as stale
    ///    fallback candidates;
    /// 2. one search call per missed keyword (concurrent, fail-fast);
    /// 3. detail lookups over the union of ids, chunked at the provider max;
    /// 4. channel-stats lookups over the distinct owning channels;
    /// 5. merge stats, then re-project each keyword's own search-order ids;
    /// 6. write fresh snapshots back before returning.
    pub async fn serps_for_keywords(
        &self,
        keywords: &[String],
        max_videos: usize,
        options: SerpOptions,
    ) -> Result<SerpBatch> {
        let mut results: HashMap<String, SerpSnapshot> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        let mut stale_candidates: HashMap<String, SerpSnapshot> = HashMap::new();

        let mut seen = HashSet::new();
        let unique: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();

        for keyword in &unique {
            let key = serp_cache_key(keyword, max_videos);
            // Peek before the read-through lookup: a normal get would evict
            // the expired entry we may still need as a stale candidate.
            if let Some(entry) = self.caches.serp.peek_entry(&key) {
                if entry.is_expired() {
                    stale_candidates.insert(keyword.clone(), entry.value);
                }
            }
            match self
                .store
                .get_through(&self.caches.serp, &key, serp_ttl())
                .await
            {
                Some(snapshot) => {
                    results.insert(keyword.clone(), snapshot);
                }
                None => missing.push(keyword.clone()),
            }
        }

        if missing.is_empty() {
            return Ok(SerpBatch {
                snapshots: results,
                served_stale: false,
            });
        }

        match self.fetch_missing(&missing, max_videos).await {
            Ok(fresh) => {
                for snapshot in fresh {
                    let key = serp_cache_key(&snapshot.keyword, max_videos);
                    self.store
                        .put_through(&self.caches.serp, &key, &snapshot, serp_ttl())
                        .await;
                    results.insert(snapshot.keyword.clone(), snapshot);
                }
                Ok(SerpBatch {
                    snapshots: results,
                    served_stale: false,
                })
            }
            Err(err) => {
                // Whole-batch-or-nothing: stale data substitutes only when
                // every outstanding keyword has a candidate.
                if options.stale_on_rate_limit
                    && err.is_rate_limit_class()
                    && missing.iter().all(|k| stale_candidates.contains_key(k))
                {
                    warn!(
                        keywords = missing.len(),
                        "serving stale snapshots after rate limit: {err}"
                    );
                    for keyword in &missing {
                        if let Some(stale) = stale_candidates.remove(keyword) {
                            results.insert(keyword.clone(), stale);
                        }
                    }
                    return Ok(SerpBatch {
                        snapshots: results,
                        served_stale: true,
                    });
                }
                Err(err)
            }
        }
    }

    async fn fetch_missing(
        &self,
        missing: &[String],
        max_videos: usize,
    ) -> Result<Vec<SerpSnapshot>> {
        let snapshots = try_join_all(
            missing
                .iter()
                .map(|keyword| self.search_snapshot(keyword, max_videos)),
        )
        .await?;

        let mut all_ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for snapshot in &snapshots {
            for id in &snapshot.ids {
                if seen.insert(id.clone()) {
                    all_ids.push(id.clone());
                }
            }
        }

        let mut video_map = self.videos_by_ids(&all_ids).await?;

        let mut channel_ids: Vec<String> = Vec::new();
        let mut seen_channels = HashSet::new();
        for id in &all_ids {
            if let Some(video) = video_map.get(id) {
                if seen_channels.insert(video.channel_id.clone()) {
                    channel_ids.push(video.channel_id.clone());
                }
            }
        }
        let channel_stats = self.channel_stats(&channel_ids).await?;

        for video in video_map.values_mut() {
            if let Some(stats) = channel_stats.get(&video.channel_id) {
                video.channel_subscriber_count = stats.subscriber_count;
            }
        }

        // Ordering fidelity comes only from the per-keyword search id list;
        // the enrichment calls return in arbitrary order.
        Ok(snapshots
            .into_iter()
            .map(|snapshot| SerpSnapshot {
                videos: snapshot
                    .ids
                    .iter()
                    .filter_map(|id| video_map.get(id).cloned())
                    .collect(),
                keyword: snapshot.keyword,
                total_results: snapshot.total_results,
            })
            .collect())
    }

    async fn search_snapshot(&self, keyword: &str, max_videos: usize) -> Result<SearchSnapshot> {
        let request = ApiRequest::get(format!("{}/search", self.base_url))
            .query("part", "snippet")
            .query("type", "video")
            .query("q", keyword)
            .query("order", "relevance")
            .query("maxResults", max_videos.to_string())
            .query(
                "fields",
                "items(id(videoId),snippet(channelId,publishedAt)),pageInfo(totalResults)",
            );
        let payload = self.gateway.execute(request).await?;
        let page = parse::parse_search_page(&payload)?;
        Ok(SearchSnapshot {
            keyword: keyword.to_string(),
            ids: page.video_ids,
            total_results: page.total_results,
        })
    }

    async fn videos_by_ids(&self, ids: &[String]) -> Result<HashMap<String, VideoRecord>> {
        let mut videos = HashMap::new();
        for chunk in ids.chunks(config::ID_BATCH_SIZE) {
            let request = ApiRequest::get(format!("{}/videos", self.base_url))
                .query("part", "snippet,statistics,contentDetails")
                .query("id", chunk.join(","))
                .query(
                    "fields",
                    "items(id,snippet(title,description,tags,publishedAt,channelId,\
                     channelTitle,thumbnails),statistics(viewCount,likeCount,commentCount),\
                     contentDetails(duration))",
                );
            let payload = self.gateway.execute(request).await?;
            for video in parse::parse_video_items(&payload)? {
                videos.insert(video.id.clone(), video);
            }
        }
        Ok(videos)
    }

    async fn channel_stats(
        &self,
        channel_ids: &[String],
    ) -> Result<HashMap<String, ChannelStats>> {
        let mut stats = HashMap::new();
        let mut missing = Vec::new();

        for id in channel_ids {
            let key = channel_stats_key(id);
            match self
                .store
                .get_through(&self.caches.channel_stats, &key, channel_stats_ttl())
                .await
            {
                Some(cached) => {
                    stats.insert(id.clone(), cached);
                }
                None => missing.push(id.clone()),
            }
        }

        for chunk in missing.chunks(config::ID_BATCH_SIZE) {
            let request = ApiRequest::get(format!("{}/channels", self.base_url))
                .query("part", "statistics")
                .query("id", chunk.join(","))
                .query(
                    "fields",
                    "items(id,statistics(subscriberCount,videoCount,viewCount))",
                );
            let payload = self.gateway.execute(request).await?;
            for item in parse::parse_channel_items(&payload)? {
                let key = channel_stats_key(&item.stats.channel_id);
                self.store
                    .put_through(
                        &self.caches.channel_stats,
                        &key,
                        &item.stats,
                        channel_stats_ttl(),
                    )
                    .await;
                stats.insert(item.stats.channel_id.clone(), item.stats);
            }
        }

        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Channel resolution and profiling
    // -----------------------------------------------------------------------

    /// Accepts a raw channel id, an @handle, or free text, and resolves it
    /// to a channel id when the provider knows one.
    pub async fn resolve_channel(&self, input: &str) -> Result<Option<String>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let resolve_key = format!("yt:resolve:{}", trimmed.to_lowercase());
        if let Some(cached) = self
            .store
            .get_through(
                &self.caches.channel_resolve,
                &resolve_key,
                channel_resolve_ttl(),
            )
            .await
        {
            return Ok(Some(cached));
        }

        if looks_like_channel_id(trimmed) {
            return Ok(Some(trimmed.to_string()));
        }

        if let Some(handle) = extract_handle(trimmed) {
            let request = ApiRequest::get(format!("{}/channels", self.base_url))
                .query("part", "snippet")
                .query("forHandle", handle)
                .query("fields", "items(id)");
            let payload = self.gateway.execute(request).await?;
            if let Some(item) = parse::parse_channel_items(&payload)?.into_iter().next() {
                let channel_id = item.stats.channel_id;
                self.store
                    .put_through(
                        &self.caches.channel_resolve,
                        &resolve_key,
                        &channel_id,
                        channel_resolve_ttl(),
                    )
                    .await;
                return Ok(Some(channel_id));
            }
        }

        let request = ApiRequest::get(format!("{}/search", self.base_url))
            .query("part", "snippet")
            .query("type", "channel")
            .query("q", trimmed)
            .query("maxResults", "1")
            .query("fields", "items(id(channelId))");
        let payload = self.gateway.execute(request).await?;
        let channel_id = parse::parse_channel_search(&payload)?;

        if let Some(channel_id) = &channel_id {
            self.store
                .put_through(
                    &self.caches.channel_resolve,
                    &resolve_key,
                    channel_id,
                    channel_resolve_ttl(),
                )
                .await;
        }
        Ok(channel_id)
    }

    async fn channel_uploads_details(
        &self,
        channel_id: &str,
    ) -> Result<(Option<String>, ChannelStats)> {
        let uploads_key = format!("yt:channel:uploads:{channel_id}");
        let stats_key = channel_stats_key(channel_id);

        let cached_uploads = self
            .store
            .get_through(&self.caches.channel_uploads, &uploads_key, channel_stats_ttl())
            .await;
        let cached_stats = self
            .store
            .get_through(&self.caches.channel_stats, &stats_key, channel_stats_ttl())
            .await;
        if let (Some(uploads), Some(stats)) = (cached_uploads, cached_stats) {
            return Ok((Some(uploads), stats));
        }

        let request = ApiRequest::get(format!("{}/channels", self.base_url))
            .query("part", "contentDetails,statistics")
            .query("id", channel_id)
            .query(
                "fields",
                "items(id,statistics(subscriberCount,videoCount,viewCount),\
                 contentDetails(relatedPlaylists(uploads)))",
            );
        let payload = self.gateway.execute(request).await?;
        let item = parse::parse_channel_items(&payload)?.into_iter().next();

        let (stats, uploads_playlist_id) = match item {
            Some(item) => (item.stats, item.uploads_playlist_id),
            None => (
                ChannelStats {
                    channel_id: channel_id.to_string(),
                    subscriber_count: 0.0,
                    video_count: 0.0,
                    view_count: 0.0,
                },
                None,
            ),
        };

        self.store
            .put_through(&self.caches.channel_stats, &stats_key, &stats, channel_stats_ttl())
            .await;
        if let Some(uploads) = &uploads_playlist_id {
            self.store
                .put_through(
                    &self.caches.channel_uploads,
                    &uploads_key,
                    uploads,
                    channel_stats_ttl(),
                )
                .await;
        }

        Ok((uploads_playlist_id, stats))
    }

    /// Average views and views-per-day over the channel's most recent
    /// uploads, read from the uploads listing in reverse-chronological order.
    async fn recent_upload_metrics(
        &self,
        channel_id: &str,
        uploads_playlist_id: Option<&str>,
    ) -> Result<RecentUploadMetrics> {
        let sample = config::RECENT_UPLOAD_SAMPLE;
        let cache_key = format!("yt:channel:recent:{channel_id}:{sample}");
        if let Some(cached) = self
            .store
            .get_through(&self.caches.channel_recent, &cache_key, channel_recent_ttl())
            .await
        {
            return Ok(cached);
        }

        let uploads_playlist_id = match uploads_playlist_id {
            Some(id) => Some(id.to_string()),
            None => self.channel_uploads_details(channel_id).await?.0,
        };
        let Some(playlist_id) = uploads_playlist_id else {
            let empty = RecentUploadMetrics::default();
            self.store
                .put_through(&self.caches.channel_recent, &cache_key, &empty, channel_recent_ttl())
                .await;
            return Ok(empty);
        };

        let mut video_ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..config::UPLOADS_MAX_PAGES {
            if video_ids.len() >= sample {
                break;
            }
            let mut request = ApiRequest::get(format!("{}/playlistItems", self.base_url))
                .query("part", "contentDetails")
                .query("playlistId", playlist_id.clone())
                .query("maxResults", config::UPLOADS_PAGE_SIZE.to_string())
                .query("fields", "items(contentDetails(videoId)),nextPageToken");
            if let Some(token) = &page_token {
                request = request.query("pageToken", token.clone());
            }
            let payload = self.gateway.execute(request).await?;
            let page = parse::parse_playlist_page(&payload)?;
            video_ids.extend(page.video_ids);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        let mut seen = HashSet::new();
        let ordered_ids: Vec<String> = video_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if ordered_ids.is_empty() {
            let empty = RecentUploadMetrics::default();
            self.store
                .put_through(&self.caches.channel_recent, &cache_key, &empty, channel_recent_ttl())
                .await;
            return Ok(empty);
        }

        let video_map = self.videos_by_ids(&ordered_ids).await?;
        let recent: Vec<&VideoRecord> = ordered_ids
            .iter()
            .filter_map(|id| video_map.get(id))
            .take(sample)
            .collect();

        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut views = Vec::with_capacity(recent.len());
        let mut views_per_day = Vec::with_capacity(recent.len());
        for video in &recent {
            let age_days = chrono::DateTime::parse_from_rfc3339(&video.published_at)
                .map(|at| ((now_ms - at.timestamp_millis()) / 86_400_000).max(1))
                .unwrap_or(1) as f64;
            views.push(video.view_count);
            views_per_day.push(video.view_count / age_days);
        }

        let metrics = if views.is_empty() {
            RecentUploadMetrics::default()
        } else {
            RecentUploadMetrics {
                avg_views: views.iter().sum::<f64>() / views.len() as f64,
                avg_views_per_day: views_per_day.iter().sum::<f64>() / views_per_day.len() as f64,
            }
        };

        self.store
            .put_through(&self.caches.channel_recent, &cache_key, &metrics, channel_recent_ttl())
            .await;
        Ok(metrics)
    }

    pub async fn channel_profile(&self, channel_id: &str) -> Result<ChannelProfile> {
        let (uploads_playlist_id, stats) = self.channel_uploads_details(channel_id).await?;
        let recent = self
            .recent_upload_metrics(channel_id, uploads_playlist_id.as_deref())
            .await?;
        debug!(channel_id, avg_views = recent.avg_views, "built channel profile");

        Ok(ChannelProfile {
            channel_id: channel_id.to_string(),
            subscriber_count: stats.subscriber_count,
            video_count: stats.video_count,
            view_count: stats.view_count,
            avg_views: recent.avg_views,
            avg_views_per_day: recent.avg_views_per_day,
        })
    }
}

// ---------------------------------------------------------------------------
// Keys, TTLs, small helpers
// ---------------------------------------------------------------------------

fn serp_cache_key(keyword: &str, max_videos: usize) -> String {
    format!("yt:serp:{}::{max_videos}", keyword.to_lowercase())
}

fn channel_stats_key(channel_id: &str) -> String {
    format!("yt:channel:{channel_id}")
}

fn serp_ttl() -> Duration {
    Duration::from_millis(config::SERP_TTL_MS)
}

fn channel_stats_ttl() -> Duration {
    Duration::from_millis(config::CHANNEL_STATS_TTL_MS)
}

fn channel_recent_ttl() -> Duration {
    Duration::from_millis(config::CHANNEL_RECENT_TTL_MS)
}

fn channel_resolve_ttl() -> Duration {
    Duration::from_millis(config::CHANNEL_RESOLVE_TTL_MS)
}

fn looks_like_channel_id(value: &str) -> bool {
    value.len() >= 22
        && value.starts_with("UC")
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn extract_handle(value: &str) -> Option<&str> {
    let at = value.find('@')?;
    let rest = &value[at + 1..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    let handle = &rest[..end];
    (!handle.is_empty()).then_some(handle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
