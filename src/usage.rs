use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheContext, Caches};
use crate::config;
use crate::types::Provider;

// ---------------------------------------------------------------------------
// Persisted state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub requests: u64,
    /// Raw per-endpoint request counts. Costs are applied only at
    /// summarization time so recorded data survives cost-table revisions.
    pub endpoints: HashMap<String, u64>,
    pub last_updated_ms: Option<i64>,
}

/// One instance per UTC calendar day; rollover happens implicitly when the
/// day key changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageState {
    pub day_key: String,
    pub providers: HashMap<String, ProviderUsage>,
}

impl UsageState {
    fn empty(day_key: String) -> Self {
        Self {
            day_key,
            providers: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EndpointUsage {
    pub name: String,
    pub requests: u64,
    pub units: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub provider: Provider,
    pub unit_label: &'static str,
    pub used: u64,
    /// None means "no limit configured", deliberately distinct from a
    /// limit of zero remaining.
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub percent: Option<f64>,
    pub requests: u64,
    pub endpoints: Vec<EndpointUsage>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub day_key: String,
    pub window_start: String,
    pub window_end: String,
    pub providers: Vec<ProviderSummary>,
}

/// Quota cost per request by endpoint. Search is two orders of magnitude
/// more expensive than the lookup endpoints.
pub fn youtube_endpoint_cost(endpoint: &str) -> u64 {
    match endpoint {
        "search" => 100,
        "videos" | "channels" | "playlistItems" => 1,
        _ => 1,
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct UsageLedger {
    caches: Arc<Caches>,
    store: CacheContext,
    youtube_limit: Option<u64>,
    keywordtool_limit: Option<u64>,
    /// Serializes the read-modify-write cycle against the cache tier.
    write_lock: tokio::sync::Mutex<()>,
}

impl UsageLedger {
    pub fn new(
        caches: Arc<Caches>,
        store: CacheContext,
        youtube_limit: Option<u64>,
        keywordtool_limit: Option<u64>,
    ) -> Self {
        Self {
            caches,
            store,
            youtube_limit,
            keywordtool_limit,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Increments today's bucket for (provider, endpoint). Never fails:
    /// usage tracking must not interfere with the call it describes.
    pub async fn record(&self, provider: Provider, endpoint: &str, count: u64) {
        let _guard = self.write_lock.lock().await;
        let day_key = current_day_key();
        let mut state = self.load(&day_key).await;

        let entry = state
            .providers
            .entry(provider.as_str().to_string())
            .or_default();
        let increment = count.max(1);
        entry.requests += increment;
        *entry.endpoints.entry(endpoint.to_string()).or_insert(0) += increment;
        entry.last_updated_ms = Some(Utc::now().timestamp_millis());

        self.save(&state).await;
    }

    pub async fn summarize(&self) -> UsageSummary {
        let day_key = current_day_key();
        let state = self.load(&day_key).await;
        let (window_start, window_end) = window_bounds(&day_key);

        let youtube = state
            .providers
            .get(Provider::Youtube.as_str())
            .cloned()
            .unwrap_or_default();
        let keywordtool = state
            .providers
            .get(Provider::Keywordtool.as_str())
            .cloned()
            .unwrap_or_default();

        let youtube_used: u64 = youtube
            .endpoints
            .iter()
            .map(|(endpoint, count)| youtube_endpoint_cost(endpoint) * count)
            .sum();
        let keywordtool_used = keywordtool.requests;

        UsageSummary {
            day_key,
            window_start,
            window_end,
            providers: vec![
                provider_summary(
                    Provider::Youtube,
                    "quota units",
                    youtube_used,
                    self.youtube_limit,
                    &youtube,
                    true,
                ),
                provider_summary(
                    Provider::Keywordtool,
                    "requests",
                    keywordtool_used,
                    self.keywordtool_limit,
                    &keywordtool,
                    false,
                ),
            ],
        }
    }

    async fn load(&self, day_key: &str) -> UsageState {
        let key = usage_cache_key(day_key);
        self.store
            .get_through(
                &self.caches.usage,
                &key,
                Duration::from_millis(config::USAGE_TTL_MS),
            )
            .await
            .unwrap_or_else(|| UsageState::empty(day_key.to_string()))
    }

    async fn save(&self, state: &UsageState) {
        let key = usage_cache_key(&state.day_key);
        self.store
            .put_through(
                &self.caches.usage,
                &key,
                state,
                Duration::from_millis(config::USAGE_TTL_MS),
            )
            .await;
    }
}

fn provider_summary(
    provider: Provider,
    unit_label: &'static str,
    used: u64,
    limit: Option<u64>,
    usage: &ProviderUsage,
    include_units: bool,
) -> ProviderSummary {
    let mut endpoints: Vec<EndpointUsage> = usage
        .endpoints
        .iter()
        .map(|(name, requests)| EndpointUsage {
            name: name.clone(),
            requests: *requests,
            units: if include_units {
                youtube_endpoint_cost(name) * requests
            } else {
                *requests
            },
        })
        .collect();
    endpoints.sort_by(|a, b| b.requests.cmp(&a.requests).then(a.name.cmp(&b.name)));

    ProviderSummary {
        provider,
        unit_label,
        used,
        limit,
        remaining: limit.map(|l| l.saturating_sub(used)),
        percent: limit.map(|l| ((used as f64 / l as f64) * 100.0).min(100.0)),
        requests: usage.requests,
        endpoints,
        last_updated: usage.last_updated_ms.and_then(|ms| {
            chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
        }),
    }
}

fn current_day_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn usage_cache_key(day_key: &str) -> String {
    format!("usage:{day_key}")
}

fn window_bounds(day_key: &str) -> (String, String) {
    let start = format!("{day_key}T00:00:00Z");
    let end = NaiveDate::parse_from_str(day_key, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.checked_add_signed(ChronoDuration::days(1)))
        .map(|d| format!("{}T00:00:00Z", d.format("%Y-%m-%d")))
        .unwrap_or_else(|| start.clone());
    (start, end)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(youtube_limit: Option<u64>) -> UsageLedger {
        UsageLedger::new(
            Arc::new(Caches::new()),
            CacheContext::memory_only(),
            youtube_limit,
            None,
        )
    }

    #[tokio::test]
    async fn applies_cost_table_at_summarize_time() {
        let ledger = ledger(Some(10_000));
        ledger.record(Provider::Youtube, "search", 2).await;
        ledger.record(Provider::Youtube, "videos", 3).await;

        let summary = ledger.summarize().await;
        let youtube = &summary.providers[0];
        assert_eq!(youtube.provider, Provider::Youtube);
        assert_eq!(youtube.requests, 5);
        assert_eq!(youtube.used, 203, "2 searches at 100 + 3 lookups at 1");
        assert_eq!(youtube.remaining, Some(9_797));
        assert!(youtube.percent.unwrap() > 2.0);
    }

    #[tokio::test]
    async fn missing_limit_reports_absent_not_zero() {
        let ledger = ledger(None);
        ledger.record(Provider::Youtube, "search", 1).await;

        let summary = ledger.summarize().await;
        let youtube = &summary.providers[0];
        assert_eq!(youtube.used, 100);
        assert_eq!(youtube.limit, None);
        assert_eq!(youtube.remaining, None);
        assert_eq!(youtube.percent, None);
    }

    #[tokio::test]
    async fn keywordtool_counts_raw_requests() {
        let ledger = UsageLedger::new(
            Arc::new(Caches::new()),
            CacheContext::memory_only(),
            None,
            Some(800),
        );
        ledger.record(Provider::Keywordtool, "suggestions", 1).await;
        ledger.record(Provider::Keywordtool, "volume", 1).await;

        let summary = ledger.summarize().await;
        let kt = &summary.providers[1];
        assert_eq!(kt.provider, Provider::Keywordtool);
        assert_eq!(kt.used, 2);
        assert_eq!(kt.remaining, Some(798));
        assert_eq!(kt.endpoints.len(), 2);
    }
}
