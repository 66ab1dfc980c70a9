use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::cache::{CacheContext, Caches};
use crate::config;
use crate::error::{AppError, Result};
use crate::gateway::{ApiRequest, ProviderGateway};
use crate::types::{KeywordDemand, KeywordIdea, Provider, SuggestionMode};

/// Demand provider client: keyword suggestions plus batched volume lookups.
/// The provider's payloads vary in nesting, so extraction is tolerant and
/// everything past this boundary is typed.
pub struct KeywordToolClient {
    gateway: ProviderGateway,
    caches: Arc<Caches>,
    store: CacheContext,
    base_url: String,
    api_key: Option<String>,
    trends_enabled: bool,
}

impl KeywordToolClient {
    pub fn new(
        gateway: ProviderGateway,
        caches: Arc<Caches>,
        store: CacheContext,
        base_url: String,
        api_key: Option<String>,
        trends_enabled: bool,
    ) -> Self {
        Self {
            gateway,
            caches,
            store,
            base_url,
            api_key,
            trends_enabled,
        }
    }

    pub fn trends_enabled(&self) -> bool {
        self.trends_enabled
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("KEYWORDTOOL_API_KEY is not configured".to_string()))
    }

    /// Suggestions for a seed plus demand volumes for the merged candidate
    /// list, seed first, suggestion order preserved, deduplicated by
    /// normalized form.
    pub async fn ideas_with_demand(
        &self,
        seed: &str,
        limit: usize,
        country: Option<&str>,
        language: Option<&str>,
        mode: SuggestionMode,
    ) -> Result<Vec<KeywordIdea>> {
        let seed = seed.trim();
        let limit = limit.clamp(1, config::MAX_SUGGESTION_LIMIT);
        let country = country
            .unwrap_or(config::DEFAULT_COUNTRY)
            .to_uppercase();
        let language = language
            .unwrap_or(config::DEFAULT_LANGUAGE)
            .to_lowercase();

        if mode == SuggestionMode::Trends && !self.trends_enabled {
            return Err(AppError::Config(
                "Google Trends suggestions are disabled".to_string(),
            ));
        }

        let suggestions = self
            .fetch_suggestions(seed, limit, &country, &language, mode)
            .await?;

        let mut merged: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut add = |keyword: &str| {
            let cleaned = keyword.trim();
            if cleaned.is_empty() {
                return;
            }
            if seen.insert(normalize_key(cleaned)) {
                merged.push(cleaned.to_string());
            }
        };
        if !seed.is_empty() {
            add(seed);
        }
        for suggestion in &suggestions {
            add(suggestion);
        }
        merged.truncate(limit);

        let volume_map = if merged.is_empty() {
            HashMap::new()
        } else {
            self.fetch_volumes(&merged, &country).await?
        };

        Ok(merged
            .into_iter()
            .map(|keyword| {
                let demand = volume_map.get(&normalize_key(&keyword));
                KeywordIdea {
                    volume: demand.map(|d| d.volume).unwrap_or(0.0),
                    monthly_volumes: demand.and_then(|d| d.monthly_volumes.clone()),
                    keyword,
                }
            })
            .collect())
    }

    async fn fetch_suggestions(
        &self,
        seed: &str,
        limit: usize,
        country: &str,
        language: &str,
        mode: SuggestionMode,
    ) -> Result<Vec<String>> {
        let cache_key = format!(
            "kt:suggest:{}::{country}::{language}::{}::{limit}",
            normalize_key(seed),
            mode.as_str(),
        );
        if let Some(cached) = self
            .store
            .get_through(&self.caches.suggestions, &cache_key, suggestions_ttl())
            .await
        {
            return Ok(cached);
        }

        let endpoint = if mode == SuggestionMode::Trends {
            format!("{}/search/suggestions/google-trends", self.base_url)
        } else {
            format!("{}/search/suggestions/youtube", self.base_url)
        };
        let request = ApiRequest::post(
            endpoint,
            json!({
                "apikey": self.api_key()?,
                "keyword": seed,
                "country": country,
                "language": language,
                "type": mode.request_type(),
                "output": "json",
            }),
        );
        let payload = self.gateway.execute(request).await?;
        ensure_no_error_payload(&payload)?;

        let mut seen = HashSet::new();
        let mut deduped: Vec<String> = Vec::new();
        for suggestion in extract_keyword_strings(&payload) {
            let cleaned = suggestion.trim();
            if cleaned.is_empty() {
                continue;
            }
            if seen.insert(normalize_key(cleaned)) {
                deduped.push(cleaned.to_string());
            }
        }
        deduped.truncate(limit);

        self.store
            .put_through(&self.caches.suggestions, &cache_key, &deduped, suggestions_ttl())
            .await;
        Ok(deduped)
    }

    async fn fetch_volumes(
        &self,
        keywords: &[String],
        country: &str,
    ) -> Result<HashMap<String, KeywordDemand>> {
        let cache_key = format!("kt:volume:{}::{country}", hash_keywords(keywords));
        if let Some(cached) = self
            .store
            .get_through(&self.caches.volumes, &cache_key, volume_ttl())
            .await
        {
            return Ok(cached);
        }

        let request = ApiRequest::post(
            format!("{}/search/volume/youtube", self.base_url),
            json!({
                "apikey": self.api_key()?,
                "keyword": keywords,
                "country": country,
                "output": "json",
            }),
        );
        let payload = self.gateway.execute(request).await?;
        ensure_no_error_payload(&payload)?;

        let volume_map = build_volume_map(&payload);
        self.store
            .put_through(&self.caches.volumes, &cache_key, &volume_map, volume_ttl())
            .await;
        Ok(volume_map)
    }
}

// ---------------------------------------------------------------------------
// Tolerant payload extraction
// ---------------------------------------------------------------------------

fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

fn suggestions_ttl() -> Duration {
    Duration::from_millis(config::SUGGESTIONS_TTL_MS)
}

fn volume_ttl() -> Duration {
    Duration::from_millis(config::VOLUME_TTL_MS)
}

fn hash_keywords(keywords: &[String]) -> String {
    let normalized = keywords
        .iter()
        .map(|k| normalize_key(k))
        .collect::<Vec<_>>()
        .join("|");
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// A 200 response can still carry an error object; that is a shape problem,
/// not a transport one.
fn ensure_no_error_payload(payload: &Value) -> Result<()> {
    let has_error = payload
        .as_object()
        .map(|map| map.contains_key("error") || map.contains_key("errors"))
        .unwrap_or(false);
    if has_error {
        return Err(AppError::Malformed {
            provider: Provider::Keywordtool,
            message: "provider returned an error payload".to_string(),
        });
    }
    Ok(())
}

fn keyword_from_object(record: &serde_json::Map<String, Value>) -> Option<String> {
    for field in ["keyword", "string", "value", "text"] {
        if let Some(candidate) = record.get(field).and_then(|v| v.as_str()) {
            let cleaned = candidate.trim();
            if !cleaned.is_empty() {
                return Some(cleaned.to_string());
            }
        }
    }
    None
}

/// Collects candidate keyword strings from whatever nesting the provider
/// chose: bare strings, arrays, keyed containers, or objects whose keys are
/// themselves the keywords.
fn extract_keyword_strings(payload: &Value) -> Vec<String> {
    match payload {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(extract_keyword_strings).collect(),
        Value::Object(record) => {
            let mut collected = Vec::new();
            let direct = keyword_from_object(record);
            if let Some(direct) = &direct {
                collected.push(direct.clone());
            }

            let mut has_container = false;
            for key in ["results", "keywords", "data", "suggestions"] {
                if let Some(inner) = record.get(key) {
                    has_container = true;
                    collected.extend(extract_keyword_strings(inner));
                }
            }

            if !has_container && direct.is_none() {
                for key in record.keys() {
                    let cleaned = key.trim();
                    if !cleaned.is_empty() {
                        collected.push(cleaned.to_string());
                    }
                }
            }
            collected
        }
        _ => Vec::new(),
    }
}

fn extract_volume_items(payload: &Value) -> Vec<serde_json::Map<String, Value>> {
    match payload {
        Value::Array(items) => items.iter().flat_map(extract_volume_items).collect(),
        Value::Object(record) => {
            let mut items = Vec::new();
            let has_direct = record.get("string").map(Value::is_string).unwrap_or(false)
                || record.get("keyword").map(Value::is_string).unwrap_or(false);
            if has_direct {
                items.push(record.clone());
            }

            let mut has_container = false;
            for key in ["results", "data", "keywords", "volumes"] {
                if let Some(inner) = record.get(key) {
                    has_container = true;
                    items.extend(extract_volume_items(inner));
                }
            }

            if !has_container && !has_direct {
                for value in record.values() {
                    items.extend(extract_volume_items(value));
                }
            }
            items
        }
        _ => Vec::new(),
    }
}

fn normalize_volume(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.replace(',', "").parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Monthly history arrives as m1..m12 value fields with m{i}_month /
/// m{i}_year companions, in no particular order; the output series is
/// oldest-first.
fn extract_monthly_volumes(item: &serde_json::Map<String, Value>) -> Option<Vec<f64>> {
    let mut months: Vec<(i64, i64, f64)> = Vec::new();
    for i in 1..=12 {
        let value = normalize_volume(item.get(&format!("m{i}")));
        let month = item.get(&format!("m{i}_month")).and_then(Value::as_i64);
        let year = item.get(&format!("m{i}_year")).and_then(Value::as_i64);
        let (Some(month), Some(year)) = (month, year) else {
            continue;
        };
        months.push((year, month, value));
    }

    if months.is_empty() {
        return None;
    }
    months.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    Some(months.into_iter().map(|(_, _, value)| value).collect())
}

fn build_volume_map(payload: &Value) -> HashMap<String, KeywordDemand> {
    let mut map = HashMap::new();
    for item in extract_volume_items(payload) {
        let keyword = item
            .get("string")
            .and_then(|v| v.as_str())
            .or_else(|| item.get("keyword").and_then(|v| v.as_str()))
            .map(|s| s.trim())
            .unwrap_or("");
        if keyword.is_empty() {
            continue;
        }
        map.insert(
            normalize_key(keyword),
            KeywordDemand {
                volume: normalize_volume(item.get("volume")),
                monthly_volumes: extract_monthly_volumes(&item),
            },
        );
    }
    map
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::gateway::{GatewayConfig, HttpTransport, RawResponse};
    use crate::usage::UsageLedger;

    #[test]
    fn keyword_strings_survive_varied_nesting() {
        let shapes = [
            json!({"results": ["edit videos", "edit videos fast"]}),
            json!({"results": {"seed": [{"string": "edit videos"}, {"string": "edit videos fast"}]}}),
            json!({"keywords": [{"keyword": "edit videos"}, {"text": "edit videos fast"}]}),
        ];
        for payload in &shapes {
            let strings = extract_keyword_strings(payload);
            assert!(strings.contains(&"edit videos".to_string()), "{payload}");
            assert!(strings.contains(&"edit videos fast".to_string()), "{payload}");
        }
    }

    #[test]
    fn object_keys_are_keywords_when_no_container_matches() {
        let payload = json!({"how to edit videos": {"volume": 100}});
        let strings = extract_keyword_strings(&payload);
        assert_eq!(strings, vec!["how to edit videos"]);
    }

    #[test]
    fn monthly_volumes_sort_by_year_then_month() {
        let item = json!({
            "string": "edit videos",
            "volume": "1,200",
            "m1": 10, "m1_month": 2, "m1_year": 2024,
            "m2": 20, "m2_month": 1, "m2_year": 2024,
            "m3": 5, "m3_month": 12, "m3_year": 2023,
        });
        let map = build_volume_map(&json!({"results": [item]}));
        let demand = &map["edit videos"];
        assert_eq!(demand.volume, 1200.0);
        assert_eq!(demand.monthly_volumes, Some(vec![5.0, 10.0, 20.0]));
    }

    #[test]
    fn volume_map_skips_items_without_keywords() {
        let map = build_volume_map(&json!({"results": [{"volume": 50}]}));
        assert!(map.is_empty());
    }

    #[test]
    fn error_payloads_are_rejected() {
        assert!(ensure_no_error_payload(&json!({"error": "bad apikey"})).is_err());
        assert!(ensure_no_error_payload(&json!({"results": []})).is_ok());
    }

    // -- ideas_with_demand against a scripted transport ---------------------

    struct KtTransport {
        calls: StdMutex<Vec<ApiRequest>>,
    }

    #[async_trait]
    impl HttpTransport for KtTransport {
        async fn send(&self, request: &ApiRequest) -> std::result::Result<RawResponse, String> {
            self.calls.lock().unwrap().push(request.clone());
            let body = if request.url.contains("/suggestions/") {
                json!({"results": ["how to edit videos", "How To Edit Videos", "edit videos fast"]})
            } else {
                json!({"results": [
                    {"string": "how to edit videos", "volume": 1200,
                     "m1": 100, "m1_month": 1, "m1_year": 2024,
                     "m2": 140, "m2_month": 2, "m2_year": 2024},
                    {"string": "edit videos fast", "volume": 300},
                ]})
            };
            Ok(RawResponse {
                status: 200,
                retry_after: None,
                body: body.to_string(),
            })
        }
    }

    fn client(transport: Arc<KtTransport>) -> KeywordToolClient {
        let caches = Arc::new(Caches::new());
        let store = CacheContext::memory_only();
        let ledger = Arc::new(UsageLedger::new(
            Arc::clone(&caches),
            store.clone(),
            None,
            None,
        ));
        let gateway = ProviderGateway::new(
            GatewayConfig {
                provider: Provider::Keywordtool,
                concurrency: 2,
                min_interval: Duration::ZERO,
                max_retries: 0,
            },
            transport,
            ledger,
        );
        KeywordToolClient::new(
            gateway,
            caches,
            store,
            "https://api.keywordtool.io/v2".to_string(),
            Some("test-key".to_string()),
            false,
        )
    }

    #[tokio::test]
    async fn ideas_put_seed_first_and_attach_volumes() {
        let transport = Arc::new(KtTransport {
            calls: StdMutex::new(Vec::new()),
        });
        let client = client(Arc::clone(&transport));

        let ideas = client
            .ideas_with_demand("how to edit videos", 10, None, None, SuggestionMode::Suggestions)
            .await
            .unwrap();

        let keywords: Vec<&str> = ideas.iter().map(|i| i.keyword.as_str()).collect();
        assert_eq!(
            keywords,
            vec!["how to edit videos", "edit videos fast"],
            "seed first, case-duplicates collapsed"
        );
        assert_eq!(ideas[0].volume, 1200.0);
        assert_eq!(ideas[0].monthly_volumes, Some(vec![100.0, 140.0]));
        assert_eq!(ideas[1].volume, 300.0);
        assert_eq!(ideas[1].monthly_volumes, None);
        assert_eq!(transport.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn trends_mode_requires_enablement() {
        let transport = Arc::new(KtTransport {
            calls: StdMutex::new(Vec::new()),
        });
        let client = client(transport);

        let err = client
            .ideas_with_demand("edit videos", 10, None, None, SuggestionMode::Trends)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "{err}");
    }
}
