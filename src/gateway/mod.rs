use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::config;
use crate::error::{AppError, Result};
use crate::types::Provider;
use crate::usage::UsageLedger;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
}

impl RequestMethod {
    fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: RequestMethod,
    /// Absolute URL without query string.
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: RequestMethod::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: RequestMethod::Post,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Logical identity of the call: method + url + canonicalized (sorted)
    /// query pairs, plus a body digest for POSTs. Two requests with the
    /// same signature issued concurrently share one underlying call.
    fn signature(&self) -> String {
        let mut pairs = self.query.clone();
        pairs.sort();
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let mut signature = format!("{} {}?{}", self.method.as_str(), self.url, query);
        if let Some(body) = &self.body {
            let digest = Sha256::digest(body.to_string().as_bytes());
            signature.push_str(&format!(" body:{digest:x}"));
        }
        signature
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

/// Transport seam: the gateway owns policy (pacing, retries, dedup,
/// classification); the transport only moves bytes. Network-level errors
/// come back as strings since they carry no structure worth preserving.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> std::result::Result<RawResponse, String>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    /// Static credential headers injected into every call.
    auth_headers: Vec<(String, String)>,
}

impl ReqwestTransport {
    pub fn new(auth_headers: Vec<(String, String)>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config::HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            auth_headers,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> std::result::Result<RawResponse, String> {
        let method = match request.method {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url).query(&request.query);
        for (name, value) in &self.auth_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    QuotaExceeded,
    Auth,
    Transient,
    Malformed,
}

impl FailureKind {
    /// Quota, auth and malformed failures are terminal: retrying cannot
    /// change the outcome.
    fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Transient)
    }
}

/// Clone-able failure so all de-duplicated waiters can receive the same
/// outcome from a shared call.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub kind: FailureKind,
    pub status: u16,
    pub message: String,
    pub retry_after_ms: Option<u64>,
}

impl ApiFailure {
    fn into_app_error(self, provider: Provider) -> AppError {
        let message = self.message;
        match self.kind {
            FailureKind::RateLimited => AppError::RateLimited { provider, message },
            FailureKind::QuotaExceeded => AppError::QuotaExceeded { provider, message },
            FailureKind::Auth => AppError::Auth { provider, message },
            FailureKind::Transient => AppError::Transient { provider, message },
            FailureKind::Malformed => AppError::Malformed { provider, message },
        }
    }
}

/// Pulls the machine-readable reason and message out of an error payload,
/// tolerating the provider's `{"error":{"message":…,"errors":[{"reason":…}]}}`
/// nesting as well as flat `{"error": "…"}` shapes.
fn extract_error_reason(body: &str) -> (Option<String>, String) {
    let fallback = || {
        let snippet: String = body.chars().take(200).collect();
        if snippet.trim().is_empty() {
            "request failed".to_string()
        } else {
            snippet
        }
    };

    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, fallback());
    };

    let error = value.get("error");
    let reason = error
        .and_then(|e| e.get("errors"))
        .and_then(|errors| errors.as_array())
        .and_then(|errors| errors.first())
        .and_then(|first| first.get("reason"))
        .and_then(|r| r.as_str())
        .map(|r| r.to_string());
    let message = error
        .and_then(|e| {
            e.get("message")
                .and_then(|m| m.as_str())
                .or_else(|| e.as_str())
        })
        .map(|m| m.to_string())
        .unwrap_or_else(fallback);

    (reason, message)
}

fn classify_failure(response: &RawResponse) -> ApiFailure {
    let (reason, message) = extract_error_reason(&response.body);
    let reason = reason.as_deref();
    let status = response.status;

    let kind = if matches!(reason, Some("quotaExceeded" | "dailyLimitExceeded")) {
        FailureKind::QuotaExceeded
    } else if status == 429
        || matches!(reason, Some("rateLimitExceeded" | "userRateLimitExceeded"))
    {
        FailureKind::RateLimited
    } else if status == 401
        || status == 403
        || matches!(
            reason,
            Some("accessNotConfigured" | "keyInvalid" | "invalidKey" | "forbidden")
        )
    {
        FailureKind::Auth
    } else if (500..600).contains(&status) {
        FailureKind::Transient
    } else {
        FailureKind::Malformed
    };

    ApiFailure {
        kind,
        status,
        message,
        retry_after_ms: parse_retry_after(response.retry_after.as_deref()),
    }
}

/// Retry-After arrives either as delay-seconds or as an HTTP-date.
fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    let value = value?.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some((seconds * 1000.0) as u64);
        }
        return None;
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta_ms = at.timestamp_millis() - chrono::Utc::now().timestamp_millis();
    Some(delta_ms.max(0) as u64)
}

fn retry_delay(attempt: u32, server_hint_ms: Option<u64>) -> Duration {
    let backoff = config::BASE_RETRY_DELAY_MS * 2u64.pow(attempt)
        + rand::thread_rng().gen_range(0..=config::RETRY_JITTER_MS);
    let delay_ms = server_hint_ms
        .unwrap_or(backoff)
        .min(config::MAX_RETRY_DELAY_MS);
    Duration::from_millis(delay_ms)
}

/// The usage-ledger endpoint label for a request path.
pub fn endpoint_from_path(provider: Provider, url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let path = without_scheme
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or("");
    let path = path.split('?').next().unwrap_or("");
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match provider {
        Provider::Youtube => match segments.last() {
            Some(last @ (&"search" | &"videos" | &"channels" | &"playlistItems")) => {
                (*last).to_string()
            }
            _ => "unknown".to_string(),
        },
        Provider::Keywordtool => {
            if segments.iter().any(|s| *s == "google-trends") {
                "trends".to_string()
            } else if let Some(pos) = segments.iter().position(|s| *s == "search") {
                segments
                    .get(pos + 1)
                    .map(|s| (*s).to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            } else {
                "unknown".to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub provider: Provider,
    pub concurrency: usize,
    pub min_interval: Duration,
    pub max_retries: u32,
}

type CallResult = std::result::Result<Value, ApiFailure>;
type SharedCall = Shared<BoxFuture<'static, CallResult>>;

struct GatewayInner {
    cfg: GatewayConfig,
    transport: Arc<dyn HttpTransport>,
    ledger: Arc<UsageLedger>,
    /// Bounds simultaneous outbound calls; excess callers queue FIFO.
    limiter: Semaphore,
    /// Timestamp of the most recent issuance. Held across the pacing sleep
    /// so issuances are strictly spaced even under concurrency.
    pacing: Mutex<Option<Instant>>,
    /// signature → shared in-flight call. Entries are removed when the
    /// call settles, so a later identical request issues a fresh call.
    inflight: DashMap<String, SharedCall>,
}

/// One gateway per provider, constructed at startup and shared by handle.
/// Owns all outbound-call policy: pacing, bounded concurrency, in-flight
/// de-duplication, retry/backoff, error classification, usage recording.
#[derive(Clone)]
pub struct ProviderGateway {
    inner: Arc<GatewayInner>,
}

impl ProviderGateway {
    pub fn new(
        cfg: GatewayConfig,
        transport: Arc<dyn HttpTransport>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        let limiter = Semaphore::new(cfg.concurrency.max(1));
        Self {
            inner: Arc::new(GatewayInner {
                cfg,
                transport,
                ledger,
                limiter,
                pacing: Mutex::new(None),
                inflight: DashMap::new(),
            }),
        }
    }

    pub fn provider(&self) -> Provider {
        self.inner.cfg.provider
    }

    /// Executes one logical call and returns the parsed JSON payload.
    /// Concurrent logically-identical requests share a single underlying
    /// call; every waiter sees the same value or the same classified error.
    pub async fn execute(&self, request: ApiRequest) -> Result<Value> {
        let provider = self.inner.cfg.provider;
        let signature = request.signature();

        let call = match self.inner.inflight.entry(signature.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                debug!(provider = %provider, "joining in-flight call");
                existing.get().clone()
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let inner = Arc::clone(&self.inner);
                let call = async move {
                    let outcome = run_call(&inner, &request).await;
                    inner.inflight.remove(&signature);
                    outcome
                }
                .boxed()
                .shared();
                slot.insert(call.clone());
                call
            }
        };

        call.await.map_err(|failure| failure.into_app_error(provider))
    }
}

async fn run_call(inner: &GatewayInner, request: &ApiRequest) -> CallResult {
    let provider = inner.cfg.provider;
    let endpoint = endpoint_from_path(provider, &request.url);
    let _permit = inner
        .limiter
        .acquire()
        .await
        .expect("gateway semaphore closed");

    let mut attempt: u32 = 0;
    loop {
        pace(inner).await;

        let failure = match inner.transport.send(request).await {
            Err(net) => ApiFailure {
                kind: FailureKind::Transient,
                status: 0,
                message: net,
                retry_after_ms: None,
            },
            Ok(response) if (200..300).contains(&response.status) => {
                match serde_json::from_str::<Value>(&response.body) {
                    Ok(value) => {
                        inner.ledger.record(provider, &endpoint, 1).await;
                        return Ok(value);
                    }
                    Err(e) => ApiFailure {
                        kind: FailureKind::Malformed,
                        status: response.status,
                        message: format!("undecodable response body: {e}"),
                        retry_after_ms: None,
                    },
                }
            }
            Ok(response) => classify_failure(&response),
        };

        if !failure.kind.is_retryable() || attempt >= inner.cfg.max_retries {
            inner.ledger.record(provider, &endpoint, 1).await;
            return Err(failure);
        }

        let delay = retry_delay(attempt, failure.retry_after_ms);
        warn!(
            provider = %provider,
            endpoint = %endpoint,
            status = failure.status,
            attempt,
            "retrying in {}ms: {}",
            delay.as_millis(),
            failure.message,
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Enforces the per-provider minimum inter-request interval across all
/// logical operations, however many are in flight.
async fn pace(inner: &GatewayInner) {
    let mut last = inner.pacing.lock().await;
    if let Some(previous) = *last {
        let elapsed = previous.elapsed();
        if elapsed < inner.cfg.min_interval {
            tokio::time::sleep(inner.cfg.min_interval - elapsed).await;
        }
    }
    *last = Some(Instant::now());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use crate::cache::{CacheContext, Caches};

    struct MockTransport {
        responses: StdMutex<VecDeque<std::result::Result<RawResponse, String>>>,
        calls: StdMutex<Vec<ApiRequest>>,
        delay: Duration,
    }

    impl MockTransport {
        fn new(responses: Vec<std::result::Result<RawResponse, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                calls: StdMutex::new(Vec::new()),
                delay: Duration::from_millis(10),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: &ApiRequest) -> std::result::Result<RawResponse, String> {
            self.calls.lock().unwrap().push(request.clone());
            tokio::time::sleep(self.delay).await;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("mock transport exhausted".to_string()))
        }
    }

    fn ok(body: &str) -> std::result::Result<RawResponse, String> {
        Ok(RawResponse {
            status: 200,
            retry_after: None,
            body: body.to_string(),
        })
    }

    fn status(status: u16, body: &str) -> std::result::Result<RawResponse, String> {
        Ok(RawResponse {
            status,
            retry_after: Some("0".to_string()),
            body: body.to_string(),
        })
    }

    fn gateway(transport: Arc<MockTransport>) -> ProviderGateway {
        let ledger = Arc::new(UsageLedger::new(
            Arc::new(Caches::new()),
            CacheContext::memory_only(),
            None,
            None,
        ));
        ProviderGateway::new(
            GatewayConfig {
                provider: Provider::Youtube,
                concurrency: 4,
                min_interval: Duration::ZERO,
                max_retries: config::MAX_RETRIES,
            },
            transport,
            ledger,
        )
    }

    fn search_request() -> ApiRequest {
        ApiRequest::get("https://www.googleapis.com/youtube/v3/search")
            .query("q", "edit videos")
            .query("part", "snippet")
    }

    #[tokio::test]
    async fn quota_exceeded_is_terminal_after_one_call() {
        let body = r#"{"error":{"code":403,"message":"quota exhausted",
            "errors":[{"reason":"quotaExceeded"}]}}"#;
        let transport = MockTransport::new(vec![status(403, body)]);
        let gateway = gateway(Arc::clone(&transport));

        let err = gateway.execute(search_request()).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { .. }), "{err}");
        assert_eq!(transport.call_count(), 1, "terminal errors are never retried");
    }

    #[tokio::test]
    async fn rate_limited_retries_until_success() {
        let limited = r#"{"error":{"code":429,"message":"slow down",
            "errors":[{"reason":"rateLimitExceeded"}]}}"#;
        let transport =
            MockTransport::new(vec![status(429, limited), ok(r#"{"items":[]}"#)]);
        let gateway = gateway(Arc::clone(&transport));

        let value = gateway.execute(search_request()).await.unwrap();
        assert!(value.get("items").is_some());
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_success_body_is_not_retried() {
        let transport = MockTransport::new(vec![ok("<html>not json</html>")]);
        let gateway = gateway(Arc::clone(&transport));

        let err = gateway.execute(search_request()).await.unwrap_err();
        assert!(matches!(err, AppError::Malformed { .. }), "{err}");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_call() {
        let transport = MockTransport::new(vec![ok(r#"{"items":[1,2]}"#)]);
        let gateway = gateway(Arc::clone(&transport));

        let (a, b) = tokio::join!(
            gateway.execute(search_request()),
            gateway.execute(search_request()),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(transport.call_count(), 1, "waiters shared the in-flight call");

        // After settling, an identical request issues a fresh call.
        let again = gateway.execute(search_request()).await;
        assert!(again.is_err(), "mock exhausted, so this must be a new call");
        assert!(transport.call_count() > 1);
    }

    #[tokio::test]
    async fn query_order_does_not_defeat_deduplication() {
        let transport = MockTransport::new(vec![ok(r#"{"items":[]}"#)]);
        let gateway = gateway(Arc::clone(&transport));

        let forward = ApiRequest::get("https://www.googleapis.com/youtube/v3/search")
            .query("part", "snippet")
            .query("q", "alpha");
        let reversed = ApiRequest::get("https://www.googleapis.com/youtube/v3/search")
            .query("q", "alpha")
            .query("part", "snippet");

        let (a, b) = tokio::join!(gateway.execute(forward), gateway.execute(reversed));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn endpoint_labels_derive_from_request_paths() {
        assert_eq!(
            endpoint_from_path(
                Provider::Youtube,
                "https://www.googleapis.com/youtube/v3/search"
            ),
            "search"
        );
        assert_eq!(
            endpoint_from_path(
                Provider::Youtube,
                "https://www.googleapis.com/youtube/v3/playlistItems"
            ),
            "playlistItems"
        );
        assert_eq!(
            endpoint_from_path(
                Provider::Keywordtool,
                "https://api.keywordtool.io/v2/search/volume/youtube"
            ),
            "volume"
        );
        assert_eq!(
            endpoint_from_path(
                Provider::Keywordtool,
                "https://api.keywordtool.io/v2/search/suggestions/google-trends"
            ),
            "trends"
        );
    }

    #[test]
    fn retry_after_parses_seconds_and_caps_delay() {
        assert_eq!(parse_retry_after(Some("2")), Some(2000));
        assert_eq!(parse_retry_after(Some("not a date")), None);
        assert_eq!(retry_delay(0, Some(60_000)).as_millis(), 4000);
    }
}
