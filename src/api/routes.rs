use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::engine::{DiscoverRequest, Engine};
use crate::types::SuggestionMode;
use crate::youtube::SerpOptions;

/// Header signalling that expired cached data was served after a rate
/// limit, so callers can distinguish "degraded" from "failed".
const STALE_HEADER: &str = "x-gapscan-cache";
const STALE_HEADER_VALUE: &str = "stale-fallback";

const MIN_SEED_LEN: usize = 2;
const MAX_SEED_LEN: usize = 120;
const MAX_COUNT: usize = 50;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/usage", get(get_usage))
        .route("/api/keywords", post(post_keywords))
        .route("/api/youtube", post(post_youtube))
        .route("/api/score", post(post_score))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct KeywordsRequest {
    pub seed: String,
    pub limit: usize,
    pub country: Option<String>,
    pub language: Option<String>,
    pub mode: Option<SuggestionMode>,
}

#[derive(Deserialize)]
pub struct YoutubeRequest {
    pub keyword: String,
    pub max_videos: usize,
    #[serde(default)]
    pub stale_on_rate_limit: Option<bool>,
}

#[derive(Deserialize)]
pub struct ScoreRequest {
    pub seed: String,
    pub max_keywords: Option<usize>,
    pub videos_per_keyword: Option<usize>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub mode: Option<SuggestionMode>,
    pub min_volume: Option<f64>,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub hide_noise: Option<bool>,
    pub cluster: Option<bool>,
    pub channel: Option<String>,
    pub show_weighted: Option<bool>,
    #[serde(default)]
    pub stale_on_rate_limit: Option<bool>,
}

// ---------------------------------------------------------------------------
// Validation: schema checks only; the engine receives validated primitives.
// ---------------------------------------------------------------------------

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn validate_seed(seed: &str) -> Result<(), Response> {
    let len = seed.trim().chars().count();
    if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&len) {
        return Err(bad_request("seed must be between 2 and 120 characters"));
    }
    Ok(())
}

fn validate_count(value: usize, field: &str) -> Result<(), Response> {
    if !(1..=MAX_COUNT).contains(&value) {
        return Err(bad_request(&format!("{field} must be between 1 and 50")));
    }
    Ok(())
}

fn split_terms(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|term| term.trim().to_string())
        .filter(|term| !term.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Response {
    let status = state.engine.status();
    Json(serde_json::json!({
        "ok": true,
        "youtube_configured": status.youtube_configured,
        "keywordtool_configured": status.keywordtool_configured,
        "durable_cache": status.durable_cache,
        "trends_enabled": status.trends_enabled,
    }))
    .into_response()
}

async fn get_usage(State(state): State<ApiState>) -> Response {
    Json(state.engine.usage_summary().await).into_response()
}

async fn post_keywords(
    State(state): State<ApiState>,
    Json(request): Json<KeywordsRequest>,
) -> Response {
    if let Err(response) = validate_seed(&request.seed) {
        return response;
    }
    if let Err(response) = validate_count(request.limit, "limit") {
        return response;
    }

    match state
        .engine
        .ideas_with_demand(
            request.seed.trim(),
            request.limit,
            request.country.as_deref(),
            request.language.as_deref(),
            request.mode.unwrap_or_default(),
        )
        .await
    {
        Ok(ideas) => Json(ideas).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn post_youtube(
    State(state): State<ApiState>,
    Json(request): Json<YoutubeRequest>,
) -> Response {
    if let Err(response) = validate_seed(&request.keyword) {
        return response;
    }
    if let Err(response) = validate_count(request.max_videos, "max_videos") {
        return response;
    }

    let options = SerpOptions {
        stale_on_rate_limit: request.stale_on_rate_limit.unwrap_or(true),
    };
    match state
        .engine
        .serp_for_keyword(request.keyword.trim(), request.max_videos, options)
        .await
    {
        Ok(fetch) => {
            let mut response = Json(fetch.snapshot).into_response();
            if fetch.served_stale {
                response
                    .headers_mut()
                    .insert(STALE_HEADER, HeaderValue::from_static(STALE_HEADER_VALUE));
            }
            response
        }
        Err(err) => err.into_response(),
    }
}

async fn post_score(State(state): State<ApiState>, Json(request): Json<ScoreRequest>) -> Response {
    if let Err(response) = validate_seed(&request.seed) {
        return response;
    }
    if let Some(max_keywords) = request.max_keywords {
        if let Err(response) = validate_count(max_keywords, "max_keywords") {
            return response;
        }
    }
    if let Some(videos) = request.videos_per_keyword {
        if let Err(response) = validate_count(videos, "videos_per_keyword") {
            return response;
        }
    }

    let mode = request.mode.unwrap_or_default();
    if mode == SuggestionMode::Trends && !state.engine.status().trends_enabled {
        return bad_request("Google Trends suggestions are disabled");
    }

    let discover = DiscoverRequest {
        seed: request.seed.trim().to_string(),
        max_keywords: request.max_keywords,
        videos_per_keyword: request.videos_per_keyword,
        country: request.country,
        language: request.language,
        mode,
        min_volume: request.min_volume.unwrap_or(0.0),
        include: split_terms(request.include.as_deref()),
        exclude: split_terms(request.exclude.as_deref()),
        hide_noise: request.hide_noise.unwrap_or(true),
        cluster: request.cluster.unwrap_or(true),
        channel: request.channel,
        show_weighted: request.show_weighted.unwrap_or(false),
        stale_on_rate_limit: request.stale_on_rate_limit.unwrap_or(false),
    };

    match state.engine.discover(discover).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}
