use serde_json::Value;

use crate::error::{AppError, Result};
use crate::types::{ChannelStats, Provider, VideoRecord};

fn malformed(message: impl Into<String>) -> AppError {
    AppError::Malformed {
        provider: Provider::Youtube,
        message: message.into(),
    }
}

/// Counters arrive as numbers or as strings (sometimes with thousands
/// separators); anything unusable counts as zero.
pub fn parse_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.replace(',', "").parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// ISO-8601 durations in the provider's `PT#H#M#S` form.
pub fn parse_duration_seconds(value: Option<&str>) -> u64 {
    let Some(value) = value else { return 0 };
    let Some(rest) = value.strip_prefix("PT") else { return 0 };

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let amount: u64 = digits.parse().unwrap_or(0);
        digits.clear();
        total += match c {
            'H' => amount * 3600,
            'M' => amount * 60,
            'S' => amount,
            _ => 0,
        };
    }
    total
}

fn thumbnail_url(snippet: &Value) -> String {
    let thumbnails = snippet.get("thumbnails");
    for size in ["high", "medium", "default"] {
        if let Some(url) = thumbnails
            .and_then(|t| t.get(size))
            .and_then(|t| t.get("url"))
            .and_then(|u| u.as_str())
        {
            return url.to_string();
        }
    }
    String::new()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SearchPage {
    pub video_ids: Vec<String>,
    pub total_results: Option<f64>,
}

pub fn parse_search_page(payload: &Value) -> Result<SearchPage> {
    if !payload.is_object() {
        return Err(malformed("search response is not an object"));
    }

    let video_ids = match payload.get("items") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                item.get("id")
                    .and_then(|id| id.get("videoId"))
                    .and_then(|id| id.as_str())
                    .map(|id| id.to_string())
            })
            .collect(),
        Some(_) => return Err(malformed("search items is not an array")),
    };

    let total_results = payload
        .get("pageInfo")
        .and_then(|info| info.get("totalResults"))
        .map(|raw| parse_number(Some(raw)));

    Ok(SearchPage {
        video_ids,
        total_results,
    })
}

/// A type=channel search result's first channel id, used by channel
/// resolution.
pub fn parse_channel_search(payload: &Value) -> Result<Option<String>> {
    if !payload.is_object() {
        return Err(malformed("channel search response is not an object"));
    }
    Ok(payload
        .get("items")
        .and_then(|items| items.as_array())
        .and_then(|items| items.first())
        .and_then(|item| item.get("id"))
        .and_then(|id| id.get("channelId"))
        .and_then(|id| id.as_str())
        .map(|id| id.to_string()))
}

// ---------------------------------------------------------------------------
// videos
// ---------------------------------------------------------------------------

pub fn parse_video_items(payload: &Value) -> Result<Vec<VideoRecord>> {
    let items = match payload.get("items") {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(malformed("videos items is not an array")),
    };

    let mut videos = Vec::with_capacity(items.len());
    for item in items {
        let id = str_field(item, "id").ok_or_else(|| malformed("video item without id"))?;
        let snippet = item
            .get("snippet")
            .ok_or_else(|| malformed("video item without snippet"))?;
        let title =
            str_field(snippet, "title").ok_or_else(|| malformed("video item without title"))?;
        let channel_id = str_field(snippet, "channelId")
            .ok_or_else(|| malformed("video item without channelId"))?;
        let statistics = item.get("statistics");
        let tags = snippet
            .get("tags")
            .and_then(|t| t.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(|t| t.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        videos.push(VideoRecord {
            id: id.to_string(),
            title: title.to_string(),
            description: str_field(snippet, "description").unwrap_or("").to_string(),
            tags,
            published_at: str_field(snippet, "publishedAt").unwrap_or("").to_string(),
            view_count: parse_number(statistics.and_then(|s| s.get("viewCount"))),
            like_count: parse_number(statistics.and_then(|s| s.get("likeCount"))),
            comment_count: parse_number(statistics.and_then(|s| s.get("commentCount"))),
            url: format!("https://www.youtube.com/watch?v={id}"),
            channel_id: channel_id.to_string(),
            channel_title: str_field(snippet, "channelTitle").unwrap_or("").to_string(),
            channel_subscriber_count: 0.0,
            thumbnail_url: thumbnail_url(snippet),
            duration_seconds: parse_duration_seconds(
                item.get("contentDetails")
                    .and_then(|d| d.get("duration"))
                    .and_then(|d| d.as_str()),
            ),
        });
    }
    Ok(videos)
}

// ---------------------------------------------------------------------------
// channels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChannelItem {
    pub stats: ChannelStats,
    pub uploads_playlist_id: Option<String>,
}

pub fn parse_channel_items(payload: &Value) -> Result<Vec<ChannelItem>> {
    let items = match payload.get("items") {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(malformed("channels items is not an array")),
    };

    let mut channels = Vec::with_capacity(items.len());
    for item in items {
        let id = str_field(item, "id").ok_or_else(|| malformed("channel item without id"))?;
        let statistics = item.get("statistics");
        channels.push(ChannelItem {
            stats: ChannelStats {
                channel_id: id.to_string(),
                subscriber_count: parse_number(
                    statistics.and_then(|s| s.get("subscriberCount")),
                ),
                video_count: parse_number(statistics.and_then(|s| s.get("videoCount"))),
                view_count: parse_number(statistics.and_then(|s| s.get("viewCount"))),
            },
            uploads_playlist_id: item
                .get("contentDetails")
                .and_then(|d| d.get("relatedPlaylists"))
                .and_then(|p| p.get("uploads"))
                .and_then(|u| u.as_str())
                .filter(|u| !u.is_empty())
                .map(|u| u.to_string()),
        });
    }
    Ok(channels)
}

// ---------------------------------------------------------------------------
// playlistItems
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlaylistPage {
    pub video_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

pub fn parse_playlist_page(payload: &Value) -> Result<PlaylistPage> {
    let video_ids = match payload.get("items") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                item.get("contentDetails")
                    .and_then(|d| d.get("videoId"))
                    .and_then(|id| id.as_str())
                    .map(|id| id.to_string())
            })
            .collect(),
        Some(_) => return Err(malformed("playlist items is not an array")),
    };

    Ok(PlaylistPage {
        video_ids,
        next_page_token: payload
            .get("nextPageToken")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_parse_from_strings_and_commas() {
        assert_eq!(parse_number(Some(&json!(42))), 42.0);
        assert_eq!(parse_number(Some(&json!("1,234"))), 1234.0);
        assert_eq!(parse_number(Some(&json!("junk"))), 0.0);
        assert_eq!(parse_number(None), 0.0);
    }

    #[test]
    fn durations_parse_hours_minutes_seconds() {
        assert_eq!(parse_duration_seconds(Some("PT1H2M3S")), 3723);
        assert_eq!(parse_duration_seconds(Some("PT10M")), 600);
        assert_eq!(parse_duration_seconds(Some("PT45S")), 45);
        assert_eq!(parse_duration_seconds(Some("garbage")), 0);
        assert_eq!(parse_duration_seconds(None), 0);
    }

    #[test]
    fn search_page_keeps_item_order_and_total() {
        let payload = json!({
            "items": [
                {"id": {"videoId": "b"}},
                {"id": {"channelId": "skipped-no-video-id"}},
                {"id": {"videoId": "a"}},
            ],
            "pageInfo": {"totalResults": "1200"},
        });
        let page = parse_search_page(&payload).unwrap();
        assert_eq!(page.video_ids, vec!["b", "a"]);
        assert_eq!(page.total_results, Some(1200.0));
    }

    #[test]
    fn video_without_required_fields_is_malformed() {
        let payload = json!({"items": [{"snippet": {"title": "no id"}}]});
        assert!(parse_video_items(&payload).is_err());

        let payload = json!({"items": "not an array"});
        assert!(parse_video_items(&payload).is_err());
    }

    #[test]
    fn video_items_prefer_high_thumbnail_and_default_missing_fields() {
        let payload = json!({
            "items": [{
                "id": "v1",
                "snippet": {
                    "title": "Title",
                    "channelId": "c1",
                    "publishedAt": "2024-01-01T00:00:00Z",
                    "thumbnails": {
                        "default": {"url": "d.jpg"},
                        "high": {"url": "h.jpg"},
                    },
                },
                "statistics": {"viewCount": "500"},
                "contentDetails": {"duration": "PT7M"},
            }]
        });
        let videos = parse_video_items(&payload).unwrap();
        assert_eq!(videos[0].thumbnail_url, "h.jpg");
        assert_eq!(videos[0].view_count, 500.0);
        assert_eq!(videos[0].duration_seconds, 420);
        assert!(videos[0].tags.is_empty());
        assert_eq!(videos[0].channel_subscriber_count, 0.0);
    }

    #[test]
    fn channel_items_expose_uploads_playlist_when_present() {
        let payload = json!({
            "items": [{
                "id": "c1",
                "statistics": {"subscriberCount": "1000", "viewCount": 5000},
                "contentDetails": {"relatedPlaylists": {"uploads": "upl-1"}},
            }]
        });
        let channels = parse_channel_items(&payload).unwrap();
        assert_eq!(channels[0].stats.subscriber_count, 1000.0);
        assert_eq!(channels[0].uploads_playlist_id.as_deref(), Some("upl-1"));
    }
}
