use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::keywords::normalize::normalize;
use crate::scoring::fit::fit_score;
use crate::scoring::opportunity::{average, clamp, log_norm, median};
use crate::scoring::tokenize::{overlap_ratio, tokenize};
use crate::types::{ChannelProfile, VideoRecord};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FitLabel {
    Strong,
    Medium,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLabel {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageLabel {
    Strong,
    Medium,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessLabel {
    Fresh,
    Aging,
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredVideo {
    #[serde(flatten)]
    pub video: VideoRecord,
    pub fit: f64,
    pub fit_label: FitLabel,
    pub age_days: f64,
    pub views_per_day: f64,
    pub exact_title_match: bool,
    pub early_title_match: bool,
    pub exact_desc_match: bool,
    pub early_desc_match: bool,
    pub exact_tag_match: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SerpMetrics {
    pub total_results: Option<f64>,
    pub median_channel_subs: f64,
    pub median_views_per_day: f64,
    pub median_video_age_days: f64,
    /// Fraction of top results owned by channels past the large-subscriber
    /// threshold.
    pub dominance_factor: f64,
}

/// All sub-scores live in [0,100]; trend is present only with at least six
/// months of demand history.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub demand_score: u32,
    pub competition_score: u32,
    pub optimization_strength_score: u32,
    pub freshness_score: u32,
    pub trend_score: Option<u32>,
    pub difficulty: u32,
    pub opportunity_score: u32,
    pub weighted_opportunity_score: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreLabels {
    pub difficulty: DifficultyLabel,
    pub coverage: CoverageLabel,
    pub freshness: FreshnessLabel,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpportunityReport {
    pub keyword: String,
    pub volume: f64,
    pub monthly_volumes: Option<Vec<f64>>,
    pub scores: ScoreBreakdown,
    pub labels: ScoreLabels,
    pub avg_top_fit: f64,
    pub weak_fit_rate: f64,
    pub best_answer_age_days: f64,
    pub no_strong_match: bool,
    /// High-view results only loosely aligned with the keyword.
    pub mismatch_high: bool,
    pub trend_ratio: Option<f64>,
    pub top_videos: Vec<ScoredVideo>,
    pub serp_metrics: SerpMetrics,
    pub related_keywords: Vec<String>,
    pub cluster_id: Option<String>,
    pub cluster_label: Option<String>,
    pub cluster_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScoreInput<'a> {
    pub keyword: &'a str,
    pub volume: f64,
    pub monthly_volumes: Option<&'a [f64]>,
    pub videos: &'a [VideoRecord],
    pub total_results: Option<f64>,
    /// Observed demand range across the batch being scored; normalization
    /// is relative to these, not absolute.
    pub min_volume: f64,
    pub max_volume: f64,
    pub related_keywords: Vec<String>,
    pub channel_profile: Option<&'a ChannelProfile>,
    pub now: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

fn fit_label(fit: f64) -> FitLabel {
    if fit >= 0.75 {
        FitLabel::Strong
    } else if fit >= 0.55 {
        FitLabel::Medium
    } else {
        FitLabel::Weak
    }
}

fn age_days(published_at: &str, now_ms: i64) -> f64 {
    match DateTime::parse_from_rfc3339(published_at) {
        Ok(at) => (((now_ms - at.timestamp_millis()) / 86_400_000).max(0)) as f64,
        Err(_) => 0.0,
    }
}

fn prefix_chars(value: &str, count: usize) -> String {
    value.chars().take(count).collect()
}

/// Trend momentum over the monthly series: last three months against the
/// three before. With six or more entries a score is always produced; a
/// non-positive prior average saturates the ratio instead of suppressing
/// the signal.
fn trend_score(monthly_volumes: Option<&[f64]>) -> (Option<u32>, Option<f64>) {
    let Some(series) = monthly_volumes else {
        return (None, None);
    };
    if series.len() < 6 {
        return (None, None);
    }

    let recent = average(&series[series.len() - 3..]);
    let previous = average(&series[series.len() - 6..series.len() - 3]);
    let ratio = if previous > 0.0 {
        recent / previous
    } else if recent > 0.0 {
        2.0
    } else {
        1.0
    };

    let normalized = clamp((ratio - 0.5) / 1.5, 0.0, 1.0);
    (Some((normalized * 100.0).round() as u32), Some(ratio))
}

fn channel_power(profile: Option<&ChannelProfile>) -> Option<f64> {
    let profile = profile?;
    let subs = log_norm(profile.subscriber_count, 500.0, 2_000_000.0);
    let views = log_norm(profile.avg_views_per_day, 50.0, 50_000.0);
    Some(clamp(0.6 * subs + 0.4 * views, 0.0, 1.0))
}

fn serp_power(median_subs: f64, median_views_per_day: f64) -> f64 {
    let subs = log_norm(median_subs, 1_000.0, 2_000_000.0);
    let views = log_norm(median_views_per_day, 100.0, 100_000.0);
    clamp(0.6 * subs + 0.4 * views, 0.0, 1.0)
}

pub fn score_keyword_opportunity(input: ScoreInput<'_>) -> OpportunityReport {
    let now_ms = input.now.timestamp_millis();
    let normalized_keyword = normalize(input.keyword);
    let keyword_tokens = tokenize(input.keyword);

    let scored_videos: Vec<ScoredVideo> = input
        .videos
        .iter()
        .map(|video| {
            let title_tokens = tokenize(&video.title);
            let desc_tokens = tokenize(&video.description);
            let tag_tokens = tokenize(&video.tags.join(" "));
            let fit = fit_score(&keyword_tokens, &title_tokens, &desc_tokens, &tag_tokens);
            let age = age_days(&video.published_at, now_ms);
            let views_per_day = if age > 0.0 {
                video.view_count / age
            } else {
                video.view_count
            };

            let normalized_title = normalize(&video.title);
            let normalized_desc = normalize(&video.description);
            ScoredVideo {
                fit,
                fit_label: fit_label(fit),
                age_days: age,
                views_per_day,
                exact_title_match: normalized_title.contains(&normalized_keyword),
                early_title_match: prefix_chars(&normalized_title, 60)
                    .contains(&normalized_keyword),
                exact_desc_match: normalized_desc.contains(&normalized_keyword),
                early_desc_match: prefix_chars(&normalized_desc, 200)
                    .contains(&normalized_keyword),
                exact_tag_match: video
                    .tags
                    .iter()
                    .any(|tag| normalize(tag) == normalized_keyword),
                video: video.clone(),
            }
        })
        .collect();

    let top_five = &scored_videos[..scored_videos.len().min(5)];
    let top_ten = &scored_videos[..scored_videos.len().min(10)];
    let top_len = top_ten.len().max(1) as f64;

    let avg_top_fit = average(&top_five.iter().map(|v| v.fit).collect::<Vec<_>>());
    let weak_count = top_ten.iter().filter(|v| v.fit < 0.5).count();
    let weak_fit_rate = if top_ten.is_empty() {
        0.0
    } else {
        weak_count as f64 / top_ten.len() as f64
    };

    let ages: Vec<f64> = top_ten.iter().map(|v| v.age_days).collect();
    let median_video_age_days = median(&ages);

    // Freshness basis: youngest strong match when one exists, else the
    // median age of everything in the top ten.
    let strong_ages: Vec<f64> = top_ten
        .iter()
        .filter(|v| v.fit >= 0.7)
        .map(|v| v.age_days)
        .collect();
    let (no_strong_match, best_answer_age_days) = if strong_ages.is_empty() {
        (true, median_video_age_days)
    } else {
        (
            false,
            strong_ages.iter().cloned().fold(f64::INFINITY, f64::min),
        )
    };

    let rate = |predicate: fn(&ScoredVideo) -> bool| {
        top_ten.iter().filter(|v| predicate(v)).count() as f64 / top_len
    };
    let exact_title_rate = rate(|v| v.exact_title_match);
    let early_title_rate = rate(|v| v.early_title_match);
    let early_desc_rate = rate(|v| v.early_desc_match);
    let tag_rate = rate(|v| v.exact_tag_match);
    let avg_overlap = average(
        &top_ten
            .iter()
            .map(|v| {
                let combined = format!("{} {}", v.video.title, v.video.description);
                overlap_ratio(&keyword_tokens, &tokenize(&combined))
            })
            .collect::<Vec<_>>(),
    );

    let optimization_strength_score = (clamp(
        0.35 * exact_title_rate
            + 0.15 * early_title_rate
            + 0.2 * early_desc_rate
            + 0.1 * tag_rate
            + 0.2 * avg_overlap,
        0.0,
        1.0,
    ) * 100.0)
        .round() as u32;

    let view_counts: Vec<f64> = top_ten.iter().map(|v| v.video.view_count).collect();
    let min_views = view_counts.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_views = view_counts.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let (min_views, max_views) = if view_counts.is_empty() {
        (0.0, 0.0)
    } else {
        (min_views, max_views)
    };
    let mismatch_raw: f64 = top_ten
        .iter()
        .map(|v| log_norm(v.video.view_count, min_views, max_views) * (1.0 - v.fit))
        .sum();
    let mismatch_high = mismatch_raw >= 0.6;

    let median_channel_subs = median(
        &top_ten
            .iter()
            .map(|v| v.video.channel_subscriber_count)
            .collect::<Vec<_>>(),
    );
    let median_views_per_day = median(&top_ten.iter().map(|v| v.views_per_day).collect::<Vec<_>>());
    let dominance_factor = top_ten
        .iter()
        .filter(|v| v.video.channel_subscriber_count >= 1_000_000.0)
        .count() as f64
        / top_len;

    let total_results_score = input
        .total_results
        .map(|total| log_norm(total, 1_000.0, 50_000_000.0))
        .unwrap_or(0.5);
    let subs_score = log_norm(median_channel_subs, 1_000.0, 2_000_000.0);
    let views_score = log_norm(median_views_per_day, 100.0, 100_000.0);
    let competition_hardness = clamp(
        0.35 * total_results_score + 0.35 * subs_score + 0.2 * views_score + 0.1 * dominance_factor,
        0.0,
        1.0,
    );
    let competition_score = ((1.0 - competition_hardness) * 100.0).round() as u32;

    let difficulty = (clamp(
        0.7 * competition_hardness + 0.3 * (optimization_strength_score as f64 / 100.0),
        0.0,
        1.0,
    ) * 100.0)
        .round() as u32;

    let demand_score =
        (log_norm(input.volume, input.min_volume, input.max_volume) * 100.0).round() as u32;

    let freshness_raw = clamp(best_answer_age_days / 365.0, 0.0, 2.0) * 0.6
        + clamp(median_video_age_days / 365.0, 0.0, 2.0) * 0.4;
    let freshness_score = (clamp(freshness_raw / 2.0, 0.0, 1.0) * 100.0).round() as u32;

    let (trend, trend_ratio) = trend_score(input.monthly_volumes);

    // Composite: optimization contributes as weakness (100 - strength).
    // When trend is absent its weight drops out and the denominator
    // renormalizes to the sum of the active weights.
    let optimization_weakness = 100.0 - optimization_strength_score as f64;
    let trend_weight = if trend.is_some() { 0.05 } else { 0.0 };
    let total_weight = 0.35 + 0.25 + 0.2 + 0.15 + trend_weight;
    let weighted_sum = 0.35 * demand_score as f64
        + 0.25 * competition_score as f64
        + 0.2 * optimization_weakness
        + 0.15 * freshness_score as f64
        + trend_weight * trend.unwrap_or(0) as f64;
    let opportunity_score = clamp(weighted_sum / total_weight, 0.0, 100.0).round() as u32;

    let serp_power = serp_power(median_channel_subs, median_views_per_day);
    let rankability = channel_power(input.channel_profile).and_then(|power| {
        (serp_power > 0.0).then(|| clamp(power / serp_power, 0.5, 1.3))
    });
    let weighted_opportunity_score = rankability
        .map(|factor| clamp(opportunity_score as f64 * factor, 0.0, 100.0).round() as u32);

    let labels = ScoreLabels {
        difficulty: if difficulty < 40 {
            DifficultyLabel::Easy
        } else if difficulty < 70 {
            DifficultyLabel::Medium
        } else {
            DifficultyLabel::Hard
        },
        coverage: if avg_top_fit >= 0.75 {
            CoverageLabel::Strong
        } else if avg_top_fit >= 0.55 {
            CoverageLabel::Medium
        } else {
            CoverageLabel::Weak
        },
        freshness: if best_answer_age_days < 90.0 {
            FreshnessLabel::Fresh
        } else if best_answer_age_days < 365.0 {
            FreshnessLabel::Aging
        } else {
            FreshnessLabel::Stale
        },
    };

    OpportunityReport {
        keyword: input.keyword.to_string(),
        volume: input.volume,
        monthly_volumes: input.monthly_volumes.map(|m| m.to_vec()),
        scores: ScoreBreakdown {
            demand_score,
            competition_score,
            optimization_strength_score,
            freshness_score,
            trend_score: trend,
            difficulty,
            opportunity_score,
            weighted_opportunity_score,
        },
        labels,
        avg_top_fit,
        weak_fit_rate,
        best_answer_age_days,
        no_strong_match,
        mismatch_high,
        trend_ratio,
        serp_metrics: SerpMetrics {
            total_results: input.total_results,
            median_channel_subs,
            median_views_per_day,
            median_video_age_days,
            dominance_factor,
        },
        top_videos: scored_videos,
        related_keywords: input.related_keywords,
        cluster_id: None,
        cluster_label: None,
        cluster_size: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn video(id: &str, title: &str, published_at: &str) -> VideoRecord {
        VideoRecord {
            id: id.to_string(),
            title: title.to_string(),
            description: "learn to edit videos quickly".to_string(),
            tags: vec!["edit videos".to_string(), "video editing".to_string()],
            published_at: published_at.to_string(),
            view_count: 50_000.0,
            like_count: 1_200.0,
            comment_count: 120.0,
            url: format!("https://www.youtube.com/watch?v={id}"),
            channel_id: "UCdemo".to_string(),
            channel_title: "Demo Channel".to_string(),
            channel_subscriber_count: 25_000.0,
            thumbnail_url: String::new(),
            duration_seconds: 420,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn base_input<'a>(videos: &'a [VideoRecord], monthly: Option<&'a [f64]>) -> ScoreInput<'a> {
        ScoreInput {
            keyword: "how to edit videos",
            volume: 10_000.0,
            monthly_volumes: monthly,
            videos,
            total_results: Some(1_000_000.0),
            min_volume: 1_000.0,
            max_volume: 20_000.0,
            related_keywords: Vec::new(),
            channel_profile: None,
            now: fixed_now(),
        }
    }

    const RISING_YEAR: [f64; 12] = [
        4000.0, 4200.0, 4500.0, 4800.0, 5000.0, 5300.0, 5500.0, 5800.0, 6000.0, 6500.0, 6800.0,
        7000.0,
    ];

    #[test]
    fn all_scores_stay_in_range() {
        let videos = vec![
            video("a", "How to edit videos", "2023-01-10T00:00:00Z"),
            video("b", "Edit videos fast", "2022-12-01T00:00:00Z"),
            video("c", "Random topic", "2021-10-01T00:00:00Z"),
        ];
        let report = score_keyword_opportunity(base_input(&videos, Some(&RISING_YEAR)));

        let scores = &report.scores;
        for value in [
            scores.demand_score,
            scores.competition_score,
            scores.optimization_strength_score,
            scores.freshness_score,
            scores.difficulty,
            scores.opportunity_score,
        ] {
            assert!(value <= 100, "score out of range: {value}");
        }
        assert!(scores.trend_score.is_some(), "12 months of history present");
        assert!(scores.trend_score.unwrap() <= 100);
        assert!(report.trend_ratio.unwrap() > 1.0, "series is rising");
    }

    #[test]
    fn trend_is_absent_below_six_months_of_history() {
        let videos = vec![video("a", "How to edit videos", "2023-06-01T00:00:00Z")];
        let short = [100.0, 120.0, 140.0, 160.0, 180.0];
        let report = score_keyword_opportunity(base_input(&videos, Some(&short)));
        assert_eq!(report.scores.trend_score, None);

        let report = score_keyword_opportunity(base_input(&videos, None));
        assert_eq!(report.scores.trend_score, None);
    }

    #[test]
    fn trend_saturates_when_prior_period_is_flat_zero() {
        let videos = vec![video("a", "How to edit videos", "2023-06-01T00:00:00Z")];
        let from_nothing = [0.0, 0.0, 0.0, 10.0, 20.0, 30.0];
        let report = score_keyword_opportunity(base_input(&videos, Some(&from_nothing)));
        assert_eq!(report.scores.trend_score, Some(100));
    }

    #[test]
    fn no_strong_match_falls_back_to_median_age() {
        let videos = vec![
            video("a", "Unrelated cooking show", "2023-12-02T00:00:00Z"),
            video("b", "Travel vlog", "2023-10-03T00:00:00Z"),
            video("c", "Gaming stream", "2023-08-05T00:00:00Z"),
        ];
        let report = score_keyword_opportunity(base_input(&videos, None));

        assert!(report.no_strong_match);
        let expected_median = {
            let ages: Vec<f64> = report.top_videos.iter().map(|v| v.age_days).collect();
            crate::scoring::opportunity::median(&ages)
        };
        assert_eq!(report.best_answer_age_days, expected_median);
    }

    #[test]
    fn strong_channel_raises_the_weighted_score() {
        let mut a = video("a", "How to edit videos", "2023-01-10T00:00:00Z");
        a.channel_subscriber_count = 5_000.0;
        a.view_count = 10_000.0;
        let mut b = video("b", "Edit videos fast", "2023-02-10T00:00:00Z");
        b.channel_subscriber_count = 3_000.0;
        b.view_count = 8_000.0;
        let videos = vec![a, b];

        let profile = ChannelProfile {
            channel_id: "UCpower".to_string(),
            subscriber_count: 500_000.0,
            video_count: 120.0,
            view_count: 50_000_000.0,
            avg_views: 120_000.0,
            avg_views_per_day: 8_000.0,
        };

        let mut input = base_input(&videos, None);
        input.total_results = Some(250_000.0);
        input.channel_profile = Some(&profile);
        let report = score_keyword_opportunity(input);

        let weighted = report
            .scores
            .weighted_opportunity_score
            .expect("profile supplied");
        assert!(
            weighted > report.scores.opportunity_score,
            "powerful channel against a weak SERP must lift the score \
             (weighted={weighted}, base={})",
            report.scores.opportunity_score
        );
        assert!(weighted <= 100);
    }

    #[test]
    fn no_channel_profile_means_no_weighted_score() {
        let videos = vec![video("a", "How to edit videos", "2023-01-10T00:00:00Z")];
        let report = score_keyword_opportunity(base_input(&videos, None));
        assert_eq!(report.scores.weighted_opportunity_score, None);
    }

    #[test]
    fn empty_serp_still_scores_without_panicking() {
        let report = score_keyword_opportunity(base_input(&[], None));
        assert!(report.scores.opportunity_score <= 100);
        assert!(report.no_strong_match);
        assert_eq!(report.serp_metrics.median_channel_subs, 0.0);
    }
}
