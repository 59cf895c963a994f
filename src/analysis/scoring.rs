//! Pure scoring and aggregation over classified comments.
//!
//! Nothing here performs I/O or reads shared state; every function is a
//! deterministic mapping from its arguments, so results are reproducible for a
//! fixed input (and, for freshness, a fixed `now`).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;

use super::intent::IntentCategory;
use super::types::{CategoryCounts, FreshnessBadge, FreshnessData, GeoMention, ScoreLevel};

pub const HIGH_SCORE_THRESHOLD: u64 = 150;
pub const MODERATE_SCORE_THRESHOLD: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionScore {
    pub raw_score: u64,
    /// Raw score per 1,000 views
    pub density_score: f64,
}

pub fn conversion_score(counts: &CategoryCounts, view_count: u64) -> ConversionScore {
    let raw_score = counts
        .iter()
        .map(|(category, count)| count as u64 * u64::from(category.weight()))
        .sum();

    ConversionScore {
        raw_score,
        density_score: density_score(raw_score, view_count),
    }
}

/// Zero when there are no views.
pub fn density_score(raw_score: u64, view_count: u64) -> f64 {
    if view_count == 0 {
        return 0.0;
    }
    raw_score as f64 / (view_count as f64 / 1000.0)
}

pub fn score_level(raw_score: u64) -> ScoreLevel {
    if raw_score >= HIGH_SCORE_THRESHOLD {
        ScoreLevel::High
    } else if raw_score >= MODERATE_SCORE_THRESHOLD {
        ScoreLevel::Moderate
    } else {
        ScoreLevel::Low
    }
}

pub fn average_intent_score(scores: &[u8]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: u64 = scores.iter().map(|s| u64::from(*s)).sum();
    total as f64 / scores.len() as f64
}

/// Count each trimmed, non-empty location as-is (no comma splitting).
pub fn geo_mentions<'a, I>(locations: I) -> Vec<GeoMention>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut tally = Tally::default();
    for location in locations.into_iter().flatten() {
        let normalized = location.trim();
        if !normalized.is_empty() {
            tally.add(normalized, 1);
        }
    }
    tally.into_sorted()
}

/// Break multi-place mentions ("Austin, Texas") into individual places.
///
/// Each place inherits the count of the mention it came from, and places
/// repeated across mentions are summed.
pub fn split_geo_mentions(mentions: &[GeoMention]) -> Vec<GeoMention> {
    let mut tally = Tally::default();
    for mention in mentions {
        for part in mention.location.split(',').map(str::trim) {
            if !part.is_empty() {
                tally.add(part, mention.count);
            }
        }
    }
    tally.into_sorted()
}

/// Insertion-ordered counter; the stable sort keeps first-seen order for ties.
#[derive(Default)]
struct Tally {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl Tally {
    fn add(&mut self, key: &str, amount: usize) {
        match self.counts.get_mut(key) {
            Some(count) => *count += amount,
            None => {
                self.order.push(key.to_string());
                self.counts.insert(key.to_string(), amount);
            }
        }
    }

    fn into_sorted(mut self) -> Vec<GeoMention> {
        let mut mentions: Vec<GeoMention> = self
            .order
            .into_iter()
            .map(|location| {
                let count = self.counts.remove(&location).unwrap_or(0);
                GeoMention { location, count }
            })
            .collect();
        mentions.sort_by(|a, b| b.count.cmp(&a.count));
        mentions
    }
}

/// RFC 3339, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

pub fn freshness<S: AsRef<str>>(timestamps: &[S]) -> FreshnessData {
    freshness_at(timestamps, Utc::now())
}

/// Freshness relative to `now`. Unparseable timestamps are ignored.
pub fn freshness_at<S: AsRef<str>>(timestamps: &[S], now: DateTime<Utc>) -> FreshnessData {
    let mut dates: Vec<DateTime<Utc>> = timestamps
        .iter()
        .filter_map(|raw| parse_timestamp(raw.as_ref()))
        .collect();

    if dates.is_empty() {
        return FreshnessData::cold();
    }

    dates.sort_by(|a, b| b.cmp(a));

    let seven_days_ago = now - Duration::days(7);
    let thirty_days_ago = now - Duration::days(30);
    let comments_last_7_days = dates.iter().filter(|d| **d >= seven_days_ago).count();
    let comments_last_30_days = dates.iter().filter(|d| **d >= thirty_days_ago).count();

    let badge = if comments_last_7_days > 0 {
        FreshnessBadge::Active
    } else if comments_last_30_days > 0 {
        FreshnessBadge::Warm
    } else {
        FreshnessBadge::Cold
    };

    FreshnessData {
        last_comment_date: dates.first().copied(),
        comments_last_7_days,
        comments_last_30_days,
        badge,
    }
}

/// Most frequent category that signals a need, ignoring general chatter and thanks.
pub fn dominant_category(counts: &CategoryCounts) -> IntentCategory {
    let mut best: Option<(IntentCategory, usize)> = None;
    for (category, count) in counts.iter() {
        if matches!(
            category,
            IntentCategory::General | IntentCategory::GratitudeEngagement
        ) || count == 0
        {
            continue;
        }
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((category, count));
        }
    }
    best.map(|(category, _)| category)
        .unwrap_or(IntentCategory::General)
}
