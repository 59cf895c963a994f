use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::intent::IntentCategory;
use crate::youtube::Comment;

/// The model's judgment on one comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Zero-based index into the comments sent for classification
    pub comment_index: usize,
    pub category: IntentCategory,
    /// 1-10, higher means closer to booking
    pub intent_score: u8,
    /// Free text, possibly several comma-separated places
    pub location: Option<String>,
    pub key_phrase: String,
}

/// Per-category tally; every category is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryCounts(BTreeMap<IntentCategory, usize>);

impl Default for CategoryCounts {
    fn default() -> Self {
        Self(IntentCategory::all().iter().map(|c| (*c, 0)).collect())
    }
}

impl CategoryCounts {
    pub fn from_classifications(classifications: &[Classification]) -> Self {
        let mut counts = Self::default();
        for classification in classifications {
            counts.add(classification.category);
        }
        counts
    }

    pub fn add(&mut self, category: IntentCategory) {
        *self.0.entry(category).or_insert(0) += 1;
    }

    pub fn get(&self, category: IntentCategory) -> usize {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IntentCategory, usize)> + '_ {
        self.0.iter().map(|(c, n)| (*c, *n))
    }
}

impl FromIterator<(IntentCategory, usize)> for CategoryCounts {
    fn from_iter<T: IntoIterator<Item = (IntentCategory, usize)>>(iter: T) -> Self {
        let mut counts = Self::default();
        for (category, count) in iter {
            *counts.0.entry(category).or_insert(0) += count;
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMention {
    pub location: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessBadge {
    Active,
    Warm,
    Cold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessData {
    pub last_comment_date: Option<DateTime<Utc>>,
    pub comments_last_7_days: usize,
    pub comments_last_30_days: usize,
    pub badge: FreshnessBadge,
}

impl FreshnessData {
    pub fn cold() -> Self {
        Self {
            last_comment_date: None,
            comments_last_7_days: 0,
            comments_last_30_days: 0,
            badge: FreshnessBadge::Cold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreLevel {
    High,
    Moderate,
    Low,
}

/// Bookkeeping shown next to a result for debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub relevance_count: usize,
    pub time_count: usize,
    pub unique_count: usize,
    pub analysis_time_ms: u64,
    pub total_characters: usize,
}

/// Terminal artifact of one pipeline run for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub video_id: String,
    pub comments: Vec<Comment>,
    pub classifications: Vec<Classification>,
    pub category_counts: CategoryCounts,
    pub raw_score: u64,
    pub density_score: f64,
    pub average_intent_score: f64,
    /// Keyed by the raw trimmed location string
    pub geo_mentions: Vec<GeoMention>,
    /// Same mentions split into individual places
    pub geo_places: Vec<GeoMention>,
    pub freshness: FreshnessData,
    pub debug: DebugInfo,
}
