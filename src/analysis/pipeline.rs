use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::chat::ChatModel;
use super::classifier::{Classifier, IndexedComment};
use super::scoring;
use super::types::{AnalysisResult, CategoryCounts, DebugInfo};
use crate::error::{Result, ScanError};
use crate::youtube::{Comment, CommentOrder, VideoPlatform};

/// Progress of one analysis run, in the order a run passes through them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AnalysisStage {
    Fetching,
    Analyzing {
        comments_fetched: usize,
        relevance_count: usize,
        time_count: usize,
    },
    Done,
    Error {
        message: String,
    },
}

pub trait ProgressObserver: Send + Sync {
    fn on_stage(&self, stage: &AnalysisStage);
}

impl ProgressObserver for () {
    fn on_stage(&self, _stage: &AnalysisStage) {}
}

impl ProgressObserver for broadcast::Sender<AnalysisStage> {
    fn on_stage(&self, stage: &AnalysisStage) {
        // Nobody listening is fine
        let _ = self.send(stage.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedComments {
    pub comments: Vec<Comment>,
    pub relevance_count: usize,
    pub time_count: usize,
}

/// Relevance batch first, then the time batch, keeping the first copy of each id.
pub fn merge_unique(relevance: Vec<Comment>, time: Vec<Comment>) -> Vec<Comment> {
    let mut seen = HashSet::new();
    relevance
        .into_iter()
        .chain(time)
        .filter(|comment| seen.insert(comment.comment_id.clone()))
        .collect()
}

pub struct Pipeline<P, M> {
    platform: P,
    classifier: Classifier<M>,
    comments_per_order: usize,
}

impl<P: VideoPlatform, M: ChatModel> Pipeline<P, M> {
    pub fn new(platform: P, classifier: Classifier<M>, comments_per_order: usize) -> Self {
        Self {
            platform,
            classifier,
            comments_per_order,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn classifier(&self) -> &Classifier<M> {
        &self.classifier
    }

    /// Both orderings are requested concurrently; either failing fails the fetch.
    pub async fn fetch_comments(&self, video_id: &str) -> Result<FetchedComments> {
        let (relevance, time) = tokio::try_join!(
            self.platform
                .fetch_comments(video_id, CommentOrder::Relevance, self.comments_per_order),
            self.platform
                .fetch_comments(video_id, CommentOrder::Time, self.comments_per_order),
        )?;

        let relevance_count = relevance.len();
        let time_count = time.len();
        let comments = merge_unique(relevance, time);
        info!(
            "Fetched {} unique comments for {} ({} relevance, {} time)",
            comments.len(),
            video_id,
            relevance_count,
            time_count
        );

        Ok(FetchedComments {
            comments,
            relevance_count,
            time_count,
        })
    }

    /// Runs fetch, classification and scoring for one video. The observer sees
    /// every stage, ending with either `Done` or `Error`.
    pub async fn analyze(
        &self,
        video_id: &str,
        view_count: u64,
        observer: &dyn ProgressObserver,
    ) -> Result<AnalysisResult> {
        self.analyze_video(video_id, Some(view_count), observer).await
    }

    /// Like [`Pipeline::analyze`], but looks the video up for its view count
    /// when none is given. The lookup is part of the fetching stage, so a
    /// failed lookup still ends with `Error`.
    pub async fn analyze_video(
        &self,
        video_id: &str,
        view_count: Option<u64>,
        observer: &dyn ProgressObserver,
    ) -> Result<AnalysisResult> {
        let outcome = self.run(video_id, view_count, observer).await;
        match &outcome {
            Ok(result) => {
                info!(
                    video_id,
                    raw_score = result.raw_score,
                    density = result.density_score,
                    "Analysis done"
                );
                observer.on_stage(&AnalysisStage::Done);
            }
            Err(e) => {
                error!(video_id, "Analysis failed: {}", e);
                observer.on_stage(&AnalysisStage::Error {
                    message: e.user_message(),
                });
            }
        }
        outcome
    }

    async fn run(
        &self,
        video_id: &str,
        view_count: Option<u64>,
        observer: &dyn ProgressObserver,
    ) -> Result<AnalysisResult> {
        observer.on_stage(&AnalysisStage::Fetching);
        let view_count = match view_count {
            Some(views) => views,
            None => self.platform.fetch_video(video_id).await?.view_count,
        };
        let fetched = self.fetch_comments(video_id).await?;
        if fetched.comments.is_empty() {
            return Err(ScanError::NoComments);
        }

        observer.on_stage(&AnalysisStage::Analyzing {
            comments_fetched: fetched.comments.len(),
            relevance_count: fetched.relevance_count,
            time_count: fetched.time_count,
        });

        let started = Instant::now();
        let classifications = {
            let batch: Vec<IndexedComment<'_>> = fetched
                .comments
                .iter()
                .enumerate()
                .map(|(index, comment)| IndexedComment {
                    index,
                    text: &comment.text,
                })
                .collect();
            self.classifier.classify(&batch).await?
        };
        let analysis_time_ms = started.elapsed().as_millis() as u64;

        let category_counts = CategoryCounts::from_classifications(&classifications);
        let score = scoring::conversion_score(&category_counts, view_count);
        let intent_scores: Vec<u8> = classifications.iter().map(|c| c.intent_score).collect();
        let geo_mentions =
            scoring::geo_mentions(classifications.iter().map(|c| c.location.as_deref()));
        let geo_places = scoring::split_geo_mentions(&geo_mentions);
        let freshness = {
            let timestamps: Vec<&str> = fetched
                .comments
                .iter()
                .map(|c| c.published_at.as_str())
                .collect();
            scoring::freshness(&timestamps)
        };

        let debug = DebugInfo {
            relevance_count: fetched.relevance_count,
            time_count: fetched.time_count,
            unique_count: fetched.comments.len(),
            analysis_time_ms,
            total_characters: fetched.comments.iter().map(|c| c.text.chars().count()).sum(),
        };

        Ok(AnalysisResult {
            video_id: video_id.to_string(),
            comments: fetched.comments,
            classifications,
            category_counts,
            raw_score: score.raw_score,
            density_score: score.density_score,
            average_intent_score: scoring::average_intent_score(&intent_scores),
            geo_mentions,
            geo_places,
            freshness,
            debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str) -> Comment {
        Comment {
            comment_id: id.to_string(),
            text: format!("text {}", id),
            author_name: "viewer".to_string(),
            like_count: 0,
            published_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn ids(comments: &[Comment]) -> Vec<&str> {
        comments.iter().map(|c| c.comment_id.as_str()).collect()
    }

    #[test]
    fn merge_keeps_relevance_order_then_new_time_comments() {
        let merged = merge_unique(
            vec![comment("a"), comment("b"), comment("c")],
            vec![comment("d"), comment("b"), comment("e"), comment("a")],
        );
        assert_eq!(ids(&merged), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn merge_drops_repeats_inside_a_batch() {
        let merged = merge_unique(vec![comment("a"), comment("a")], vec![]);
        assert_eq!(ids(&merged), vec!["a"]);
    }

    #[test]
    fn stages_serialize_with_a_tag() {
        let json = serde_json::to_value(AnalysisStage::Analyzing {
            comments_fetched: 3,
            relevance_count: 2,
            time_count: 2,
        })
        .unwrap();
        assert_eq!(json["stage"], "analyzing");
        assert_eq!(json["comments_fetched"], 3);

        let json = serde_json::to_value(AnalysisStage::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json["stage"], "error");
    }

    #[test]
    fn broadcast_observer_forwards_stages() {
        let (tx, mut rx) = broadcast::channel(4);
        tx.on_stage(&AnalysisStage::Fetching);
        assert_eq!(rx.try_recv().unwrap(), AnalysisStage::Fetching);
    }
}
