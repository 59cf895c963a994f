use std::sync::Arc;
use std::time::Duration;

use super::progress::ProgressRegistry;
use crate::analysis::{ChatModel, OpenRouterClient, Pipeline};
use crate::quota::QuotaCounter;
use crate::youtube::VideoPlatform;

pub type SharedPipeline = Pipeline<Arc<dyn VideoPlatform>, Arc<dyn ChatModel>>;

/// How long a stage stream waits for its run to report anything.
const UNCLAIMED_STREAM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SharedPipeline>,
    pub openrouter: Arc<OpenRouterClient>,
    pub quota: QuotaCounter,
    pub max_videos: usize,
    /// Stage channels for runs a client is watching
    pub progress: ProgressRegistry,
    pub unclaimed_stream_timeout: Duration,
}

impl AppState {
    pub fn new(
        pipeline: SharedPipeline,
        openrouter: Arc<OpenRouterClient>,
        quota: QuotaCounter,
        max_videos: usize,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            openrouter,
            quota,
            max_videos,
            progress: ProgressRegistry::new(),
            unclaimed_stream_timeout: UNCLAIMED_STREAM_TIMEOUT,
        }
    }

    pub fn with_unclaimed_stream_timeout(mut self, timeout: Duration) -> Self {
        self.unclaimed_stream_timeout = timeout;
        self
    }
}
