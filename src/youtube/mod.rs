pub mod client;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::resolver::ParsedInput;

pub use client::YouTubeClient;
pub use types::{ChannelInfo, ChannelLookup, Comment, CommentOrder, VideoInfo};

/// Video metadata provider the pipeline reads from.
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    async fn resolve_channel(&self, lookup: ChannelLookup, value: &str) -> Result<ChannelInfo>;

    /// Uploads of a channel, most viewed first.
    async fn fetch_channel_videos(
        &self,
        uploads_playlist_id: &str,
        max_videos: usize,
    ) -> Result<Vec<VideoInfo>>;

    async fn fetch_video(&self, video_id: &str) -> Result<VideoInfo>;

    async fn fetch_comments(
        &self,
        video_id: &str,
        order: CommentOrder,
        max_results: usize,
    ) -> Result<Vec<Comment>>;
}

#[async_trait]
impl<T: VideoPlatform + ?Sized> VideoPlatform for Arc<T> {
    async fn resolve_channel(&self, lookup: ChannelLookup, value: &str) -> Result<ChannelInfo> {
        (**self).resolve_channel(lookup, value).await
    }

    async fn fetch_channel_videos(
        &self,
        uploads_playlist_id: &str,
        max_videos: usize,
    ) -> Result<Vec<VideoInfo>> {
        (**self).fetch_channel_videos(uploads_playlist_id, max_videos).await
    }

    async fn fetch_video(&self, video_id: &str) -> Result<VideoInfo> {
        (**self).fetch_video(video_id).await
    }

    async fn fetch_comments(
        &self,
        video_id: &str,
        order: CommentOrder,
        max_results: usize,
    ) -> Result<Vec<Comment>> {
        (**self).fetch_comments(video_id, order, max_results).await
    }
}

impl ChannelLookup {
    pub fn from_parsed(parsed: &ParsedInput) -> Option<(ChannelLookup, &str)> {
        match parsed {
            ParsedInput::ChannelId(v) => Some((ChannelLookup::Id, v)),
            ParsedInput::Handle(v) => Some((ChannelLookup::Handle, v)),
            ParsedInput::Username(v) => Some((ChannelLookup::Username, v)),
            ParsedInput::CustomName(v) => Some((ChannelLookup::CustomName, v)),
            ParsedInput::VideoId(_) | ParsedInput::Unknown(_) => None,
        }
    }
}
