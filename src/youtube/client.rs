use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::types::{ChannelInfo, ChannelLookup, Comment, CommentOrder, VideoInfo};
use super::VideoPlatform;
use crate::config::YouTubeConfig;
use crate::error::{Result, ScanError};
use crate::quota::{QuotaCounter, UNITS_PER_CALL};

const SERVICE: &str = "YouTube API";
const PAGE_SIZE: usize = 50;
const MAX_COMMENTS_PER_REQUEST: usize = 100;
const DESCRIPTION_CHARS: usize = 200;

pub struct YouTubeClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    quota: QuotaCounter,
}

impl YouTubeClient {
    pub fn new(config: &YouTubeConfig, quota: QuotaCounter) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            quota,
        }
    }

    pub fn quota(&self) -> &QuotaCounter {
        &self.quota
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        comments_call: bool,
    ) -> Result<T> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ScanError::MissingCredential("YOUTUBE_API_KEY"))?;

        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(endpoint, "YouTube API request");

        let response = self
            .client
            .get(&url)
            .query(&[("key", api_key)])
            .query(params)
            .send()
            .await?;

        // The API bills failed reads too.
        self.quota.charge(UNITS_PER_CALL);

        let status = response.status();
        if !status.is_success() {
            let body: ApiErrorBody = response.json().await.unwrap_or_default();
            let detail = body.error.unwrap_or_default();
            let message = detail
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            let reasons: Vec<String> = detail
                .errors
                .unwrap_or_default()
                .into_iter()
                .filter_map(|e| e.reason)
                .collect();
            let err = classify_failure(status.as_u16(), &message, &reasons, comments_call);
            warn!(endpoint, status = status.as_u16(), "YouTube API call failed: {}", err);
            return Err(err);
        }

        response
            .json()
            .await
            .map_err(|e| ScanError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message: format!("unreadable response: {}", e),
            })
    }

    async fn lookup_channel(&self, param: &str, value: &str) -> Result<Option<ChannelInfo>> {
        let response: ChannelListResponse = self
            .get(
                "channels",
                &[("part", "snippet,statistics,contentDetails"), (param, value)],
                false,
            )
            .await?;

        Ok(response
            .items
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(ChannelInfo::from))
    }
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    async fn resolve_channel(&self, lookup: ChannelLookup, value: &str) -> Result<ChannelInfo> {
        let param = match lookup {
            ChannelLookup::Id => "id",
            ChannelLookup::Handle | ChannelLookup::CustomName => "forHandle",
            ChannelLookup::Username => "forUsername",
        };

        if let Some(channel) = self.lookup_channel(param, value).await? {
            return Ok(channel);
        }

        // Legacy /c/ names are sometimes only reachable as usernames.
        if lookup == ChannelLookup::CustomName {
            if let Some(channel) = self.lookup_channel("forUsername", value).await? {
                return Ok(channel);
            }
        }

        Err(ScanError::ChannelNotFound)
    }

    async fn fetch_channel_videos(
        &self,
        uploads_playlist_id: &str,
        max_videos: usize,
    ) -> Result<Vec<VideoInfo>> {
        let mut video_ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = PAGE_SIZE.to_string();

        while video_ids.len() < max_videos {
            let mut params = vec![
                ("part", "contentDetails"),
                ("playlistId", uploads_playlist_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let page: PlaylistItemsResponse = self.get("playlistItems", &params, false).await?;
            let items = page.items.unwrap_or_default();
            if items.is_empty() {
                break;
            }

            for item in items {
                video_ids.push(item.content_details.video_id);
                if video_ids.len() >= max_videos {
                    break;
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let mut videos = Vec::with_capacity(video_ids.len());
        for batch in video_ids.chunks(PAGE_SIZE) {
            let ids = batch.join(",");
            let response: VideoListResponse = self
                .get("videos", &[("part", "snippet,statistics"), ("id", &ids)], false)
                .await?;
            videos.extend(response.items.unwrap_or_default().into_iter().map(VideoInfo::from));
        }

        videos.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        Ok(videos)
    }

    async fn fetch_video(&self, video_id: &str) -> Result<VideoInfo> {
        let response: VideoListResponse = self
            .get("videos", &[("part", "snippet,statistics"), ("id", video_id)], false)
            .await?;

        response
            .items
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(VideoInfo::from)
            .ok_or(ScanError::VideoNotFound)
    }

    async fn fetch_comments(
        &self,
        video_id: &str,
        order: CommentOrder,
        max_results: usize,
    ) -> Result<Vec<Comment>> {
        let max_results = max_results.min(MAX_COMMENTS_PER_REQUEST).to_string();
        let response: CommentThreadsResponse = self
            .get(
                "commentThreads",
                &[
                    ("part", "snippet"),
                    ("videoId", video_id),
                    ("order", order.as_param()),
                    ("maxResults", &max_results),
                    ("textFormat", "plainText"),
                ],
                true,
            )
            .await?;

        Ok(response
            .items
            .unwrap_or_default()
            .into_iter()
            .map(Comment::from)
            .collect())
    }
}

/// Map an API failure onto the named conditions callers handle specially.
pub fn classify_failure(
    status: u16,
    message: &str,
    reasons: &[String],
    comments_call: bool,
) -> ScanError {
    let lower = message.to_lowercase();
    let has_reason = |wanted: &str| reasons.iter().any(|r| r.eq_ignore_ascii_case(wanted));

    if status == 403 && (lower.contains("quota") || has_reason("quotaExceeded")) {
        return ScanError::QuotaExceeded;
    }

    if comments_call
        && (has_reason("commentsDisabled")
            || lower.contains("commentsdisabled")
            || lower.contains("commentdisabled")
            || lower.contains("disabled comments")
            || (status == 403 && lower.contains("comment")))
    {
        return ScanError::CommentsDisabled;
    }

    ScanError::Upstream {
        service: SERVICE,
        status,
        message: message.to_string(),
    }
}

fn parse_count(value: Option<&String>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize, Default)]
struct ApiErrorDetail {
    message: Option<String>,
    errors: Option<Vec<ApiErrorReason>>,
}

#[derive(Deserialize)]
struct ApiErrorReason {
    reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

impl Thumbnails {
    fn best(self) -> String {
        self.medium
            .or(self.default)
            .map(|t| t.url)
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct ChannelListResponse {
    items: Option<Vec<ChannelItem>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    id: String,
    snippet: ChannelSnippet,
    statistics: Option<ChannelStatistics>,
    content_details: Option<ChannelContentDetails>,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    title: String,
    description: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    subscriber_count: Option<String>,
    video_count: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: Option<RelatedPlaylists>,
}

#[derive(Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

impl From<ChannelItem> for ChannelInfo {
    fn from(item: ChannelItem) -> Self {
        let stats = item.statistics.unwrap_or_default();
        Self {
            channel_id: item.id,
            title: item.snippet.title,
            description: item
                .snippet
                .description
                .unwrap_or_default()
                .chars()
                .take(DESCRIPTION_CHARS)
                .collect(),
            subscriber_count: parse_count(stats.subscriber_count.as_ref()),
            video_count: parse_count(stats.video_count.as_ref()),
            thumbnail: item.snippet.thumbnails.unwrap_or_default().best(),
            uploads_playlist_id: item
                .content_details
                .and_then(|c| c.related_playlists)
                .and_then(|r| r.uploads)
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsResponse {
    items: Option<Vec<PlaylistItem>>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistItemContent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContent {
    video_id: String,
}

#[derive(Deserialize)]
struct VideoListResponse {
    items: Option<Vec<VideoItem>>,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    statistics: Option<VideoStatistics>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    published_at: Option<String>,
    channel_title: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

impl From<VideoItem> for VideoInfo {
    fn from(item: VideoItem) -> Self {
        let stats = item.statistics.unwrap_or_default();
        Self {
            video_id: item.id,
            title: item.snippet.title,
            thumbnail: item.snippet.thumbnails.unwrap_or_default().best(),
            published_at: item.snippet.published_at.unwrap_or_default(),
            view_count: parse_count(stats.view_count.as_ref()),
            like_count: parse_count(stats.like_count.as_ref()),
            comment_count: parse_count(stats.comment_count.as_ref()),
            channel_title: item.snippet.channel_title.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct CommentThreadsResponse {
    items: Option<Vec<CommentThread>>,
}

#[derive(Deserialize)]
struct CommentThread {
    id: String,
    snippet: ThreadSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    text_original: Option<String>,
    text_display: Option<String>,
    author_display_name: Option<String>,
    like_count: Option<u64>,
    published_at: Option<String>,
    updated_at: Option<String>,
}

impl From<CommentThread> for Comment {
    fn from(thread: CommentThread) -> Self {
        let snippet = thread.snippet.top_level_comment.snippet;
        Self {
            comment_id: thread.id,
            text: snippet
                .text_original
                .or(snippet.text_display)
                .unwrap_or_default(),
            author_name: snippet.author_display_name.unwrap_or_default(),
            like_count: snippet.like_count.unwrap_or(0),
            published_at: snippet.published_at.unwrap_or_default(),
            updated_at: snippet.updated_at.unwrap_or_default(),
        }
    }
}
