use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::state::AppState;
use crate::analysis::{scoring, AnalysisResult, CreditBalance, DraftContext, ScoreLevel};
use crate::error::{Result, ScanError};
use crate::resolver::{parse_input, ParsedInput};
use crate::youtube::{ChannelInfo, ChannelLookup, Comment, VideoInfo, VideoPlatform};

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct ChannelRequest {
    pub input: String,
}

#[derive(Serialize)]
pub struct ChannelResponse {
    pub channel: ChannelInfo,
    pub quota_used: u64,
}

pub async fn channel(
    State(state): State<AppState>,
    Json(body): Json<ChannelRequest>,
) -> Result<Json<ChannelResponse>> {
    let parsed = parse_input(&body.input);
    let (lookup, value) = match &parsed {
        ParsedInput::Unknown(raw) => return Err(ScanError::UnrecognizedInput(raw.clone())),
        ParsedInput::VideoId(id) => return Err(ScanError::NotAChannel(id.clone())),
        other => ChannelLookup::from_parsed(other)
            .ok_or_else(|| ScanError::UnrecognizedInput(body.input.trim().to_string()))?,
    };

    let channel = state.pipeline.platform().resolve_channel(lookup, value).await?;
    info!("Resolved channel {} ({})", channel.title, channel.channel_id);

    Ok(Json(ChannelResponse {
        channel,
        quota_used: state.quota.used(),
    }))
}

#[derive(Deserialize)]
pub struct VideosRequest {
    pub video_id: Option<String>,
    pub uploads_playlist_id: Option<String>,
    pub max_videos: Option<usize>,
}

#[derive(Serialize)]
pub struct VideosResponse {
    pub videos: Vec<VideoInfo>,
    pub quota_used: u64,
}

pub async fn videos(
    State(state): State<AppState>,
    Json(body): Json<VideosRequest>,
) -> Result<Json<VideosResponse>> {
    let platform = state.pipeline.platform();
    let videos = match (body.video_id, body.uploads_playlist_id) {
        (Some(video_id), _) => vec![platform.fetch_video(&video_id).await?],
        (None, Some(playlist_id)) => {
            let max_videos = body.max_videos.unwrap_or(state.max_videos);
            platform.fetch_channel_videos(&playlist_id, max_videos).await?
        }
        (None, None) => {
            return Err(ScanError::UnrecognizedInput(
                "video_id or uploads_playlist_id is required".to_string(),
            ))
        }
    };

    Ok(Json(VideosResponse {
        videos,
        quota_used: state.quota.used(),
    }))
}

#[derive(Deserialize)]
pub struct CommentsRequest {
    pub video_id: String,
}

#[derive(Serialize)]
pub struct CommentsResponse {
    pub comments: Vec<Comment>,
    pub relevance_count: usize,
    pub time_count: usize,
    pub quota_used: u64,
}

pub async fn comments(
    State(state): State<AppState>,
    Json(body): Json<CommentsRequest>,
) -> Result<Json<CommentsResponse>> {
    let fetched = state.pipeline.fetch_comments(&body.video_id).await?;
    Ok(Json(CommentsResponse {
        comments: fetched.comments,
        relevance_count: fetched.relevance_count,
        time_count: fetched.time_count,
        quota_used: state.quota.used(),
    }))
}

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub video_id: String,
    /// Taken from the video list when known; otherwise looked up
    pub view_count: Option<u64>,
    pub request_id: Option<String>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub score_level: ScoreLevel,
    pub quota_used: u64,
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    let outcome = match body.request_id.as_deref() {
        Some(request_id) => {
            let run = state.progress.start_run(request_id);
            state
                .pipeline
                .analyze_video(&body.video_id, body.view_count, run.sender())
                .await
        }
        None => {
            state
                .pipeline
                .analyze_video(&body.video_id, body.view_count, &())
                .await
        }
    };
    let result = outcome?;

    Ok(Json(AnalyzeResponse {
        score_level: scoring::score_level(result.raw_score),
        quota_used: state.quota.used(),
        result,
    }))
}

pub async fn generate_comment(
    State(state): State<AppState>,
    Json(context): Json<DraftContext>,
) -> Result<Json<serde_json::Value>> {
    let comment = state
        .pipeline
        .classifier()
        .draft_pinned_comment(&context)
        .await?;
    Ok(Json(json!({ "comment": comment })))
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub youtube_quota_used: u64,
    pub open_router: CreditBalance,
}

pub async fn balance(State(state): State<AppState>) -> Json<BalanceResponse> {
    Json(BalanceResponse {
        youtube_quota_used: state.quota.used(),
        open_router: state.openrouter.credits().await,
    })
}

pub async fn reset_quota(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.quota.reset();
    info!("YouTube quota counter reset");
    Json(json!({ "youtube_quota_used": state.quota.used() }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
