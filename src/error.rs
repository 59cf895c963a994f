use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("CHANNEL_NOT_FOUND")]
    ChannelNotFound,

    #[error("VIDEO_NOT_FOUND")]
    VideoNotFound,

    #[error("COMMENTS_DISABLED")]
    CommentsDisabled,

    #[error("QUOTA_EXCEEDED")]
    QuotaExceeded,

    #[error("RATE_LIMITED")]
    RateLimited,

    #[error("NO_COMMENTS")]
    NoComments,

    #[error("Unrecognized input: {0}")]
    UnrecognizedInput(String),

    #[error("Not a channel reference: {0}")]
    NotAChannel(String),

    #[error("{0} not configured")]
    MissingCredential(&'static str),

    #[error("{service} error ({status}): {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

impl ScanError {
    /// Message shown to a person; unclassified errors fall back to their raw text.
    pub fn user_message(&self) -> String {
        match self {
            ScanError::ChannelNotFound => {
                "Channel not found. Check the URL and try again.".to_string()
            }
            ScanError::VideoNotFound => "Video not found.".to_string(),
            ScanError::CommentsDisabled => "Comments are disabled on this video.".to_string(),
            ScanError::QuotaExceeded => {
                "YouTube API quota reached. Quota resets at midnight Pacific time.".to_string()
            }
            ScanError::RateLimited => {
                "The AI provider is rate limiting requests. Try again in a moment.".to_string()
            }
            ScanError::NoComments => "No comments found on this video.".to_string(),
            ScanError::UnrecognizedInput(_) => {
                "Couldn't recognize this URL. Try a YouTube channel or video link.".to_string()
            }
            ScanError::NotAChannel(_) => "This is a video URL, not a channel URL.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ScanError::ChannelNotFound | ScanError::VideoNotFound => 404,
            ScanError::CommentsDisabled => 403,
            ScanError::QuotaExceeded | ScanError::RateLimited => 429,
            ScanError::NoComments => 422,
            ScanError::UnrecognizedInput(_) | ScanError::NotAChannel(_) => 400,
            ScanError::MissingCredential(_) => 500,
            ScanError::Upstream { .. } | ScanError::Network(_) | ScanError::MalformedResponse(_) => {
                502
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::ChannelNotFound | ScanError::VideoNotFound => 3,
            ScanError::CommentsDisabled => 4,
            ScanError::QuotaExceeded => 5,
            ScanError::RateLimited => 6,
            ScanError::NoComments => 7,
            ScanError::UnrecognizedInput(_) | ScanError::NotAChannel(_) => 2,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        ScanError::Network(err.to_string())
    }
}
