use std::time::Duration;

// Use the interfaces crate for core types
pub use interfaces::defs::FeedItem;

/// Maximum number of posts requested by a single incremental fetch.
pub const MAX_POSTS: usize = 100;

/// Number of recent fullnames kept in the tip. More than one is kept so the
/// monitor can fall back to an older cursor when the newest post is deleted.
pub const MAX_TIP_SIZE: usize = 15;

/// Delimiter for the multireddit-style subreddit query, e.g. `self+aww`.
pub const SUBREDDIT_DELIMITER: &str = "+";

/// Delimiter for the thread fullname query, e.g. `t3_abc,t3_def`.
pub const THREAD_DELIMITER: &str = ",";

/// Sort order used for incremental fetches.
pub const NEW_SORT: &str = "new";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub tip_capacity: usize,
    pub max_posts: usize,
    /// Validate the tip every this many cycles. Zero disables the schedule.
    pub repair_every_cycles: u64,
    /// Consecutive empty fetches after which the tip is considered suspect.
    pub suspicion_threshold: u32,
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            tip_capacity: MAX_TIP_SIZE,
            max_posts: MAX_POSTS,
            repair_every_cycles: 20,
            suspicion_threshold: 3,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.reddit.com".to_string(),
            user_agent: "feed-monitor/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Listing parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
