use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single post as observed in a monitored feed.
///
/// `name` is the fullname (e.g. `t3_abc123`) and is the only field the
/// monitor relies on; everything else is carried through to consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub name: String,
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub permalink: Option<String>,
    pub url: Option<String>,
    pub selftext: Option<String>,
    pub score: i64,
    pub num_comments: u64,
    pub created_utc: Option<DateTime<Utc>>,
}

impl FeedItem {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let id = name
            .split_once('_')
            .map(|(_, id)| id.to_owned())
            .unwrap_or_else(|| name.clone());
        Self {
            name,
            id,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    pub fn with_num_comments(mut self, num_comments: u64) -> Self {
        self.num_comments = num_comments;
        self
    }
}

// Object style note:
// Feed sources are identified purely by name. A broad source is a community
// name (`news`), a specific item is a post fullname (`t3_abc123`). Nothing in
// this crate performs I/O; transports live with the monitor.
