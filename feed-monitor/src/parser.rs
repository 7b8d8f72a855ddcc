use crate::types::{FeedItem, MonitorError, Result};
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    #[serde(default)]
    kind: String,
    data: LinkData,
}

#[derive(Debug, Deserialize)]
struct LinkData {
    name: Option<String>,
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    author: Option<String>,
    subreddit: Option<String>,
    permalink: Option<String>,
    url: Option<String>,
    selftext: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    created_utc: Option<f64>,
}

pub struct ListingParser;

impl ListingParser {
    /// Decode a listing response into posts, preserving the listing order.
    pub fn parse_listing(content: &str) -> Result<Vec<FeedItem>> {
        debug!("Parsing listing ({} bytes)", content.len());

        let listing: Listing = serde_json::from_str(content)
            .map_err(|e| MonitorError::Parse(format!("Failed to parse listing: {}", e)))?;

        let items = listing
            .data
            .children
            .into_iter()
            .filter_map(Self::parse_thing)
            .collect::<Vec<_>>();

        debug!("Parsed listing with {} posts", items.len());
        Ok(items)
    }

    fn parse_thing(thing: Thing) -> Option<FeedItem> {
        let data = thing.data;
        let name = match data.name {
            Some(name) if !name.is_empty() => name,
            _ => {
                debug!("Skipping {} child without a fullname", thing.kind);
                return None;
            }
        };

        let created_utc = data
            .created_utc
            .and_then(|secs| DateTime::from_timestamp(secs.trunc() as i64, 0));

        Some(FeedItem {
            name,
            id: data.id,
            title: data.title,
            author: data.author,
            subreddit: data.subreddit,
            permalink: data.permalink,
            url: data.url,
            selftext: data.selftext,
            score: data.score,
            num_comments: data.num_comments,
            created_utc,
        })
    }
}
