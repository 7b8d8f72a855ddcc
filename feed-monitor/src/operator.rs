use crate::parser::ListingParser;
use crate::traits::FetchOperator;
use crate::types::{FeedItem, FetchConfig, MonitorError, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::Client;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

/// Operator that talks to a reddit-style JSON API over HTTP.
pub struct HttpOperator {
    client: Client,
    config: FetchConfig,
    base_url: Url,
}

impl HttpOperator {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        let mut base_url = Url::parse(&config.base_url)?;
        // Url::join replaces the last segment unless the base ends in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub fn listing_url(
        &self,
        query: &str,
        sort: &str,
        after: &str,
        before: &str,
        limit: usize,
    ) -> Result<Url> {
        let mut url = self.base_url.join(&format!("r/{}/{}.json", query, sort))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &limit.to_string());
            if !before.is_empty() {
                pairs.append_pair("before", before);
            }
            if !after.is_empty() {
                pairs.append_pair("after", after);
            }
        }
        Ok(url)
    }

    pub fn by_id_url(&self, ids: &[String]) -> Result<Url> {
        Ok(self.base_url.join(&format!("by_id/{}.json", ids.join(",")))?)
    }

    async fn fetch_listing(&self, url: Url) -> Result<Vec<FeedItem>> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            // Attempts are bounded by max_retries alone.
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.fetch_once(&url).await {
                Ok(items) => return Ok(items),
                Err(e) if attempt < self.config.max_retries && is_retryable(&e) => {
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("Attempt {} failed for {}: {}, retrying in {:?}", attempt + 1, url, e, delay);
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => {
                    error!("Failed to fetch {} after {} attempts: {}", url, attempt + 1, e);
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<FeedItem>> {
        debug!("Fetching listing: {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content = response.text().await?;
        ListingParser::parse_listing(&content)
    }
}

fn is_retryable(error: &MonitorError) -> bool {
    match error {
        MonitorError::Http(_) => true,
        MonitorError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl FetchOperator for HttpOperator {
    fn operator_name(&self) -> String {
        format!("HTTP operator ({})", self.base_url)
    }

    async fn scrape(
        &self,
        query: &str,
        sort: &str,
        after: &str,
        before: &str,
        limit: usize,
    ) -> Result<Vec<FeedItem>> {
        if query.is_empty() {
            debug!("Empty query, nothing to scrape");
            return Ok(Vec::new());
        }

        let url = self.listing_url(query, sort, after, before, limit)?;
        let items = self.fetch_listing(url).await?;
        info!("Scraped {} posts from {}", items.len(), query);
        Ok(items)
    }

    async fn resolve_by_ids(&self, ids: &[String]) -> Result<Vec<FeedItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.by_id_url(ids)?;
        let items = self.fetch_listing(url).await?;
        debug!("Resolved {}/{} posts by id", items.len(), ids.len());
        Ok(items)
    }
}

/// A recorded `scrape` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeCall {
    pub query: String,
    pub sort: String,
    pub after: String,
    pub before: String,
    pub limit: usize,
}

/// Scripted operator for development and testing.
///
/// Scrapes pop scripted responses in order and return nothing once the
/// script runs out. Lookups by id answer from a set of "live" posts that the
/// caller can edit to simulate deletions and edits.
#[derive(Default)]
pub struct MockOperator {
    scrapes: Mutex<VecDeque<Result<Vec<FeedItem>>>>,
    live: RwLock<HashMap<String, FeedItem>>,
    resolve_failure: Mutex<Option<String>>,
    scrape_calls: Mutex<Vec<ScrapeCall>>,
    resolve_calls: Mutex<Vec<Vec<String>>>,
}

impl MockOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_scrape(&self, items: Vec<FeedItem>) {
        self.scrapes.lock().await.push_back(Ok(items));
    }

    pub async fn push_scrape_error(&self, message: &str) {
        self.scrapes
            .lock()
            .await
            .push_back(Err(MonitorError::General(message.to_string())));
    }

    /// Make the next `resolve_by_ids` call fail.
    pub async fn fail_next_resolve(&self, message: &str) {
        *self.resolve_failure.lock().await = Some(message.to_string());
    }

    /// Insert or replace posts that `resolve_by_ids` can find.
    pub async fn set_live(&self, items: Vec<FeedItem>) {
        let mut live = self.live.write().await;
        for item in items {
            live.insert(item.name.clone(), item);
        }
    }

    /// Simulate an upstream deletion.
    pub async fn delete_live(&self, name: &str) {
        self.live.write().await.remove(name);
    }

    pub async fn scrape_calls(&self) -> Vec<ScrapeCall> {
        self.scrape_calls.lock().await.clone()
    }

    pub async fn resolve_calls(&self) -> Vec<Vec<String>> {
        self.resolve_calls.lock().await.clone()
    }
}

#[async_trait]
impl FetchOperator for MockOperator {
    fn operator_name(&self) -> String {
        "Mock operator".to_string()
    }

    async fn scrape(
        &self,
        query: &str,
        sort: &str,
        after: &str,
        before: &str,
        limit: usize,
    ) -> Result<Vec<FeedItem>> {
        self.scrape_calls.lock().await.push(ScrapeCall {
            query: query.to_string(),
            sort: sort.to_string(),
            after: after.to_string(),
            before: before.to_string(),
            limit,
        });

        self.scrapes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn resolve_by_ids(&self, ids: &[String]) -> Result<Vec<FeedItem>> {
        self.resolve_calls.lock().await.push(ids.to_vec());

        if let Some(message) = self.resolve_failure.lock().await.take() {
            return Err(MonitorError::General(message));
        }

        let live = self.live.read().await;
        Ok(ids.iter().filter_map(|id| live.get(id).cloned()).collect())
    }
}
