use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use feed_rs::parser;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::config::FeedConfig;
use crate::store::{article_id, Article, NewsStore, CONTENT_MAX_LEN, SUMMARY_MAX_LEN};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("feed parse error: {0}")]
    Parse(#[from] parser::ParseFeedError),
}

pub struct Fetcher {
    client: Client,
    store: Arc<NewsStore>,
    feeds: Vec<FeedConfig>,
    max_entries_per_feed: usize,
    refreshing: Arc<RwLock<bool>>,
}

impl Fetcher {
    pub fn new(store: Arc<NewsStore>, feeds: Vec<FeedConfig>, max_entries_per_feed: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Newsdesk/1.0 (RSS Aggregator)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            store,
            feeds,
            max_entries_per_feed,
            refreshing: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// Run one full fetch-all-feeds-and-merge cycle. At most one cycle
    /// runs at a time; overlapping triggers are skipped.
    pub async fn refresh_all_feeds(&self) -> anyhow::Result<()> {
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(());
            }
            *refreshing = true;
        }

        let result = self.do_refresh_all().await;

        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result
    }

    async fn do_refresh_all(&self) -> anyhow::Result<()> {
        info!("Refreshing {} feeds", self.feeds.len());

        let mut all_articles = Vec::new();
        for feed in &self.feeds {
            let articles = self.fetch_feed(feed).await;
            info!("Fetched {} articles from '{}'", articles.len(), feed.name);
            all_articles.extend(articles);
        }

        let fetched = all_articles.len();
        self.store.merge_cycle(all_articles).await;
        info!(
            "Merge cycle complete: {} articles fetched, {} retained",
            fetched,
            self.store.len().await
        );
        Ok(())
    }

    /// Fetch and normalize a single feed. Fails soft: any network or
    /// parse error is logged and yields an empty list, so one broken
    /// feed never aborts the cycle.
    pub async fn fetch_feed(&self, feed: &FeedConfig) -> Vec<Article> {
        match self.try_fetch_feed(feed).await {
            Ok(articles) => articles,
            Err(e) => {
                error!("Failed to fetch feed '{}': {}", feed.name, e);
                Vec::new()
            }
        }
    }

    async fn try_fetch_feed(&self, feed: &FeedConfig) -> Result<Vec<Article>, FetchError> {
        info!("Fetching feed: {} ({})", feed.name, feed.url);

        let response = self.client.get(&feed.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let parsed = parser::parse(&bytes[..])?;

        let articles = parsed
            .entries
            .into_iter()
            .take(self.max_entries_per_feed)
            .filter_map(|entry| {
                let article = normalize_entry(entry, &feed.name);
                if article.is_none() {
                    warn!("Skipping entry with no link in feed '{}'", feed.name);
                }
                article
            })
            .collect();

        Ok(articles)
    }
}

/// Map a raw feed entry to the canonical article shape. Missing fields
/// degrade to defaults; only an entry with no link at all is dropped.
pub fn normalize_entry(entry: feed_rs::model::Entry, source: &str) -> Option<Article> {
    let link = entry.links.first().map(|l| l.href.clone())?;
    if link.is_empty() {
        return None;
    }

    let title = entry
        .title
        .map(|t| t.content)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title".to_string());

    let summary = entry
        .summary
        .as_ref()
        .map(|s| truncate_chars(&s.content, SUMMARY_MAX_LEN))
        .unwrap_or_default();

    // Priority chain: explicit content body, then summary, then empty
    let content = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .map(|c| truncate_chars(&c, CONTENT_MAX_LEN))
        .unwrap_or_default();

    let now = Utc::now();
    let published_at = entry.published.or(entry.updated);
    let published = published_at.unwrap_or(now).to_rfc3339();

    Some(Article {
        id: article_id(&link),
        title,
        summary,
        content,
        link,
        source: source.to_string(),
        published,
        published_at,
        scraped_at: now,
    })
}

/// Truncate on a character boundary, never mid-codepoint.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Background scheduler: one immediate cycle, then a fixed-interval
/// loop. Shutdown stops the loop between cycles; an in-flight cycle is
/// allowed to finish. A failed cycle is logged and the loop continues.
pub async fn start_background_refresh(
    fetcher: Arc<Fetcher>,
    interval_minutes: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = Duration::from_secs(interval_minutes * 60);

    info!("Starting initial feed fetch");
    if let Err(e) = fetcher.refresh_all_feeds().await {
        error!("Initial feed fetch failed: {}", e);
    }

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                info!("Starting scheduled feed refresh");
                if let Err(e) = fetcher.refresh_all_feeds().await {
                    error!("Scheduled feed refresh failed: {}", e);
                }
            }
            _ = shutdown.changed() => {
                info!("Scheduler shutting down");
                break;
            }
        }
    }
}
