use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Maximum number of articles retained after a merge cycle.
pub const MAX_ARTICLES: usize = 100;

pub const SUMMARY_MAX_LEN: usize = 300;
pub const CONTENT_MAX_LEN: usize = 500;

/// Stable article id: first 8 bytes of the SHA-256 of the link.
/// Deterministic across runs and restarts, unlike a hasher with a
/// per-process random seed.
pub fn article_id(link: &str) -> u64 {
    let digest = Sha256::digest(link.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().unwrap())
}

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub link: String,
    pub source: String,
    /// Publish timestamp as reported by the feed, RFC 3339 when the feed
    /// gave us a parseable date, otherwise the ingestion time.
    pub published: String,
    /// Normalized publish timestamp used as the sort key. None when the
    /// feed provided no usable date.
    #[serde(skip)]
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
}

/// Ascending order by publish time. Articles without a parseable
/// timestamp sort before everything else, with the verbatim feed string
/// as a lexicographic tiebreaker.
fn published_cmp(a: &Article, b: &Article) -> Ordering {
    (a.published_at, &a.published).cmp(&(b.published_at, &b.published))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Published,
    Title,
    Source,
    ScrapedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Serialize)]
pub struct NewsPage {
    pub articles: Vec<Article>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub articles: Vec<Article>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_articles: usize,
    pub total_sources: usize,
    pub sources: Vec<String>,
}

/// In-memory article store shared between the scheduler (sole writer)
/// and the request handlers (readers). Readers always observe either the
/// pre- or post-cycle state; the write lock is held for the whole merge.
pub struct NewsStore {
    articles: RwLock<Vec<Article>>,
}

impl NewsStore {
    pub fn new() -> Self {
        Self {
            articles: RwLock::new(Vec::new()),
        }
    }

    /// Merge one cycle's worth of fetched articles into the store:
    /// replace existing articles by id, append the rest, then re-sort
    /// newest-first and trim to the retention window.
    pub async fn merge_cycle(&self, incoming: Vec<Article>) {
        let mut articles = self.articles.write().await;

        for article in incoming {
            match articles.iter_mut().find(|a| a.id == article.id) {
                Some(existing) => *existing = article,
                None => articles.push(article),
            }
        }

        articles.sort_by(|a, b| published_cmp(b, a));
        articles.truncate(MAX_ARTICLES);
    }

    pub async fn list(
        &self,
        sort: SortField,
        order: SortOrder,
        page: usize,
        per_page: usize,
    ) -> NewsPage {
        let articles = self.articles.read().await;

        let mut sorted: Vec<Article> = articles.clone();
        sorted.sort_by(|a, b| {
            let ord = match sort {
                SortField::Published => published_cmp(a, b),
                SortField::Title => a.title.cmp(&b.title),
                SortField::Source => a.source.cmp(&b.source),
                SortField::ScrapedAt => a.scraped_at.cmp(&b.scraped_at),
            };
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = sorted.len();
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total_pages = total.div_ceil(per_page);

        let start = (page - 1) * per_page;
        let paginated = if start < total {
            sorted[start..(start + per_page).min(total)].to_vec()
        } else {
            Vec::new()
        };

        NewsPage {
            articles: paginated,
            total,
            page,
            per_page,
            total_pages,
        }
    }

    /// Case-insensitive substring search over title and summary. An
    /// empty query matches nothing, not everything.
    pub async fn search(&self, query: &str) -> SearchResults {
        if query.is_empty() {
            return SearchResults {
                articles: Vec::new(),
                total: 0,
            };
        }

        let query = query.to_lowercase();
        let articles = self.articles.read().await;

        let matches: Vec<Article> = articles
            .iter()
            .filter(|a| {
                a.title.to_lowercase().contains(&query)
                    || a.summary.to_lowercase().contains(&query)
            })
            .cloned()
            .collect();

        let total = matches.len();
        SearchResults {
            articles: matches,
            total,
        }
    }

    /// Distinct source names, order unspecified.
    pub async fn sources(&self) -> Vec<String> {
        let articles = self.articles.read().await;
        let set: HashSet<&str> = articles.iter().map(|a| a.source.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    pub async fn stats(&self) -> Stats {
        let articles = self.articles.read().await;
        let sources: HashSet<&str> = articles.iter().map(|a| a.source.as_str()).collect();

        Stats {
            total_articles: articles.len(),
            total_sources: sources.len(),
            sources: sources.into_iter().map(String::from).collect(),
        }
    }

    pub async fn len(&self) -> usize {
        self.articles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.articles.read().await.is_empty()
    }

    /// Seed a handful of sample articles so the API has content before
    /// the first fetch cycle lands. No-op if the store already has data.
    pub async fn seed_samples(&self) {
        if !self.is_empty().await {
            return;
        }

        let now = Utc::now();
        let samples = [
            (
                "Breakthrough in Large Language Models: New Architecture Achieves Superior Performance",
                "Researchers have developed a novel transformer architecture that significantly improves efficiency and reduces computational requirements while maintaining high performance.",
                "The new model architecture introduces several innovations including sparse attention mechanisms, dynamic routing, and improved parameter efficiency. Early tests show 40% reduction in computational requirements with equivalent performance to current state-of-the-art models.",
                "https://example-ai-news.com/new-architecture",
                "AI Research Today",
            ),
            (
                "OpenAI Releases Next Generation Multimodal AI System",
                "The latest multimodal AI system can process and understand text, images, audio, and video simultaneously with unprecedented accuracy.",
                "This advancement represents a significant leap in artificial general intelligence, with applications spanning autonomous systems, content creation, and scientific research. The system demonstrates remarkable capabilities in cross-modal understanding and generation.",
                "https://example-ai-news.com/multimodal-ai",
                "AI Technology News",
            ),
            (
                "Machine Learning Model Achieves Human-Level Performance in Complex Reasoning Tasks",
                "New benchmarks show that the latest models can perform complex logical reasoning, planning, and problem-solving at human expert levels.",
                "The model was tested across diverse domains including mathematics, science, law, and medicine, consistently achieving scores comparable to human experts. This breakthrough has implications for automation across many professional fields.",
                "https://example-ai-news.com/human-level-reasoning",
                "Deep Learning Daily",
            ),
        ];

        let articles = samples
            .iter()
            .map(|(title, summary, content, link, source)| Article {
                id: article_id(link),
                title: title.to_string(),
                summary: summary.to_string(),
                content: content.to_string(),
                link: link.to_string(),
                source: source.to_string(),
                published: now.to_rfc3339(),
                published_at: Some(now),
                scraped_at: now,
            })
            .collect();

        self.merge_cycle(articles).await;
    }
}

impl Default for NewsStore {
    fn default() -> Self {
        Self::new()
    }
}
