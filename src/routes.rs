use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::fetcher::Fetcher;
use crate::store::{NewsPage, NewsStore, SearchResults, SortField, SortOrder, Stats};

pub struct AppState {
    pub store: Arc<NewsStore>,
    pub fetcher: Arc<Fetcher>,
}

/// Build the API router. CORS is open to all origins; the API is
/// read-only and unauthenticated.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/news", get(get_news))
        .route("/api/news/search", get(search_news))
        .route("/api/sources", get(get_sources))
        .route("/api/stats", get(get_stats))
        .route("/api/refresh", post(refresh))
        .route("/api/refresh/status", get(refresh_status))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Internal failures surface uniformly as HTTP 500 with a JSON error body.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshStatus {
    pub refreshing: bool,
}

// Route handlers
pub async fn get_news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Result<Json<NewsPage>, AppError> {
    let page = state
        .store
        .list(query.sort, query.order, query.page, query.per_page)
        .await;
    Ok(Json(page))
}

pub async fn search_news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults>, AppError> {
    let results = state.store.search(&query.q).await;
    Ok(Json(results))
}

pub async fn get_sources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SourcesResponse>, AppError> {
    let sources = state.store.sources().await;
    Ok(Json(SourcesResponse { sources }))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<Stats>, AppError> {
    let stats = state.store.stats().await;
    Ok(Json(stats))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshStatus>, AppError> {
    // Run the refresh in the background; the response returns immediately
    let fetcher = state.fetcher.clone();
    tokio::spawn(async move {
        let _ = fetcher.refresh_all_feeds().await;
    });

    Ok(Json(RefreshStatus { refreshing: true }))
}

pub async fn refresh_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshStatus>, AppError> {
    let refreshing = state.fetcher.is_refreshing().await;
    Ok(Json(RefreshStatus { refreshing }))
}

pub async fn health() -> impl IntoResponse {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{article_id, Article};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn create_test_app() -> (Router, Arc<NewsStore>) {
        let store = Arc::new(NewsStore::new());
        let fetcher = Arc::new(Fetcher::new(store.clone(), Vec::new(), 10));
        let state = Arc::new(AppState {
            store: store.clone(),
            fetcher,
        });
        (app(state), store)
    }

    async fn seed_articles(store: &NewsStore, count: usize) {
        let articles = (0..count)
            .map(|i| {
                let published_at = Utc::now() - Duration::hours(i as i64);
                let link = format!("https://example.com/article/{}", i);
                Article {
                    id: article_id(&link),
                    title: format!("Article {}", i),
                    summary: format!("Summary {}", i),
                    content: String::new(),
                    link,
                    source: format!("Source {}", i % 3),
                    published: published_at.to_rfc3339(),
                    published_at: Some(published_at),
                    scraped_at: Utc::now(),
                }
            })
            .collect();
        store.merge_cycle(articles).await;
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let (app, _store) = create_test_app();

            let response = app
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"OK");
        }
    }

    mod news_tests {
        use super::*;

        #[tokio::test]
        async fn test_empty_store() {
            let (app, _store) = create_test_app();

            let (status, json) = get_json(app, "/api/news").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["total"], 0);
            assert_eq!(json["page"], 1);
            assert_eq!(json["per_page"], 20);
            assert_eq!(json["total_pages"], 0);
            assert!(json["articles"].as_array().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_default_pagination() {
            let (app, store) = create_test_app();
            seed_articles(&store, 50).await;

            let (status, json) = get_json(app, "/api/news").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["total"], 50);
            assert_eq!(json["articles"].as_array().unwrap().len(), 20);
            assert_eq!(json["total_pages"], 3);
        }

        #[tokio::test]
        async fn test_second_page_returns_items_11_to_20() {
            let (app, store) = create_test_app();
            seed_articles(&store, 30).await;

            let (status, json) = get_json(app, "/api/news?page=2&per_page=10").await;

            assert_eq!(status, StatusCode::OK);
            let articles = json["articles"].as_array().unwrap();
            assert_eq!(articles.len(), 10);
            // Descending by published: page 2 starts at the 11th newest
            assert_eq!(articles[0]["title"], "Article 10");
            assert_eq!(articles[9]["title"], "Article 19");
            assert_eq!(json["total_pages"], 3);
        }

        #[tokio::test]
        async fn test_ascending_order() {
            let (app, store) = create_test_app();
            seed_articles(&store, 5).await;

            let (_, json) = get_json(app, "/api/news?order=asc").await;

            let articles = json["articles"].as_array().unwrap();
            assert_eq!(articles[0]["title"], "Article 4"); // Oldest first
        }

        #[tokio::test]
        async fn test_sort_by_title() {
            let (app, store) = create_test_app();
            seed_articles(&store, 3).await;

            let (_, json) = get_json(app, "/api/news?sort=title&order=asc").await;

            let articles = json["articles"].as_array().unwrap();
            assert_eq!(articles[0]["title"], "Article 0");
            assert_eq!(articles[2]["title"], "Article 2");
        }

        #[tokio::test]
        async fn test_invalid_sort_field_rejected() {
            let (app, store) = create_test_app();
            seed_articles(&store, 3).await;

            let (status, _) = get_json(app, "/api/news?sort=bogus").await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn test_article_json_shape() {
            let (app, store) = create_test_app();
            seed_articles(&store, 1).await;

            let (_, json) = get_json(app, "/api/news").await;

            let article = &json["articles"][0];
            assert!(article["id"].is_u64());
            assert!(article["title"].is_string());
            assert!(article["summary"].is_string());
            assert!(article["content"].is_string());
            assert!(article["link"].is_string());
            assert!(article["source"].is_string());
            assert!(article["published"].is_string());
            assert!(article["scraped_at"].is_string());
        }
    }

    mod search_tests {
        use super::*;

        #[tokio::test]
        async fn test_empty_query_returns_empty_set() {
            let (app, store) = create_test_app();
            seed_articles(&store, 10).await;

            let (status, json) = get_json(app, "/api/news/search?q=").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["total"], 0);
            assert!(json["articles"].as_array().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_missing_query_returns_empty_set() {
            let (app, store) = create_test_app();
            seed_articles(&store, 10).await;

            let (status, json) = get_json(app, "/api/news/search").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["total"], 0);
        }

        #[tokio::test]
        async fn test_search_finds_single_match() {
            let (app, store) = create_test_app();
            store.seed_samples().await;

            let (status, json) = get_json(app, "/api/news/search?q=openai").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["total"], 1);
            assert_eq!(
                json["articles"][0]["title"],
                "OpenAI Releases Next Generation Multimodal AI System"
            );
        }
    }

    mod sources_tests {
        use super::*;

        #[tokio::test]
        async fn test_sources_lists_distinct_names() {
            let (app, store) = create_test_app();
            seed_articles(&store, 9).await; // Sources cycle through 3 names

            let (status, json) = get_json(app, "/api/sources").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["sources"].as_array().unwrap().len(), 3);
        }

        #[tokio::test]
        async fn test_sources_empty_store() {
            let (app, _store) = create_test_app();

            let (status, json) = get_json(app, "/api/sources").await;

            assert_eq!(status, StatusCode::OK);
            assert!(json["sources"].as_array().unwrap().is_empty());
        }
    }

    mod stats_tests {
        use super::*;

        #[tokio::test]
        async fn test_stats_shape() {
            let (app, store) = create_test_app();
            seed_articles(&store, 9).await;

            let (status, json) = get_json(app, "/api/stats").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["total_articles"], 9);
            assert_eq!(json["total_sources"], 3);
            assert_eq!(json["sources"].as_array().unwrap().len(), 3);
        }
    }

    mod refresh_tests {
        use super::*;

        #[tokio::test]
        async fn test_refresh_returns_immediately() {
            let (app, _store) = create_test_app();

            let response = app
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/refresh")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            let json: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["refreshing"], true);
        }

        #[tokio::test]
        async fn test_refresh_status_endpoint() {
            let (app, _store) = create_test_app();

            let (status, json) = get_json(app, "/api/refresh/status").await;

            assert_eq!(status, StatusCode::OK);
            assert!(json["refreshing"].is_boolean());
        }
    }

    mod query_struct_tests {
        use super::*;

        #[test]
        fn test_news_query_defaults() {
            let query: NewsQuery = serde_urlencoded::from_str("").unwrap();
            assert_eq!(query.page, 1);
            assert_eq!(query.per_page, 20);
            assert_eq!(query.sort, SortField::Published);
            assert_eq!(query.order, SortOrder::Desc);
        }

        #[test]
        fn test_news_query_parses_all_fields() {
            let query: NewsQuery =
                serde_urlencoded::from_str("page=3&per_page=5&sort=source&order=asc").unwrap();
            assert_eq!(query.page, 3);
            assert_eq!(query.per_page, 5);
            assert_eq!(query.sort, SortField::Source);
            assert_eq!(query.order, SortOrder::Asc);
        }

        #[test]
        fn test_search_query_default() {
            let query: SearchQuery = serde_urlencoded::from_str("").unwrap();
            assert_eq!(query.q, "");
        }
    }
}
