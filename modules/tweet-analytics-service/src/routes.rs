//! Axum route handlers for the tweet analytics HTTP API.

use crate::analytics::{self, TweetStatsRequest};
use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::filtering::DataFilter;
use crate::rate_limit::{self, RateLimiter};
use crate::visualization::{DistributionRequest, HeatmapRequest, TrendRequest};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::middleware;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tweet_analytics_types::*;

pub struct AppState {
    pub db: Db,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            start_time: Instant::now(),
        }
    }
}

/// Status is open; every query route sits behind the per-client limiter.
pub fn router(state: Arc<AppState>, limiter: Arc<RateLimiter>) -> Router {
    let limited = Router::new()
        // Analytics
        .route("/analytics/users/stats", get(users_stats))
        .route("/analytics/stats", get(tweet_stats))
        // Filtering
        .route("/data_filtering/", post(data_filtering))
        // Visualization
        .route("/visualization/trends", get(trends))
        .route("/visualization/distribution", get(distribution))
        .route("/visualization/heatmap", get(heatmap))
        .route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::limit_requests,
        ));

    Router::new()
        .route("/", get(status))
        .merge(limited)
        .with_state(state)
}

/// Run a store query on the blocking pool with its own pooled connection.
async fn run_blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Db) -> ApiResult<T> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

// GET /
pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<ServiceStatus>> {
    let total_tweets = run_blocking(&state, |db| Ok(db.count_tweets()?)).await?;
    Ok(Json(ServiceStatus {
        running: true,
        uptime_secs: state.start_time.elapsed().as_secs(),
        total_tweets,
    }))
}

// =====================================================
// Analytics Endpoints
// =====================================================

// GET /analytics/users/stats
pub async fn users_stats(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<CountedPage<AuthorTweetCount>>> {
    let Query(q) = query?;
    let page = run_blocking(&state, move |db| db.author_ranking(&q)).await?;
    Ok(Json(page))
}

// GET /analytics/stats
pub async fn tweet_stats(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TweetStatsQuery>, QueryRejection>,
) -> ApiResult<Json<CountedPage<DailyTweetCount>>> {
    let Query(q) = query?;
    let req = TweetStatsRequest::from_query(&q, analytics::today())?;
    let page = run_blocking(&state, move |db| db.daily_tweet_counts(&req)).await?;
    Ok(Json(page))
}

// =====================================================
// Filtering Endpoint
// =====================================================

// POST /data_filtering/
pub async fn data_filtering(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PageQuery>, QueryRejection>,
    body: Result<Json<DataFilterRequest>, JsonRejection>,
) -> ApiResult<Json<FilteredTweets>> {
    let Query(page) = query?;
    let Json(body) = body?;
    let filter = DataFilter::from_request(&body, &page)?;
    let result = run_blocking(&state, move |db| db.filter_tweets(&filter)).await?;
    Ok(Json(result))
}

// =====================================================
// Visualization Endpoints
// =====================================================

// GET /visualization/trends
pub async fn trends(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TrendQuery>, QueryRejection>,
) -> ApiResult<Json<VisualizationPage<TrendPoint>>> {
    let Query(q) = query?;
    let req = TrendRequest::from_query(&q)?;
    let page = run_blocking(&state, move |db| db.tweet_trends(&req)).await?;
    Ok(Json(page))
}

// GET /visualization/distribution
pub async fn distribution(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DistributionQuery>, QueryRejection>,
) -> ApiResult<Json<VisualizationPage<DistributionBucket>>> {
    let Query(q) = query?;
    let req = DistributionRequest::from_query(&q)?;
    let page = run_blocking(&state, move |db| db.tweet_distribution(&req))
        .await
        .map_err(|e| match e {
            ApiError::Internal(msg) => {
                ApiError::Internal(format!("distribution query failed: {}", msg))
            }
            other => other,
        })?;
    Ok(Json(page))
}

// GET /visualization/heatmap
pub async fn heatmap(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HeatmapQuery>, QueryRejection>,
) -> ApiResult<Json<Heatmap>> {
    let Query(q) = query?;
    let req = HeatmapRequest::from_query(&q)?;
    let grid = run_blocking(&state, move |db| db.tweet_heatmap(&req)).await?;
    Ok(Json(grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::net::SocketAddr;
    use tweet_analytics_types::Level;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(seeded(&[
            with_levels(tweet(1, "a", "2023-01-01 09:00:00"), Some(Level::High), None),
            with_levels(tweet(2, "a", "2023-01-02 09:00:00"), Some(Level::Low), None),
            with_levels(tweet(3, "b", "2023-01-02 10:00:00"), None, Some(Level::High)),
        ])))
    }

    fn ok<T>(result: ApiResult<T>) -> T {
        match result {
            Ok(v) => v,
            Err(e) => panic!("handler failed: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_status_counts_tweets() {
        let Json(status) = ok(status(State(state())).await);
        assert!(status.running);
        assert_eq!(status.total_tweets, 3);
    }

    #[tokio::test]
    async fn test_tweet_stats_threatening() {
        let q = TweetStatsQuery {
            start_date: Some("2023-01-01".into()),
            end_date: Some("2023-01-02".into()),
            criteria: Some("threatening".into()),
            ..Default::default()
        };
        let Json(page) = ok(tweet_stats(State(state()), Ok(Query(q))).await);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].date, "2023-01-01");
    }

    #[tokio::test]
    async fn test_data_filtering_body() {
        let body = DataFilterRequest {
            day: Some(2),
            content_type: Some("hateful".into()),
            ..Default::default()
        };
        let Json(result) = ok(data_filtering(
            State(state()),
            Ok(Query(PageQuery::default())),
            Ok(Json(body)),
        )
        .await);
        assert_eq!(result.total_tweets, 1);
        assert_eq!(result.tweets[0].id, 3);
    }

    #[tokio::test]
    async fn test_invalid_metric_is_422() {
        let q = TrendQuery {
            metric: "not_a_column".into(),
            time_interval: "day".into(),
            ..Default::default()
        };
        let err = trends(State(state()), Ok(Query(q))).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_heatmap_handler() {
        let q = HeatmapQuery {
            start_date: "2023-01-01".into(),
            end_date: "2023-01-31".into(),
            threat_level: None,
        };
        let Json(grid) = ok(heatmap(State(state()), Ok(Query(q))).await);
        assert_eq!(grid.cells[0][0], 1);
        assert_eq!(grid.cells[0][1], 1);
        assert_eq!(grid.total(), 2);
    }

    async fn serve(limit: u32) -> SocketAddr {
        let app = router(state(), Arc::new(RateLimiter::new(limit)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_http_errors_and_rate_limit() {
        let addr = serve(2).await;
        let client = reqwest::Client::new();
        let url = |path: &str| format!("http://{}{}", addr, path);

        let resp = client
            .get(url("/visualization/distribution?metric=lang&category=__dict__"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 422);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.field.as_deref(), Some("category"));

        let resp = client
            .post(url("/data_filtering/?page=1&page_size=5"))
            .json(&serde_json::json!({ "year": 2023 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let result: FilteredTweets = resp.json().await.unwrap();
        assert_eq!(result.total_tweets, 3);

        let resp = client
            .get(url("/analytics/users/stats"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 429);
        let body: ErrorBody = resp.json().await.unwrap();
        assert!(body.retry_after_secs.is_some());

        // Status is not rate limited
        let resp = client.get(url("/")).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }
}
