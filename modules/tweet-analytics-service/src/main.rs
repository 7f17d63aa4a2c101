//! Tweet Analytics Service — read-only HTTP API over the imported tweets table.
//!
//! Default: http://127.0.0.1:9103/

use std::net::SocketAddr;
use std::sync::Arc;
use tweet_analytics_service::config::Config;
use tweet_analytics_service::db::Db;
use tweet_analytics_service::rate_limit::RateLimiter;
use tweet_analytics_service::routes::{self, AppState};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    log::info!(
        "Opening database at: {} (pool size {})",
        config.database_url,
        config.pool_size
    );
    let db = Db::open_with(&config).expect("Failed to open database");
    match db.count_tweets() {
        Ok(n) => log::info!("{} tweets available", n),
        Err(e) => log::warn!("Could not count tweets: {}", e),
    }

    let state = Arc::new(AppState::new(db));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
    log::info!(
        "Rate limit: {} requests per minute per client",
        config.rate_limit_per_minute
    );

    let cors = tower_http::cors::CorsLayer::permissive();
    let app = routes::router(state, limiter).layer(cors);

    let addr = config.listen_addr();
    log::info!("Tweet Analytics Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
