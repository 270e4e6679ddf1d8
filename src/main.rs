use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, Router},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comment_service::{
    config::Config,
    routes,
    services::{CommentService, Database, LocationService},
    state::AppState,
    utils::{cache::CacheService, middleware as request_middleware, rate_limit::RateLimiter},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "comment_service=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting comment service...");

    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化数据库连接
    let db = Arc::new(Database::connect(&config).await?);
    db.verify_connection().await?;
    db.ensure_schema().await?;
    info!("Database connection established successfully");

    // 初始化缓存（Redis不可达时整体降级，服务照常启动）
    let cache = CacheService::connect(config.redis_url.as_deref()).await;
    if cache.is_enabled() {
        info!("Cache layer enabled");
    } else {
        warn!("Cache layer disabled, running without redis");
    }

    // 初始化各服务
    let rate_limiter = RateLimiter::new(&cache, config.rate_limit_enabled);
    let location_service = LocationService::new(&config, cache.clone())?;
    let comment_service =
        CommentService::new(db.clone(), cache.clone(), location_service, &config);

    // 创建应用状态
    let app_state = Arc::new(AppState {
        config: config.clone(),
        db,
        cache,
        rate_limiter,
        comment_service,
    });

    // 配置 CORS
    let origins = config
        .cors_allowed_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(origins);

    // 构建应用路由
    let app = Router::new()
        .route("/", get(root))
        .nest("/api/comments", routes::comments::router())
        .nest("/api/stats", routes::stats::router())
        .route("/api/health", get(routes::health::health_check))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            request_middleware::rate_limit_middleware,
        ))
        .layer(middleware::from_fn(
            request_middleware::request_context_middleware,
        ))
        .layer(middleware::from_fn(
            request_middleware::security_headers_middleware,
        ))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // 启动服务器
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "comment-service",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
