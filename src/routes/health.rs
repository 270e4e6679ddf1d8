use crate::{models::comment::HealthCheck, state::AppState};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;

/// 健康检查
///
/// 数据库不可用即unhealthy；缓存只是性能优化，状态照实上报
/// 但不影响整体判定。
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = state.db.ping().await;
    let cache = state.cache.ping().await;

    let status = if database { "healthy" } else { "unhealthy" };
    let code = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthCheck {
            status: status.to_string(),
            timestamp: Utc::now(),
            database,
            cache,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
