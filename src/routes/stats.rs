use crate::{error::Result, state::AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/:page", get(page_stats))
}

/// 获取页面评论统计
///
/// 页面标识可能含斜杠，调用方需要URL编码。不存在的页面
/// 返回全零统计而不是404。
async fn page_stats(
    State(state): State<Arc<AppState>>,
    Path(page): Path<String>,
) -> Result<impl IntoResponse> {
    let stats = state.comment_service.get_page_stats(&page).await?;
    Ok(Json(json!({
        "success": true,
        "data": stats
    })))
}
