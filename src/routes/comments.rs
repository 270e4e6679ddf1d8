use crate::{
    error::{AppError, Result},
    models::comment::*,
    state::AppState,
    utils::middleware::ClientInfo,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_comments).post(create_comment))
        .route(
            "/:id",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
        .route("/:id/replies", get(list_replies))
}

/// 顶级评论列表的原始查询参数
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: String,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepliesParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// 页大小钳制到 [1, 最大页大小]，缺省用默认页大小
fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

/// 获取页面的顶级评论列表（游标分页）
async fn list_comments(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse> {
    if params.page.trim().is_empty() {
        return Err(AppError::BadRequest("页面标识不能为空".to_string()));
    }

    let order = match params.order.as_deref() {
        Some("asc") => "asc",
        _ => "desc",
    };

    let query = CommentQuery {
        page: params.page,
        cursor: params.cursor,
        limit: clamp_limit(
            params.limit,
            state.config.default_page_size,
            state.config.max_page_size,
        ),
        sort: params.sort.unwrap_or_else(|| "created_at".to_string()),
        order: order.to_string(),
    };

    let result = state.comment_service.get_comments(&query).await?;
    Ok(Json(result))
}

/// 创建评论
async fn create_comment(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(request): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;

    // IP级限流在中间件，这里再按发帖行为单独限流
    let decision = state
        .rate_limiter
        .check(
            "comment",
            &client.ip,
            state.config.comment_rate_limit,
            state.config.comment_rate_limit_window,
        )
        .await;
    if !decision.allowed {
        return Err(AppError::RateLimitExceeded(decision.info));
    }

    let comment = state
        .comment_service
        .create_comment(request, &client.ip, &client.user_agent)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse::from_comment(comment, 0)),
    ))
}

/// 获取单条评论
async fn get_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let (comment, reply_count) = state
        .comment_service
        .get_comment_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("评论不存在"))?;

    Ok(Json(CommentResponse::from_comment(comment, reply_count)))
}

/// 获取评论的直接回复列表（游标分页，最旧在前）
async fn list_replies(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<RepliesParams>,
) -> Result<impl IntoResponse> {
    // 父评论必须存在且未删除
    state
        .comment_service
        .get_comment_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("评论不存在"))?;

    let query = RepliesQuery {
        parent_id: id,
        cursor: params.cursor,
        limit: clamp_limit(
            params.limit,
            state.config.default_page_size,
            state.config.max_page_size,
        ),
    };

    let result = state.comment_service.get_replies(&query).await?;
    Ok(Json(result))
}

/// 更新评论（管理员功能）
async fn update_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;

    let comment = state.comment_service.update_comment(id, request).await?;
    Ok(Json(CommentResponse::from_comment(comment, 0)))
}

/// 删除评论（软删除）
async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    state.comment_service.delete_comment(id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "评论删除成功"
    })))
}
