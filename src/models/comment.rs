use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 评论数据库行
///
/// email、ip_address、user_agent属于内部字段，故意不实现
/// Serialize，对外只暴露CommentResponse。
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub page: String,
    pub email: String,
    pub email_hash: String,
    pub username: String,
    pub content: String,
    pub parent_id: Option<i64>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub system_type: Option<String>,
    pub location: Option<String>,
}

/// 评论对外响应模型（永不回显邮箱，只给哈希）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: i64,
    pub page: String,
    pub email_hash: String,
    pub username: String,
    pub content: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub system_type: Option<String>,
    pub location: Option<String>,
    pub reply_count: i64,
}

impl CommentResponse {
    pub fn from_comment(comment: Comment, reply_count: i64) -> Self {
        Self {
            id: comment.id,
            page: comment.page,
            email_hash: comment.email_hash,
            username: comment.username,
            content: comment.content,
            parent_id: comment.parent_id,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            system_type: comment.system_type,
            location: comment.location,
            reply_count,
        }
    }
}

/// 创建评论请求模型
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 200, message = "页面标识长度必须在1-200之间"))]
    pub page: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(
        length(min = 2, max = 100, message = "用户名长度必须在2-100之间"),
        custom = "validate_username"
    )]
    pub username: String,
    #[validate(length(min = 10, max = 2000, message = "评论内容长度必须在10-2000之间"))]
    pub content: String,
    pub parent_id: Option<i64>,
}

/// 更新评论请求模型（管理员用）
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 10, max = 2000, message = "评论内容长度必须在10-2000之间"))]
    pub content: Option<String>,
    pub is_deleted: Option<bool>,
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        let mut err = ValidationError::new("username_blank");
        err.message = Some("用户名不能为空".into());
        return Err(err);
    }
    if username.contains(['<', '>', '"', '\'', '/', '\\']) {
        let mut err = ValidationError::new("username_special_chars");
        err.message = Some("用户名不能包含特殊字符".into());
        return Err(err);
    }
    Ok(())
}

/// 顶级评论列表的查询参数（已归一化）
#[derive(Debug, Clone)]
pub struct CommentQuery {
    pub page: String,
    pub cursor: Option<String>,
    pub limit: i64,
    pub sort: String,
    pub order: String,
}

/// 回复列表的查询参数（已归一化）
#[derive(Debug, Clone)]
pub struct RepliesQuery {
    pub parent_id: i64,
    pub cursor: Option<String>,
    pub limit: i64,
}

/// 游标分页响应信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentListResponse {
    pub comments: Vec<CommentResponse>,
    pub has_next: bool,
    pub next_cursor: Option<String>,
}

/// 页面评论统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageStats {
    pub total_comments: i64,
    pub top_level_comments: i64,
    pub replies: i64,
}

/// 健康检查响应模型
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub database: bool,
    pub cache: bool,
    pub version: String,
}
