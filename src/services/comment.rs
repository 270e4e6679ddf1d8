use crate::{
    config::Config,
    error::{AppError, Result},
    models::comment::*,
    services::{Database, LocationService},
    utils::{
        cache::CacheService,
        client_info::detect_system,
        cursor::{decode_cursor, encode_cursor, CursorValue},
        security,
    },
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 评论服务：游标分页读取、缓存包装、写入路径
#[derive(Clone)]
pub struct CommentService {
    db: Arc<Database>,
    cache: CacheService,
    location: LocationService,
    cache_ttl: u64,
    stats_cache_ttl: u64,
}

/// 排序列白名单，游标值类型由此决定
fn sort_column(sort: &str) -> &'static str {
    match sort {
        "updated_at" => "updated_at",
        "id" => "id",
        _ => "created_at",
    }
}

/// 取limit+1行后切分：多出的那行只用来判断还有没有下一页
fn split_page<T>(mut rows: Vec<T>, limit: i64) -> (Vec<T>, bool) {
    let has_next = rows.len() as i64 > limit;
    if has_next {
        rows.truncate(limit as usize);
    }
    (rows, has_next)
}

/// 把解码出的游标值按排序列校正类型；类型不符视为无效游标
fn cursor_value_for_column(column: &str, value: CursorValue) -> Option<CursorValue> {
    match (column, value) {
        ("id", CursorValue::Int(v)) => Some(CursorValue::Int(v)),
        ("created_at" | "updated_at", CursorValue::Timestamp(t)) => {
            Some(CursorValue::Timestamp(t))
        }
        _ => None,
    }
}

/// 从本页最后一行取出下一页游标的排序列值
fn row_cursor_value(column: &str, comment: &Comment) -> CursorValue {
    match column {
        "updated_at" => CursorValue::Timestamp(comment.updated_at),
        "id" => CursorValue::Int(comment.id),
        _ => CursorValue::Timestamp(comment.created_at),
    }
}

impl CommentService {
    pub fn new(
        db: Arc<Database>,
        cache: CacheService,
        location: LocationService,
        config: &Config,
    ) -> Self {
        Self {
            db,
            cache,
            location,
            cache_ttl: config.cache_ttl,
            stats_cache_ttl: config.stats_cache_ttl,
        }
    }

    /// 创建评论
    pub async fn create_comment(
        &self,
        request: CreateCommentRequest,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Comment> {
        debug!("Creating comment on page: {}", request.page);

        // 验证父评论存在、未删除、且在同一页面
        if let Some(parent_id) = request.parent_id {
            let parent = sqlx::query_as::<_, Comment>(
                "SELECT * FROM comments WHERE id = $1 AND is_deleted = FALSE",
            )
            .bind(parent_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| AppError::not_found("回复的评论不存在"))?;

            if parent.page != request.page {
                return Err(AppError::validation("不能回复不同页面的评论"));
            }
        }

        // 垃圾内容检查
        if security::check_spam_content(&request.content) {
            return Err(AppError::validation("评论内容包含不当内容，请修改后重试"));
        }

        let email_hash = security::generate_email_hash(&request.email);
        let content = security::sanitize_content(&request.content);
        let system_type = detect_system(user_agent);
        let location = self.location.get_location(ip_address).await;

        // 单事务写入：任何失败整体回滚，不留半写的行
        let mut tx = self.db.pool().begin().await?;
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments
                (page, email, email_hash, username, content, parent_id,
                 ip_address, user_agent, system_type, location)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&request.page)
        .bind(&request.email)
        .bind(&email_hash)
        .bind(&request.username)
        .bind(&content)
        .bind(request.parent_id)
        .bind(ip_address)
        .bind(user_agent)
        .bind(&system_type)
        .bind(&location)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        self.invalidate_page_cache(&comment.page, comment.parent_id, None)
            .await;

        info!("Comment created: {} by {}", comment.id, comment.username);
        Ok(comment)
    }

    /// 获取顶级评论列表（游标分页，附带回复数量）
    pub async fn get_comments(&self, query: &CommentQuery) -> Result<CommentListResponse> {
        let cache_key = CacheService::cache_key(
            "comments",
            &[
                &query.page,
                query.cursor.as_deref().unwrap_or(""),
                &query.limit.to_string(),
                &query.sort,
                &query.order,
            ],
        );

        if let Some(cached) = self.cache.get_json::<CommentListResponse>(&cache_key).await {
            return Ok(cached);
        }

        let column = sort_column(&query.sort);
        let ascending = query.order == "asc";

        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "SELECT * FROM comments WHERE page = ",
        );
        qb.push_bind(&query.page);
        qb.push(" AND is_deleted = FALSE AND parent_id IS NULL");

        // 游标过滤：与排序方向一致的 (排序列, id) 复合行比较。
        // id决胜键保证全序，同值的行在翻页时既不丢也不重。
        if let Some(cursor) = query.cursor.as_deref() {
            if let Some((value, cursor_id)) = decode_cursor(cursor) {
                if let Some(value) = cursor_value_for_column(column, value) {
                    push_cursor_filter(&mut qb, column, ascending, value, cursor_id);
                }
            }
        }

        let direction = if ascending { "ASC" } else { "DESC" };
        qb.push(format!(
            " ORDER BY {column} {direction}, id {direction} LIMIT "
        ));
        qb.push_bind(query.limit + 1);

        let rows = qb
            .build_query_as::<Comment>()
            .fetch_all(self.db.pool())
            .await?;

        let (comments, has_next) = split_page(rows, query.limit);
        let next_cursor = if has_next {
            comments
                .last()
                .map(|last| encode_cursor(row_cursor_value(column, last), last.id))
        } else {
            None
        };

        // 一次聚合查询算出本页所有顶级评论的直接回复数
        let reply_counts = self
            .reply_counts(&comments.iter().map(|c| c.id).collect::<Vec<_>>())
            .await?;

        let responses = comments
            .into_iter()
            .map(|comment| {
                let count = reply_counts.get(&comment.id).copied().unwrap_or(0);
                CommentResponse::from_comment(comment, count)
            })
            .collect();

        let result = CommentListResponse {
            comments: responses,
            has_next,
            next_cursor,
        };

        self.cache.set_json(&cache_key, &result, self.cache_ttl).await;
        Ok(result)
    }

    /// 获取某条评论的直接回复（游标分页，固定最旧在前）
    pub async fn get_replies(&self, query: &RepliesQuery) -> Result<CommentListResponse> {
        let cache_key = CacheService::cache_key(
            "replies",
            &[
                &query.parent_id.to_string(),
                query.cursor.as_deref().unwrap_or(""),
                &query.limit.to_string(),
            ],
        );

        if let Some(cached) = self.cache.get_json::<CommentListResponse>(&cache_key).await {
            return Ok(cached);
        }

        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "SELECT * FROM comments WHERE parent_id = ",
        );
        qb.push_bind(query.parent_id);
        qb.push(" AND is_deleted = FALSE");

        if let Some(cursor) = query.cursor.as_deref() {
            if let Some((value, cursor_id)) = decode_cursor(cursor) {
                if let Some(value) = cursor_value_for_column("created_at", value) {
                    push_cursor_filter(&mut qb, "created_at", true, value, cursor_id);
                }
            }
        }

        qb.push(" ORDER BY created_at ASC, id ASC LIMIT ");
        qb.push_bind(query.limit + 1);

        let rows = qb
            .build_query_as::<Comment>()
            .fetch_all(self.db.pool())
            .await?;

        let (replies, has_next) = split_page(rows, query.limit);
        let next_cursor = if has_next {
            replies
                .last()
                .map(|last| encode_cursor(CursorValue::Timestamp(last.created_at), last.id))
        } else {
            None
        };

        // 回复不再向下展开，回复数固定为0
        let responses = replies
            .into_iter()
            .map(|reply| CommentResponse::from_comment(reply, 0))
            .collect();

        let result = CommentListResponse {
            comments: responses,
            has_next,
            next_cursor,
        };

        self.cache.set_json(&cache_key, &result, self.cache_ttl).await;
        Ok(result)
    }

    /// 根据ID获取单条未删除评论及其回复数
    pub async fn get_comment_by_id(&self, comment_id: i64) -> Result<Option<(Comment, i64)>> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comments WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(comment_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(comment) = comment else {
            return Ok(None);
        };

        let counts = self.reply_counts(&[comment.id]).await?;
        let reply_count = counts.get(&comment.id).copied().unwrap_or(0);
        Ok(Some((comment, reply_count)))
    }

    /// 更新评论（管理员功能）
    ///
    /// 直接字段赋值：内容仍做转义，但不再过垃圾内容检查。
    pub async fn update_comment(
        &self,
        comment_id: i64,
        update: UpdateCommentRequest,
    ) -> Result<Comment> {
        let sanitized = update.content.as_deref().map(security::sanitize_content);

        let comment = sqlx::query_as::<_, Comment>(
            r#"
            UPDATE comments
            SET content = COALESCE($1, content),
                is_deleted = COALESCE($2, is_deleted),
                updated_at = now()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(sanitized)
        .bind(update.is_deleted)
        .bind(comment_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| AppError::not_found("评论不存在"))?;

        self.invalidate_page_cache(&comment.page, comment.parent_id, Some(comment.id))
            .await;

        Ok(comment)
    }

    /// 软删除评论
    pub async fn delete_comment(&self, comment_id: i64) -> Result<()> {
        let comment = sqlx::query_as::<_, Comment>(
            "UPDATE comments SET is_deleted = TRUE, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(comment_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| AppError::not_found("评论不存在"))?;

        self.invalidate_page_cache(&comment.page, comment.parent_id, Some(comment.id))
            .await;

        info!("Comment soft-deleted: {}", comment_id);
        Ok(())
    }

    /// 获取页面统计信息
    pub async fn get_page_stats(&self, page: &str) -> Result<PageStats> {
        let cache_key = CacheService::cache_key("stats", &[page]);
        if let Some(cached) = self.cache.get_json::<PageStats>(&cache_key).await {
            return Ok(cached);
        }

        // 两个计数必须来自同一快照，分开查询时并发写入会让差值为负
        let (total_comments, top_level_comments): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE parent_id IS NULL) \
             FROM comments WHERE page = $1 AND is_deleted = FALSE",
        )
        .bind(page)
        .fetch_one(self.db.pool())
        .await?;

        let stats = PageStats {
            total_comments,
            top_level_comments,
            replies: total_comments - top_level_comments,
        };

        self.cache
            .set_json(&cache_key, &stats, self.stats_cache_ttl)
            .await;
        Ok(stats)
    }

    /// 批量统计直接回复数（只数未删除的）
    async fn reply_counts(&self, parent_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        if parent_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT parent_id, COUNT(*) FROM comments \
             WHERE parent_id = ANY($1) AND is_deleted = FALSE GROUP BY parent_id",
        )
        .bind(parent_ids)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// 写入成功后清除受影响页面的全部列表/统计缓存
    ///
    /// 宁可多清不可少清：多失效只损失性能，少失效会返回脏数据。
    async fn invalidate_page_cache(
        &self,
        page: &str,
        parent_id: Option<i64>,
        comment_id: Option<i64>,
    ) {
        // 页面标识来自用户输入，可能含通配元字符，拼模式前先转义
        self.cache
            .invalidate_pattern(&format!(
                "comments:{}:*",
                CacheService::escape_pattern(page)
            ))
            .await;
        self.cache.delete(&format!("stats:{}", page)).await;

        if let Some(parent_id) = parent_id {
            self.cache
                .invalidate_pattern(&format!("replies:{}:*", parent_id))
                .await;
        }
        if let Some(comment_id) = comment_id {
            self.cache
                .invalidate_pattern(&format!("replies:{}:*", comment_id))
                .await;
        }
    }
}

/// 追加游标过滤条件：(排序列, id) 与游标的复合比较
fn push_cursor_filter(
    qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>,
    column: &str,
    ascending: bool,
    value: CursorValue,
    cursor_id: i64,
) {
    qb.push(format!(" AND ({column}, id) "));
    qb.push(if ascending { "> (" } else { "< (" });
    match value {
        CursorValue::Int(v) => {
            qb.push_bind(v);
        }
        CursorValue::Timestamp(t) => {
            qb.push_bind(t);
        }
        CursorValue::Text(s) => {
            qb.push_bind(s);
        }
    }
    qb.push(", ");
    qb.push_bind(cursor_id);
    qb.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_sort_column_whitelist() {
        assert_eq!(sort_column("created_at"), "created_at");
        assert_eq!(sort_column("updated_at"), "updated_at");
        assert_eq!(sort_column("id"), "id");
        // 白名单外的输入回落到默认列，拒绝SQL注入面
        assert_eq!(sort_column("email; DROP TABLE comments"), "created_at");
        assert_eq!(sort_column(""), "created_at");
    }

    #[test]
    fn test_split_page_detects_next_page() {
        let (rows, has_next) = split_page(vec![1, 2, 3, 4], 3);
        assert_eq!(rows, vec![1, 2, 3]);
        assert!(has_next);
    }

    #[test]
    fn test_split_page_exact_fit_has_no_next() {
        let (rows, has_next) = split_page(vec![1, 2, 3], 3);
        assert_eq!(rows, vec![1, 2, 3]);
        assert!(!has_next);

        let (rows, has_next) = split_page(Vec::<i32>::new(), 3);
        assert!(rows.is_empty());
        assert!(!has_next);
    }

    #[test]
    fn test_cursor_value_type_must_match_column() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            cursor_value_for_column("created_at", CursorValue::Timestamp(ts)),
            Some(CursorValue::Timestamp(ts))
        );
        assert_eq!(
            cursor_value_for_column("id", CursorValue::Int(5)),
            Some(CursorValue::Int(5))
        );
        // 类型不匹配的游标按无效处理，从头开始分页
        assert_eq!(
            cursor_value_for_column("created_at", CursorValue::Int(5)),
            None
        );
        assert_eq!(
            cursor_value_for_column("id", CursorValue::Text("x".to_string())),
            None
        );
    }
}
