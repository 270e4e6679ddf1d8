use crate::config::Config;
use crate::error::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// 建表语句：启动时幂等执行，生产环境的结构变更走迁移工具
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS comments (
    id          BIGSERIAL PRIMARY KEY,
    page        VARCHAR(200) NOT NULL,
    email       VARCHAR(255) NOT NULL,
    email_hash  VARCHAR(32)  NOT NULL,
    username    VARCHAR(100) NOT NULL,
    content     TEXT         NOT NULL,
    parent_id   BIGINT REFERENCES comments(id),
    is_deleted  BOOLEAN      NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
    ip_address  TEXT,
    user_agent  TEXT,
    system_type VARCHAR(50),
    location    VARCHAR(100)
);
CREATE INDEX IF NOT EXISTS idx_comments_page ON comments (page);
CREATE INDEX IF NOT EXISTS idx_comments_parent_id ON comments (parent_id);
CREATE INDEX IF NOT EXISTS idx_comments_created_at ON comments (created_at);
CREATE INDEX IF NOT EXISTS idx_comments_page_parent_deleted ON comments (page, parent_id, is_deleted);
"#;

/// 数据库服务
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建连接池
    pub async fn connect(config: &Config) -> Result<Self> {
        info!("Initializing database connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn verify_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 确保表结构存在（幂等）
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&self.pool).await?;
            }
        }
        info!("Database schema ensured");
        Ok(())
    }

    /// 健康检查用，失败不抛错
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
