use crate::{
    config::Config,
    services::{CommentService, Database},
    utils::{cache::CacheService, rate_limit::RateLimiter},
};
use std::sync::Arc;

/// 应用共享状态
pub struct AppState {
    pub config: Config,
    pub db: Arc<Database>,
    pub cache: CacheService,
    pub rate_limiter: RateLimiter,
    pub comment_service: CommentService,
}
