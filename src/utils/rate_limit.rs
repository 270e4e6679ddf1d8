use crate::utils::cache::CacheService;
use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// 单次限流检查返回的窗口状态
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[derive(Debug)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub info: RateLimitInfo,
}

/// 滑动窗口限流器
///
/// 以Redis有序集合为共享底座，按 (限流类型, 键) 维护窗口内的
/// 请求记录，多实例之间天然共享限流状态。每次请求写入一个
/// 唯一成员，分值按秒记录，窗口边界是秒级近似，不是精确的
/// 漏桶。
#[derive(Clone)]
pub struct RateLimiter {
    manager: Option<ConnectionManager>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(cache: &CacheService, enabled: bool) -> Self {
        Self {
            manager: cache.manager(),
            enabled,
        }
    }

    fn rate_limit_key(limit_type: &str, key: &str) -> String {
        format!("rate_limit:{}:{}", limit_type, key)
    }

    /// 检查限流状态
    ///
    /// 每次检查：清除窗口外的旧记录、写入当前时间戳、统计窗口内
    /// 计数、刷新键的过期时间（被遗弃的键随窗口自动清理）。
    /// Redis不可用时放行并告警：评论系统的可用性优先于严格限流。
    pub async fn check(
        &self,
        limit_type: &str,
        key: &str,
        limit: u32,
        window: u64,
    ) -> RateLimitDecision {
        if !self.enabled {
            return Self::fail_open(limit, window);
        }
        let Some(manager) = self.manager.as_ref() else {
            return Self::fail_open(limit, window);
        };

        let redis_key = Self::rate_limit_key(limit_type, key);
        let now = Utc::now().timestamp();
        // 成员必须全局唯一：同一秒内的多次请求各占一条记录，
        // 复用时间戳做成员会让ZADD原地覆盖、计数失真
        let member = format!("{}-{}", now, Uuid::new_v4());

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg(0)
            .arg(now - window as i64);
        pipe.cmd("ZADD").arg(&redis_key).arg(now).arg(&member);
        pipe.cmd("ZCARD").arg(&redis_key);
        pipe.cmd("EXPIRE").arg(&redis_key).arg(window as i64);

        let mut conn = manager.clone();
        let count = match pipe.query_async::<_, (i64, i64, i64, i64)>(&mut conn).await {
            Ok((_, _, count, _)) => count.max(0) as u32,
            Err(e) => {
                warn!("Rate limit check failed, allowing request: {}", e);
                return Self::fail_open(limit, window);
            }
        };

        let allowed = count <= limit;
        if !allowed {
            debug!(
                "Rate limit exceeded for {}: {} requests in {}s window",
                redis_key, count, window
            );
        }

        RateLimitDecision {
            allowed,
            info: RateLimitInfo {
                limit,
                remaining: limit.saturating_sub(count),
                reset_time: now + window as i64,
                retry_after: if allowed { None } else { Some(window) },
            },
        }
    }

    fn fail_open(limit: u32, window: u64) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            info: RateLimitInfo {
                limit,
                remaining: limit,
                reset_time: Utc::now().timestamp() + window as i64,
                retry_after: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_format() {
        assert_eq!(
            RateLimiter::rate_limit_key("ip", "203.0.113.7"),
            "rate_limit:ip:203.0.113.7"
        );
        assert_eq!(
            RateLimiter::rate_limit_key("comment", "198.51.100.2"),
            "rate_limit:comment:198.51.100.2"
        );
    }

    #[tokio::test]
    async fn test_missing_substrate_fails_open() {
        let limiter = RateLimiter::new(&CacheService::disabled(), true);
        let decision = limiter.check("ip", "203.0.113.7", 3, 300).await;
        assert!(decision.allowed);
        assert_eq!(decision.info.limit, 3);
        assert_eq!(decision.info.remaining, 3);
        assert_eq!(decision.info.retry_after, None);
    }

    #[tokio::test]
    async fn test_disabled_limiter_allows_everything() {
        let limiter = RateLimiter::new(&CacheService::disabled(), false);
        for _ in 0..10 {
            assert!(limiter.check("ip", "key", 1, 60).await.allowed);
        }
    }
}
