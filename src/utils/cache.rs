use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

/// Redis缓存服务
///
/// 缓存只是性能优化：REDIS_URL未配置或Redis不可达时整体降级，
/// 所有get都是未命中，所有set/失效都是空操作，读写路径必须在
/// 这种状态下保持正确。
#[derive(Clone)]
pub struct CacheService {
    manager: Option<ConnectionManager>,
}

impl CacheService {
    /// 连接Redis；连接失败时返回降级实例而不是报错
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let Some(url) = redis_url else {
            warn!("REDIS_URL not configured, cache disabled");
            return Self::disabled();
        };

        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                warn!("Invalid redis url, cache disabled: {}", e);
                return Self::disabled();
            }
        };

        match ConnectionManager::new(client).await {
            Ok(manager) => Self {
                manager: Some(manager),
            },
            Err(e) => {
                warn!("Failed to connect to redis, cache disabled: {}", e);
                Self::disabled()
            }
        }
    }

    /// 创建禁用状态的缓存实例
    pub fn disabled() -> Self {
        Self { manager: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.manager.is_some()
    }

    /// 供限流器等组件复用同一个连接
    pub fn manager(&self) -> Option<ConnectionManager> {
        self.manager.clone()
    }

    /// 生成缓存键：前缀 + 冒号连接的参数列表
    ///
    /// 参数必须覆盖所有影响结果的输入，不同查询才不会互相碰撞。
    pub fn cache_key(prefix: &str, parts: &[&str]) -> String {
        let mut key = String::from(prefix);
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_string(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cache deserialize error for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: u64) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache serialize error for {}: {}", key, e);
                return;
            }
        };
        self.set_string(key, &raw, ttl).await;
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        let manager = self.manager.as_ref()?;
        let mut conn = manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => {
                if value.is_some() {
                    debug!("Cache hit: {}", key);
                }
                value
            }
            Err(e) => {
                warn!("Cache read error for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_string(&self, key: &str, value: &str, ttl: u64) {
        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        let mut conn = manager.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl).await {
            warn!("Cache write error for {}: {}", key, e);
        }
    }

    pub async fn delete(&self, key: &str) {
        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        let mut conn = manager.clone();
        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!("Cache delete error for {}: {}", key, e);
        }
    }

    /// 转义redis通配元字符，拼进模式的片段必须按字面匹配
    pub fn escape_pattern(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    /// 按通配模式批量失效，零匹配也安全
    pub async fn invalidate_pattern(&self, pattern: &str) {
        let Some(manager) = self.manager.as_ref() else {
            return;
        };

        let mut scan_conn = manager.clone();
        let keys: Vec<String> = match scan_conn.scan_match::<_, String>(pattern).await {
            Ok(mut iter) => {
                let mut keys = Vec::new();
                while let Some(key) = iter.next_item().await {
                    keys.push(key);
                }
                keys
            }
            Err(e) => {
                warn!("Cache scan error for {}: {}", pattern, e);
                return;
            }
        };

        if keys.is_empty() {
            return;
        }

        debug!("Invalidating {} cache keys for pattern {}", keys.len(), pattern);
        let mut del_conn = manager.clone();
        if let Err(e) = del_conn.del::<_, ()>(keys).await {
            warn!("Cache invalidate error for {}: {}", pattern, e);
        }
    }

    pub async fn ping(&self) -> bool {
        let Some(manager) = self.manager.as_ref() else {
            return false;
        };
        let mut conn = manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}
