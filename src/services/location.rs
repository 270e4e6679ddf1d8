use crate::config::Config;
use crate::error::{AppError, Result};
use crate::utils::cache::CacheService;
use crate::utils::client_info::is_local_ip;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;

/// 地区信息解析服务
///
/// 对写入路径来说是锦上添花的增强：任何失败都退化为"未知"，
/// 绝不向调用方抛错，绝不拖垮评论提交。
#[derive(Clone)]
pub struct LocationService {
    http: reqwest::Client,
    cache: CacheService,
    api_url: String,
    cache_ttl: u64,
}

impl LocationService {
    pub fn new(config: &Config, cache: CacheService) -> Result<Self> {
        Self::from_parts(
            config.geo_api_url.clone(),
            config.geo_api_timeout,
            config.geo_cache_ttl,
            cache,
        )
    }

    fn from_parts(
        api_url: String,
        timeout_secs: u64,
        cache_ttl: u64,
        cache: CacheService,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::internal(&format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            cache,
            api_url,
            cache_ttl,
        })
    }

    /// 获取IP对应的地区信息字符串
    ///
    /// 本地/回环地址直接返回"本地"，不发起网络调用。
    pub async fn get_location(&self, ip: &str) -> String {
        if ip.is_empty() || is_local_ip(ip) {
            return "本地".to_string();
        }

        let cache_key = format!("location:{}", ip);
        if let Some(cached) = self.cache.get_string(&cache_key).await {
            debug!("Location cache hit for {}: {}", ip, cached);
            return cached;
        }

        let location = self
            .fetch_from_api(ip)
            .await
            .unwrap_or_else(|| "未知".to_string());

        self.cache
            .set_string(&cache_key, &location, self.cache_ttl)
            .await;

        location
    }

    /// 调用第三方API，带固定短超时和有限次重试
    async fn fetch_from_api(&self, ip: &str) -> Option<String> {
        let url = format!("{}?ip={}", self.api_url, ip);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(data) => return Self::parse_response(&data),
                        Err(e) => {
                            warn!("Location API returned invalid body: {}", e);
                            return None;
                        }
                    }
                }
                Ok(response) => {
                    warn!(
                        "Location API request failed with status {} (attempt {}/{})",
                        response.status(),
                        attempt,
                        MAX_ATTEMPTS
                    );
                }
                Err(e) => {
                    warn!(
                        "Location API request error (attempt {}/{}): {}",
                        attempt, MAX_ATTEMPTS, e
                    );
                }
            }
        }

        None
    }

    /// 解析API响应，拼接 国家 省份 城市，跳过缺失/重复/未知段
    fn parse_response(data: &Value) -> Option<String> {
        if !data.get("success").and_then(Value::as_bool).unwrap_or(false) {
            return None;
        }

        let info = data.get("info")?;
        let country = info.get("country").and_then(Value::as_str).unwrap_or("");
        let region = info.get("region").and_then(Value::as_str).unwrap_or("");
        let city = info.get("city").and_then(Value::as_str).unwrap_or("");

        let mut parts: Vec<&str> = Vec::new();
        if !country.is_empty() && country != "未知" {
            parts.push(country);
        }
        if !region.is_empty() && region != "未知" && region != country {
            parts.push(region);
        }
        if !city.is_empty() && city != "未知" && city != region {
            parts.push(city);
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(api_url: String) -> LocationService {
        LocationService::from_parts(api_url, 1, 60, CacheService::disabled()).unwrap()
    }

    #[test]
    fn test_parse_response() {
        let data = json!({
            "success": true,
            "info": {"country": "中国", "region": "浙江", "city": "杭州"}
        });
        assert_eq!(
            LocationService::parse_response(&data),
            Some("中国 浙江 杭州".to_string())
        );

        // 重复和未知的段被跳过
        let data = json!({
            "success": true,
            "info": {"country": "新加坡", "region": "新加坡", "city": "未知"}
        });
        assert_eq!(
            LocationService::parse_response(&data),
            Some("新加坡".to_string())
        );

        assert_eq!(LocationService::parse_response(&json!({"success": false})), None);
        assert_eq!(LocationService::parse_response(&json!({})), None);
    }

    #[tokio::test]
    async fn test_local_ip_short_circuits() {
        // 故意使用一个不可达的地址：本地IP不应触发任何网络调用
        let service = service_for("http://127.0.0.1:1".to_string());
        assert_eq!(service.get_location("127.0.0.1").await, "本地");
        assert_eq!(service.get_location("::1").await, "本地");
        assert_eq!(service.get_location("").await, "本地");
    }

    #[tokio::test]
    async fn test_fetch_location_from_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("ip", "203.0.113.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "info": {"country": "中国", "region": "广东", "city": "深圳"}
            })))
            .mount(&server)
            .await;

        let service = service_for(server.uri());
        assert_eq!(service.get_location("203.0.113.7").await, "中国 广东 深圳");
    }

    #[tokio::test]
    async fn test_api_failure_degrades_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = service_for(server.uri());
        assert_eq!(service.get_location("203.0.113.7").await, "未知");
    }
}
