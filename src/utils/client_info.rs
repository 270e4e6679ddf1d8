use axum::http::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;

/// 代理转发头，按可信度优先级排列
const IP_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip", // Cloudflare
    "x-client-ip",
    "x-forwarded",
    "forwarded-for",
    "forwarded",
];

/// 系统检测规则，按顺序匹配，先命中者生效
static SYSTEM_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)Windows NT|Windows", "Windows"),
        (r"(?i)Macintosh|Mac OS X|macOS", "macOS"),
        (r"(?i)Linux|Ubuntu|CentOS|Debian|Fedora", "Linux"),
        (r"(?i)iPhone|iPad|iPod", "iOS"),
        (r"(?i)Android", "Android"),
    ]
    .iter()
    .map(|(pattern, system)| (Regex::new(pattern).expect("invalid system pattern"), *system))
    .collect()
});

/// 从User-Agent检测操作系统类型
///
/// 空UA返回"未知"，有UA但无法识别返回"其他"。
pub fn detect_system(user_agent: &str) -> String {
    if user_agent.is_empty() {
        return "未知".to_string();
    }

    for (pattern, system) in SYSTEM_PATTERNS.iter() {
        if pattern.is_match(user_agent) {
            return (*system).to_string();
        }
    }

    "其他".to_string()
}

/// 检查是否为私有网段IP
pub fn is_private_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        Ok(IpAddr::V6(v6)) => {
            // fc00::/7 唯一本地地址
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
        Err(_) => false,
    }
}

/// 检查是否为本地回环地址
pub fn is_local_ip(ip: &str) -> bool {
    matches!(ip, "127.0.0.1" | "localhost" | "::1" | "0.0.0.0")
}

/// 从请求头中提取真实客户端IP
///
/// 逐个检查代理转发头，取第一个逗号分隔值；私有网段和回环
/// 地址不可信，跳过。全部不可用时返回None，由调用方回退到
/// 传输层对端地址。
pub fn extract_real_ip(headers: &HeaderMap) -> Option<String> {
    for header in IP_HEADERS {
        let Some(value) = headers.get(*header).and_then(|v| v.to_str().ok()) else {
            continue;
        };

        // X-Forwarded-For可能包含多个IP，取第一个
        let ip = value.split(',').next().unwrap_or("").trim();
        if !ip.is_empty() && !is_private_ip(ip) && !is_local_ip(ip) {
            return Some(ip.to_string());
        }
    }

    None
}
