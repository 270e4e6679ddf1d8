use crate::{
    error::{AppError, Result},
    state::AppState,
    utils::client_info::extract_real_ip,
};
use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// 请求上下文中间件解析出的客户端信息
///
/// 由请求上下文中间件写入扩展，处理器通过提取器读取，
/// 保证IP解析逻辑只存在一份。
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<ClientInfo>()
            .cloned()
            .ok_or_else(|| AppError::internal("request context middleware not installed"))
    }
}

/// 请求上下文中间件
///
/// 为每个请求生成关联ID、解析客户端真实IP（代理头不可信时
/// 回退到传输层对端地址）、记录请求耗时。
pub async fn request_context_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let ip = extract_real_ip(request.headers()).unwrap_or_else(|| addr.ip().to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    request.extensions_mut().insert(ClientInfo {
        ip: ip.clone(),
        user_agent,
    });

    let start = Instant::now();
    debug!("Request started: {} {} [{}] from {}", method, uri, request_id, ip);

    let mut response = next.run(request).await;

    info!(
        "Request completed: {} {} {} in {:?} [{}]",
        method,
        uri,
        response.status(),
        start.elapsed(),
        request_id
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// IP级限流中间件，只拦截写操作
///
/// 读接口有缓存层兜底，放过限流以降低延迟；写操作按客户端IP
/// 统一限流，通过的响应附带窗口状态头。
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<Response> {
    let mutating = matches!(
        request.method().as_str(),
        "POST" | "PUT" | "DELETE" | "PATCH"
    );
    if !mutating {
        return Ok(next.run(request).await);
    }

    let Some(client) = request.extensions().get::<ClientInfo>().cloned() else {
        return Ok(next.run(request).await);
    };

    let decision = state
        .rate_limiter
        .check(
            "ip",
            &client.ip,
            state.config.ip_rate_limit,
            state.config.ip_rate_limit_window,
        )
        .await;

    if !decision.allowed {
        return Err(AppError::RateLimitExceeded(decision.info));
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.info.limit));
    headers.insert(
        "x-ratelimit-remaining",
        HeaderValue::from(decision.info.remaining),
    );
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.info.reset_time),
    );
    Ok(response)
}

/// 安全响应头中间件
pub async fn security_headers_middleware(request: Request<Body>, next: Next<Body>) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-xss-protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}
