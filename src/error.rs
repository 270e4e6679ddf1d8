use crate::utils::rate_limit::RateLimitInfo;
use axum::{
    http::{header::HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded(RateLimitInfo),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match &self {
            // 存储层错误：细节只进日志，对外返回通用消息和关联ID供排查
            AppError::Database(e) => {
                let request_id = correlation_id();
                tracing::error!("Database error [{}]: {}", request_id, e);
                return internal_response("DATABASE_ERROR", "数据库操作失败", &request_id);
            }
            AppError::Internal(msg) => {
                let request_id = correlation_id();
                tracing::error!("Internal error [{}]: {}", request_id, msg);
                return internal_response("INTERNAL_ERROR", "服务器内部错误", &request_id);
            }
            AppError::Serialization(e) => {
                let request_id = correlation_id();
                tracing::error!("Serialization error [{}]: {}", request_id, e);
                return internal_response("SERIALIZATION_ERROR", "服务器内部错误", &request_id);
            }
            AppError::Request(e) => {
                let request_id = correlation_id();
                tracing::error!("Upstream request error [{}]: {}", request_id, e);
                return internal_response("EXTERNAL_SERVICE_ERROR", "服务器内部错误", &request_id);
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "VALIDATION_ERROR")
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), "NOT_FOUND"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "BAD_REQUEST"),
            AppError::RateLimitExceeded(info) => {
                let retry_after = info.retry_after.unwrap_or(60);
                let body = Json(json!({
                    "error": {
                        "code": "RATE_LIMIT_EXCEEDED",
                        "message": "请求过于频繁，请稍后再试",
                        "retry_after": retry_after
                    }
                }));

                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                let headers = response.headers_mut();
                headers.insert("retry-after", HeaderValue::from(retry_after));
                headers.insert("x-ratelimit-limit", HeaderValue::from(info.limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(info.remaining));
                headers.insert("x-ratelimit-reset", HeaderValue::from(info.reset_time));
                return response;
            }
            AppError::ValidatorError(e) => {
                let validation_errors = e
                    .field_errors()
                    .iter()
                    .map(|(field, errors)| {
                        (
                            field.to_string(),
                            errors
                                .iter()
                                .map(|e| {
                                    e.message
                                        .as_ref()
                                        .unwrap_or(&"Invalid value".into())
                                        .to_string()
                                })
                                .collect::<Vec<_>>(),
                        )
                    })
                    .collect::<std::collections::HashMap<String, Vec<String>>>();

                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": {
                            "code": "VALIDATION_ERROR",
                            "message": "请求参数验证失败",
                            "details": validation_errors
                        }
                    })),
                )
                    .into_response();
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

// 便利函数，用于创建常见错误
impl AppError {
    pub fn not_found(msg: &str) -> Self {
        Self::NotFound(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn internal(msg: &str) -> Self {
        Self::Internal(msg.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// 生成5xx响应的关联ID，客户端凭此ID对应服务端日志
fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn internal_response(code: &str, message: &str, request_id: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": {
                "code": code,
                "message": message,
                "request_id": request_id
            }
        })),
    )
        .into_response()
}
