//! HTTP 接口 / HTTP endpoints
//!
//! 每个端点提供 `register(cfg, path)`，由 `router::configure` 统一挂载。
//! Every endpoint exposes `register(cfg, path)`; `router::configure` mounts them.

pub mod v1;

use actix_web::http::StatusCode;

use crate::error::ChatError;

/// 已认证身份请求头 / Header carrying the authenticated identity
pub const AUTH_USER_HEADER: &str = "X-User-Id";

/// 错误到 HTTP 状态码的映射 / Map pipeline errors to HTTP status codes
pub fn error_status(err: &ChatError) -> StatusCode {
    match err {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::AuthorizationMismatch { .. } => StatusCode::FORBIDDEN,
        ChatError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Persistence(_) | ChatError::Delivery(_) | ChatError::Transport(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
