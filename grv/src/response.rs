use actix_web::{http::StatusCode, HttpResponse};
use serde::Serialize;

// 通用 HTTP 响应封装 / Generic HTTP response helpers

/// 统一 API 响应体 / Unified API envelope
///
/// `{"success": bool, "message": str, "data": any?, "created_at": rfc3339}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(success: bool, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success,
            message: message.into(),
            data,
            created_at: chrono::Utc::now(),
        }
    }
}

/// 以统一信封返回（成功与否由状态码决定）
/// Respond with the envelope; success follows the status code
pub fn respond_api<T: Serialize>(code: StatusCode, message: &str, data: Option<T>) -> HttpResponse {
    let body = ApiResponse::new(code.is_success(), message, data);
    HttpResponse::build(code).json(body)
}

/// 仅返回消息的失败响应 / Failure response carrying only a message
pub fn respond_error(code: StatusCode, message: &str) -> HttpResponse {
    respond_api::<()>(code, message, None)
}

// 通用响应（结构体自动转 JSON，失败则原样文本）
// Generic response: auto JSON from struct, fallback to debug text
pub fn respond_any<T: Serialize + std::fmt::Debug>(code: StatusCode, data: T) -> HttpResponse {
    match serde_json::to_value(&data) {
        Ok(v) => HttpResponse::build(code).json(v),
        Err(_) => HttpResponse::build(code)
            .content_type("text/plain; charset=utf-8")
            .body(format!("{:?}", data)),
    }
}
