//! 统一错误处理
//!
//! 提供 `ApiError` 枚举实现 `IntoResponse`，失败响应统一为 `{success: false, message}`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::ConfigError;
use crate::infra::GatewayError;
use crate::services::ControlError;

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 400 - 请求无效（名称校验失败、未知动作）
    BadRequest(String),
    /// 404 - 资源未找到
    NotFound(String),
    /// 500 - 运行时或内部错误，附带原始命令输出
    Internal {
        message: String,
        details: Option<String>,
    },
    /// 503 - 暂不可用（构建前置文件未就绪）
    ServiceUnavailable(String),
}

impl ApiError {
    /// 创建未找到错误
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// 创建请求无效错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            details: None,
        }
    }

    /// 创建服务不可用错误
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::NotFound(resource) => ErrorResponse::new(format!("{} not found", resource)),
            ApiError::BadRequest(msg) | ApiError::ServiceUnavailable(msg) => {
                ErrorResponse::new(msg)
            }
            ApiError::Internal { message, details } => {
                let body = ErrorResponse::new(message);
                match details {
                    Some(d) if !d.is_empty() => body.with_details(d),
                    _ => body,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(r) => write!(f, "Not found: {}", r),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::Internal { message, .. } => write!(f, "Internal error: {}", message),
            ApiError::ServiceUnavailable(m) => write!(f, "Service unavailable: {}", m),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError::internal(e.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::InvalidTarget(e) => ApiError::bad_request(e.to_string()),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::InvalidName(_)
            | ControlError::InvalidAction(_)
            | ControlError::InvalidRequest(_) => ApiError::bad_request(e.to_string()),
            ControlError::Undeclared { family, name } => {
                ApiError::not_found(format!("{} '{}'", family, name))
            }
            ControlError::ProjectNotFound(name) => ApiError::not_found(format!("Project '{}'", name)),
            ControlError::ContainerNotFound(name) => {
                ApiError::not_found(format!("Container {}", name))
            }
            ControlError::CommandFailed { message, output } => ApiError::Internal {
                message,
                details: Some(output),
            },
            ControlError::NotReady(e) => ApiError::service_unavailable(e.to_string()),
            ControlError::Runtime(e) => e.into(),
            ControlError::Config(e) => e.into(),
        }
    }
}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;
