//! 处理错误类型
//!
//! 定义协议转换与后端调用过程中可能发生的错误，以及它们到
//! 客户端错误信封 `{"error": {message, type, param, code}}` 的映射。

use crate::backends::traits::{BackendError, BackendErrorKind};
use thiserror::Error;

/// 处理错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxyError {
    /// 请求格式无效
    #[error("无效请求: {message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
    },

    /// 内容无法用后端格式表达
    #[error("不支持的内容类型 {kind}（字段 {param}）")]
    UnsupportedContent { kind: String, param: String },

    /// tool 消息引用了未出现过的工具调用
    #[error("tool 消息引用了不存在的工具调用: {tool_call_id}")]
    ToolCallCorrespondence { tool_call_id: String, param: String },

    /// 单轮工具调用数超过模型上限
    #[error("工具调用数 {count} 超过模型上限 {max}")]
    ToolCallLimitExceeded {
        count: usize,
        max: usize,
        param: String,
    },

    /// 后端连接或超时错误
    #[error("后端连接失败: {message}")]
    BackendTransport { message: String, timed_out: bool },

    /// 后端返回非 2xx 状态
    #[error("后端返回错误状态 {status}: {body}")]
    BackendStatus { status: u16, body: String },

    /// 后端响应无法解析
    #[error("后端响应无法解析: {0}")]
    BackendProtocol(String),
}

impl ProxyError {
    pub fn invalid_request(message: impl Into<String>, param: Option<&str>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: param.map(str::to_string),
        }
    }

    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::InvalidRequest { .. }
            | ProxyError::UnsupportedContent { .. }
            | ProxyError::ToolCallCorrespondence { .. }
            | ProxyError::ToolCallLimitExceeded { .. } => 400,
            ProxyError::BackendTransport {
                timed_out: true, ..
            } => 504,
            ProxyError::BackendTransport { .. } => 502,
            ProxyError::BackendStatus { status, .. } => *status,
            ProxyError::BackendProtocol(_) => 502,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest { .. }
            | ProxyError::UnsupportedContent { .. }
            | ProxyError::ToolCallCorrespondence { .. }
            | ProxyError::ToolCallLimitExceeded { .. } => "invalid_request_error",
            ProxyError::BackendTransport { .. }
            | ProxyError::BackendStatus { .. }
            | ProxyError::BackendProtocol(_) => "api_error",
        }
    }

    /// 机器可读的错误码
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest { .. } => "invalid_request",
            ProxyError::UnsupportedContent { .. } => "unsupported_content",
            ProxyError::ToolCallCorrespondence { .. } => "tool_call_correspondence",
            ProxyError::ToolCallLimitExceeded { .. } => "tool_call_limit_exceeded",
            ProxyError::BackendTransport {
                timed_out: true, ..
            } => "backend_timeout",
            ProxyError::BackendTransport { .. } => "backend_transport_error",
            ProxyError::BackendStatus { .. } => "backend_http_error",
            ProxyError::BackendProtocol(_) => "backend_protocol_error",
        }
    }

    /// 出错的字段路径（如 `messages[3].tool_call_id`）
    pub fn param(&self) -> Option<&str> {
        match self {
            ProxyError::InvalidRequest { param, .. } => param.as_deref(),
            ProxyError::UnsupportedContent { param, .. }
            | ProxyError::ToolCallCorrespondence { param, .. }
            | ProxyError::ToolCallLimitExceeded { param, .. } => Some(param),
            _ => None,
        }
    }

    /// 只有传输层错误允许调用方重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::BackendTransport { .. })
    }

    /// 转换为 JSON 错误响应
    pub fn to_json(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "message": self.to_string(),
            "type": self.error_type(),
            "code": self.code(),
        });
        if let Some(param) = self.param() {
            error["param"] = serde_json::Value::String(param.to_string());
        }
        serde_json::json!({ "error": error })
    }

    /// 记录带上下文的错误日志
    pub fn log_with_context(&self, request_id: &str, model: &str) {
        tracing::error!(
            request_id = %request_id,
            model = %model,
            error_type = %self.error_type(),
            error_code = %self.code(),
            error_message = %self.to_string(),
            "Request translation failed"
        );
    }
}

impl From<BackendError> for ProxyError {
    fn from(err: BackendError) -> Self {
        match (err.kind, err.status_code) {
            (BackendErrorKind::Timeout, _) => ProxyError::BackendTransport {
                message: err.message,
                timed_out: true,
            },
            (BackendErrorKind::NetworkError, _) => ProxyError::BackendTransport {
                message: err.message,
                timed_out: false,
            },
            (BackendErrorKind::InvalidResponse, _) => ProxyError::BackendProtocol(err.message),
            (_, Some(status)) => ProxyError::BackendStatus {
                status,
                body: err.message,
            },
            (_, None) => ProxyError::BackendTransport {
                message: err.message,
                timed_out: false,
            },
        }
    }
}
