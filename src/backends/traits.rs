//! 后端调用层 Trait 定义
//!
//! 定义后端 HTTP 调用的核心接口。
//! 后端层只负责 HTTP 请求/响应，不包含任何协议转换逻辑。

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// 字节流类型
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// 后端调用结果
pub type BackendResult<T> = Result<T, BackendError>;

/// 转发给后端的客户端请求头（名称小写）
pub type ForwardedHeaders = Vec<(String, String)>;

/// 后端错误类型
#[derive(Debug, Clone)]
pub struct BackendError {
    /// 错误类型
    pub kind: BackendErrorKind,
    /// 错误消息
    pub message: String,
    /// HTTP 状态码（如果有）
    pub status_code: Option<u16>,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "{} ({}): {}", self.kind, code, self.message)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for BackendError {}

/// 后端错误类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// 网络错误
    NetworkError,
    /// 请求超时
    Timeout,
    /// 后端返回非 2xx 状态码
    HttpStatus,
    /// 响应体不完整或无法读取
    InvalidResponse,
    /// 其他错误
    Other,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkError => write!(f, "NetworkError"),
            Self::Timeout => write!(f, "Timeout"),
            Self::HttpStatus => write!(f, "HttpStatus"),
            Self::InvalidResponse => write!(f, "InvalidResponse"),
            Self::Other => write!(f, "Other"),
        }
    }
}

impl BackendError {
    /// 创建新的后端错误
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    /// 后端非 2xx 响应，状态码原样转发给客户端
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::HttpStatus,
            message: message.into(),
            status_code: Some(status),
        }
    }
}

/// 后端 Trait
///
/// 定义后端 HTTP 调用的接口。
#[async_trait]
pub trait Backend: Send + Sync {
    /// 后端请求类型
    type Request: Send + Sync;

    /// 非流式调用
    ///
    /// `headers` 为需要透传的客户端请求头（如 `authorization`）。
    ///
    /// # 返回
    ///
    /// 响应的原始字节
    async fn call(&self, request: &Self::Request, headers: &[(String, String)]) -> BackendResult<Bytes>;

    /// 流式调用
    ///
    /// # 返回
    ///
    /// 字节流；丢弃该流即中止后端连接
    async fn call_stream(
        &self,
        request: &Self::Request,
        headers: &[(String, String)],
    ) -> BackendResult<ByteStream>;

    /// 获取后端名称
    fn name(&self) -> &str;

    /// 后端目标地址（用于健康检查展示）
    fn target(&self) -> &str {
        self.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new(BackendErrorKind::NetworkError, "connection refused");
        assert_eq!(format!("{}", err), "NetworkError: connection refused");

        let err = BackendError::from_status(500, "internal error");
        assert_eq!(format!("{}", err), "HttpStatus (500): internal error");
    }

    #[test]
    fn test_backend_error_from_status() {
        for status in [404, 422, 503] {
            let err = BackendError::from_status(status, "upstream said no");
            assert_eq!(err.kind, BackendErrorKind::HttpStatus);
            assert_eq!(err.status_code, Some(status));
        }
    }
}
