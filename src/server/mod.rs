//! HTTP 服务器
//!
//! - `POST /v1/chat/completions`: 协议转换入口
//! - `GET /health`: 健康检查
//! - `GET /`: 服务信息

pub mod handlers;

use crate::processor::{ProxyError, TranslationProcessor};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// 警告响应头
pub const WARNING_HEADER: &str = "x-proxy-warning";

/// 应用状态
pub struct AppState {
    pub processor: Arc<TranslationProcessor>,
    pub start_time: Instant,
    pub debug_mode: bool,
}

impl AppState {
    pub fn new(processor: Arc<TranslationProcessor>, debug_mode: bool) -> Self {
        Self {
            processor,
            start_time: Instant::now(),
            debug_mode,
        }
    }
}

/// 构建路由
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))
        .with_state(state)
}

/// 代理服务器
pub struct ProxyServer {
    state: Arc<AppState>,
}

impl ProxyServer {
    pub fn new(processor: Arc<TranslationProcessor>, debug_mode: bool) -> Self {
        Self {
            state: Arc::new(AppState::new(processor, debug_mode)),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// 监听并服务，收到 Ctrl-C 后优雅退出
    pub async fn start(&self, host: &str, port: u16) -> anyhow::Result<()> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("绑定地址 {} 失败: {}", addr, e))?;

        tracing::info!(
            "[SERVER] 服务已启动: http://{} -> {}",
            addr,
            self.state.processor.backend().target()
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("[SERVER] 服务已停止");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[SERVER] 监听退出信号失败: {}", e);
        return;
    }
    tracing::info!("[SERVER] 收到退出信号，正在关闭");
}

/// 将警告写入响应头，每条警告一个头部值
///
/// 非可见 ASCII 字符替换为 `?`。
pub fn attach_warnings(headers: &mut HeaderMap, warnings: &[String]) {
    for warning in warnings {
        let sanitized: String = warning
            .chars()
            .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' })
            .collect();
        if let Ok(value) = HeaderValue::from_str(&sanitized) {
            headers.append(WARNING_HEADER, value);
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
        (status, Json(self.to_json())).into_response()
    }
}
