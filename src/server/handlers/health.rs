//! 健康检查与服务信息

use crate::server::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

const PROXY_NAME: &str = "devstral-proxy";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub proxy: &'static str,
    pub version: &'static str,
    /// 运行时长（秒）
    pub uptime: u64,
    pub backend_target: String,
    pub debug_mode: bool,
    pub supported_models: Vec<String>,
    pub timestamp: String,
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        proxy: PROXY_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.start_time.elapsed().as_secs(),
        backend_target: state.processor.backend().target().to_string(),
        debug_mode: state.debug_mode,
        supported_models: state.processor.policies().supported_models(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /`
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": PROXY_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "OpenAI-compatible proxy for Mistral-format inference backends",
        "status": "running",
        "links": {
            "health": "/health",
            "chat_completions": "/v1/chat/completions"
        }
    }))
}
