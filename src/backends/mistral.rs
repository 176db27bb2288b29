//! Mistral 风格推理服务后端
//!
//! 通过 HTTP 调用 vLLM 等 Mistral 兼容服务的 `/v1/chat/completions`。

use super::traits::{Backend, BackendError, BackendErrorKind, BackendResult, ByteStream};
use crate::config::BackendConfig;
use crate::models::mistral::MistralRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;

/// 基于 reqwest 的后端实现
pub struct MistralHttpBackend {
    client: Client,
    base_url: String,
    endpoint: String,
    timeout: Option<Duration>,
}

impl MistralHttpBackend {
    /// 按配置创建后端（连接池在所有请求间共享）
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                BackendError::new(BackendErrorKind::Other, format!("创建 HTTP 客户端失败: {}", e))
            })?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            endpoint: build_endpoint(&base_url),
            base_url,
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(
        &self,
        request: &MistralRequest,
        headers: &[(String, String)],
    ) -> BackendResult<reqwest::Response> {
        let mut builder = self.client.post(&self.endpoint);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut builder = builder.json(request);
        // 流式请求不设总超时，否则长输出会被中途切断
        if !request.stream {
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }
        }

        tracing::debug!(
            "[BACKEND] POST {} model={} stream={} messages={} forwarded_headers={}",
            self.endpoint,
            request.model,
            request.stream,
            request.messages.len(),
            headers.len()
        );

        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!("[BACKEND] 后端返回错误状态 {}: {}", status, body);
            return Err(BackendError::from_status(status.as_u16(), body));
        }
        Ok(resp)
    }
}

/// 兼容带或不带 `/v1` 的 base_url
fn build_endpoint(base_url: &str) -> String {
    if base_url.ends_with("/v1") {
        format!("{}/chat/completions", base_url)
    } else {
        format!("{}/v1/chat/completions", base_url)
    }
}

/// reqwest 错误分类
fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    let kind = if err.is_timeout() {
        BackendErrorKind::Timeout
    } else if err.is_connect() || err.is_request() {
        BackendErrorKind::NetworkError
    } else if err.is_body() || err.is_decode() {
        BackendErrorKind::InvalidResponse
    } else {
        BackendErrorKind::Other
    };
    BackendError::new(kind, err.to_string())
}

#[async_trait]
impl Backend for MistralHttpBackend {
    type Request = MistralRequest;

    async fn call(&self, request: &MistralRequest, headers: &[(String, String)]) -> BackendResult<Bytes> {
        let resp = self.send(request, headers).await?;
        resp.bytes().await.map_err(map_reqwest_error)
    }

    async fn call_stream(
        &self,
        request: &MistralRequest,
        headers: &[(String, String)],
    ) -> BackendResult<ByteStream> {
        let resp = self.send(request, headers).await?;
        let stream = resp.bytes_stream().map(|chunk| chunk.map_err(map_reqwest_error));
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "mistral"
    }

    fn target(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_endpoint() {
        assert_eq!(
            build_endpoint("http://127.0.0.1:8000"),
            "http://127.0.0.1:8000/v1/chat/completions"
        );
        assert_eq!(
            build_endpoint("http://gpu-box:8000/v1"),
            "http://gpu-box:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let backend = MistralHttpBackend::new(&config).unwrap();
        assert_eq!(backend.target(), "http://localhost:8000");
        assert_eq!(backend.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(backend.name(), "mistral");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        // 端口 1 上通常没有服务
        let config = BackendConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            connect_timeout_secs: 2,
            ..Default::default()
        };
        let backend = MistralHttpBackend::new(&config).unwrap();
        let request: MistralRequest = serde_json::from_value(serde_json::json!({
            "model": "devstral",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        let err = backend.call(&request, &[]).await.unwrap_err();
        assert!(matches!(
            err.kind,
            BackendErrorKind::NetworkError | BackendErrorKind::Timeout
        ));
    }
}
