//! 聊天补全处理器

use crate::backends::traits::ForwardedHeaders;
use crate::models::openai::ChatCompletionRequest;
use crate::processor::{ProcessedResponse, ProxyError};
use crate::server::{attach_warnings, AppState};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::error::Category;
use std::sync::Arc;

/// 不透传给后端的请求头（由代理自身的 HTTP 客户端重新生成）
const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "content-type",
    "accept-encoding",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "upgrade",
];

/// `POST /v1/chat/completions`
///
/// 请求体自行解析，缺少 Content-Type 的客户端同样可以调用。
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("[SERVER] 请求体解析失败: {}", e);
            return body_error(&e).into_response();
        }
    };

    match state.processor.handle(request, forwarded_headers(&headers)).await {
        Ok(ProcessedResponse::Complete(result)) => {
            let mut response = Json(result.response).into_response();
            attach_warnings(response.headers_mut(), &result.warnings);
            response
        }
        Ok(ProcessedResponse::Stream { stream, warnings }) => {
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive")
                .header("X-Accel-Buffering", "no")
                .body(Body::from_stream(stream))
                .unwrap_or_else(|e| {
                    tracing::error!("[SERVER] 构建流式响应失败: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                });
            attach_warnings(response.headers_mut(), &warnings);
            response
        }
        Err(e) => e.into_response(),
    }
}

/// 区分 JSON 语法错误与字段类型错误
fn body_error(e: &serde_json::Error) -> ProxyError {
    match e.classify() {
        Category::Data => ProxyError::invalid_request(format!("请求体字段无效: {}", e), None),
        Category::Syntax | Category::Eof | Category::Io => {
            ProxyError::invalid_request(format!("请求体不是合法的 JSON: {}", e), None)
        }
    }
}

/// 提取需要透传给后端的请求头
///
/// 跳过逐跳头部和非 UTF-8 值。
pub fn forwarded_headers(headers: &HeaderMap) -> ForwardedHeaders {
    headers
        .iter()
        .filter(|(name, _)| !SKIPPED_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_headers_skip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("proxy.local:8080"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-local"));
        headers.insert("x-request-source", HeaderValue::from_static("ide"));

        let mut forwarded = forwarded_headers(&headers);
        forwarded.sort();
        assert_eq!(
            forwarded,
            vec![
                ("authorization".to_string(), "Bearer sk-local".to_string()),
                ("x-request-source".to_string(), "ide".to_string()),
            ]
        );
    }

    #[test]
    fn test_body_error_wording() {
        let syntax = serde_json::from_slice::<ChatCompletionRequest>(b"{not json").unwrap_err();
        assert!(body_error(&syntax).to_string().contains("不是合法的 JSON"));

        let data = serde_json::from_slice::<ChatCompletionRequest>(
            br#"{"model": "devstral", "messages": [{"role": "robot", "content": "hi"}]}"#,
        )
        .unwrap_err();
        assert!(body_error(&data).to_string().contains("字段无效"));
    }
}
