//! 请求处理器
//!
//! 串联一次聊天补全请求的完整流程：
//!
//! ```text
//! ChatCompletionRequest
//!   → MistralRequestTranslator（校验 / 策略 / 意图检测 / 消息转换）
//!   → Backend::call | Backend::call_stream
//!   → MistralResponseTranslator | StreamPipeline
//!   → ChatCompletionResponse | SSE 字节流
//! ```

pub mod error;

pub use error::ProxyError;

use crate::backends::traits::{Backend, ForwardedHeaders};
use crate::logger::{sanitize_log_message, truncate_for_log};
use crate::models::mistral::MistralRequest;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};
use crate::policy::ModelPolicyTable;
use crate::stream::pipeline::{create_sse_stream, StreamPipeline};
use crate::translator::{
    MistralRequestTranslator, MistralResponseTranslator, RequestTranslator, TranslatedRequest,
};
use bytes::Bytes;
use futures::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// 请求体日志的最大字符数
const BODY_LOG_LIMIT: usize = 2000;

/// 客户端 SSE 字节流
pub type SseStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// 共享后端句柄
pub type SharedBackend = Arc<dyn Backend<Request = MistralRequest>>;

/// 请求上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 请求 ID
    pub request_id: String,
    /// 客户端请求的模型名
    pub original_model: String,
    /// 是否为流式请求
    pub is_stream: bool,
    /// 请求开始时间
    pub start_time: Instant,
    /// 透传给后端的客户端请求头
    pub headers: ForwardedHeaders,
}

impl RequestContext {
    pub fn new(model: String) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            original_model: model,
            is_stream: false,
            start_time: Instant::now(),
            headers: Vec::new(),
        }
    }

    pub fn with_stream(mut self, is_stream: bool) -> Self {
        self.is_stream = is_stream;
        self
    }

    pub fn with_headers(mut self, headers: ForwardedHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// 已耗时（毫秒）
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

/// 非流式处理结果
#[derive(Debug, Clone)]
pub struct TranslatedResponse {
    pub response: ChatCompletionResponse,
    /// 请求与响应两个方向累计的警告
    pub warnings: Vec<String>,
}

/// 处理结果
pub enum ProcessedResponse {
    Complete(TranslatedResponse),
    Stream {
        stream: SseStream,
        /// 请求转换阶段产生的警告
        warnings: Vec<String>,
    },
}

impl std::fmt::Debug for ProcessedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(resp) => f.debug_tuple("Complete").field(resp).finish(),
            Self::Stream { warnings, .. } => f
                .debug_struct("Stream")
                .field("warnings", warnings)
                .finish_non_exhaustive(),
        }
    }
}

/// 转换处理器
///
/// 无状态，可在多个请求间共享。
pub struct TranslationProcessor {
    backend: SharedBackend,
    translator: MistralRequestTranslator,
    log_bodies: bool,
}

impl TranslationProcessor {
    pub fn new(backend: SharedBackend, translator: MistralRequestTranslator) -> Self {
        Self {
            backend,
            translator,
            log_bodies: false,
        }
    }

    /// 是否在 debug 日志中记录请求/响应体
    pub fn with_body_logging(mut self, enabled: bool) -> Self {
        self.log_bodies = enabled;
        self
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn policies(&self) -> &ModelPolicyTable {
        self.translator.policies()
    }

    /// 请求转换
    pub fn prepare(
        &self,
        ctx: &RequestContext,
        request: ChatCompletionRequest,
    ) -> Result<TranslatedRequest, ProxyError> {
        if self.log_bodies {
            self.log_body(ctx, "客户端请求", &request);
        }

        let translated = self.translator.translate_request(request).map_err(|e| {
            e.log_with_context(&ctx.request_id, &ctx.original_model);
            e
        })?;

        tracing::info!(
            "[PROCESSOR] 请求转换完成: request_id={}, model={}, messages={}, stream={}, max_tool_calls={}",
            ctx.request_id,
            translated.request.model,
            translated.request.messages.len(),
            translated.request.stream,
            translated.policy.max_tool_calls
        );
        for warning in &translated.warnings {
            tracing::warn!("[PROCESSOR] request_id={} {}", ctx.request_id, warning);
        }
        if self.log_bodies {
            self.log_body(ctx, "后端请求", &translated.request);
        }
        Ok(translated)
    }

    /// 非流式响应转换
    ///
    /// 命中任务意图但没有工具调用时追加警告，响应内容不变。
    pub fn finish_response(
        &self,
        ctx: &RequestContext,
        translated: &TranslatedRequest,
        body: &[u8],
    ) -> Result<TranslatedResponse, ProxyError> {
        if self.log_bodies {
            tracing::debug!(
                "[PROCESSOR] request_id={} 后端响应: {}",
                ctx.request_id,
                truncate_for_log(&sanitize_log_message(&String::from_utf8_lossy(body)), BODY_LOG_LIMIT)
            );
        }

        let (response, response_warnings) = MistralResponseTranslator::new(translated.policy)
            .translate_body(body)
            .map_err(|e| {
                e.log_with_context(&ctx.request_id, &ctx.original_model);
                e
            })?;

        let mut warnings = translated.warnings.clone();
        warnings.extend(response_warnings);
        if let Some(task) = &translated.task_intent {
            if let Some(warning) = crate::detector::check_response(task, response.has_tool_calls()) {
                warnings.push(warning);
            }
        }

        Ok(TranslatedResponse { response, warnings })
    }

    /// 处理一次请求
    ///
    /// `headers` 原样透传给后端。
    pub async fn handle(
        &self,
        request: ChatCompletionRequest,
        headers: ForwardedHeaders,
    ) -> Result<ProcessedResponse, ProxyError> {
        let ctx = RequestContext::new(request.model.clone())
            .with_stream(request.stream)
            .with_headers(headers);
        let translated = self.prepare(&ctx, request)?;

        if ctx.is_stream {
            let stream = self.handle_stream(&ctx, &translated).await?;
            return Ok(ProcessedResponse::Stream {
                stream,
                warnings: translated.warnings,
            });
        }

        let body = self
            .backend
            .call(&translated.request, &ctx.headers)
            .await
            .map_err(|e| {
                let err = ProxyError::from(e);
                err.log_with_context(&ctx.request_id, &ctx.original_model);
                err
            })?;
        let result = self.finish_response(&ctx, &translated, &body)?;

        tracing::info!(
            "[PROCESSOR] 请求完成: request_id={}, backend={}, warnings={}, elapsed={}ms",
            ctx.request_id,
            self.backend.name(),
            result.warnings.len(),
            ctx.elapsed_ms()
        );
        Ok(ProcessedResponse::Complete(result))
    }

    /// 发起流式调用
    ///
    /// 后端在首字节之前失败时返回错误，之后的任何失败都以
    /// `finish_reason = "error"` 的结束 chunk 体现在流中。
    pub async fn handle_stream(
        &self,
        ctx: &RequestContext,
        translated: &TranslatedRequest,
    ) -> Result<SseStream, ProxyError> {
        let byte_stream = self
            .backend
            .call_stream(&translated.request, &ctx.headers)
            .await
            .map_err(|e| {
                let err = ProxyError::from(e);
                err.log_with_context(&ctx.request_id, &ctx.original_model);
                err
            })?;

        tracing::info!(
            "[PROCESSOR] 流式响应开始: request_id={}, backend={}, elapsed={}ms",
            ctx.request_id,
            self.backend.name(),
            ctx.elapsed_ms()
        );

        let pipeline = StreamPipeline::new(translated.request.model.clone(), translated.policy)
            .with_request_id(ctx.request_id.clone());
        Ok(Box::pin(create_sse_stream(byte_stream, pipeline)))
    }

    fn log_body<T: serde::Serialize>(&self, ctx: &RequestContext, label: &str, body: &T) {
        match serde_json::to_string(body) {
            Ok(json) => tracing::debug!(
                "[PROCESSOR] request_id={} {}: {}",
                ctx.request_id,
                label,
                truncate_for_log(&sanitize_log_message(&json), BODY_LOG_LIMIT)
            ),
            Err(e) => tracing::debug!("[PROCESSOR] {} 序列化失败: {}", label, e),
        }
    }
}

#[cfg(test)]
mod tests;
