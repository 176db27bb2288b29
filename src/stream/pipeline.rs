//! 统一流处理管道
//!
//! 封装完整的流式处理流程：后端字节流 → 解析 → 重组 → 客户端 SSE
//!
//! ```ignore
//! let pipeline = StreamPipeline::new("devstral-small-2", policy);
//! let sse_stream = create_sse_stream(byte_stream, pipeline);
//! ```

use crate::backends::traits::BackendError;
use crate::policy::ModelPolicy;
use crate::stream::events::BackendEvent;
use crate::stream::parsers::MistralSseParser;
use crate::stream::reframer::{StreamOutput, StreamReframer};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::convert::Infallible;

/// 流处理管道
///
/// 将后端字节块转换为客户端 SSE 帧
pub struct StreamPipeline {
    parser: MistralSseParser,
    reframer: StreamReframer,
    request_id: String,
}

impl StreamPipeline {
    pub fn new(model: impl Into<String>, policy: ModelPolicy) -> Self {
        Self {
            parser: MistralSseParser::new(),
            reframer: StreamReframer::new(model, policy),
            request_id: String::new(),
        }
    }

    /// 设置用于日志的请求 ID
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// 处理单个字节块
    ///
    /// # 返回
    ///
    /// 生成的 SSE 帧列表
    pub fn process_chunk(&mut self, bytes: &[u8]) -> Vec<String> {
        let events = self.parser.process(bytes);
        self.reframe(&events)
    }

    /// 上游正常关闭
    pub fn finish(&mut self) -> Vec<String> {
        let events = self.parser.finish();
        let mut frames = self.reframe(&events);
        frames.extend(self.reframer.finish().iter().map(StreamOutput::to_sse));
        self.log_completion();
        frames
    }

    /// 传输错误导致的终止
    pub fn abort(&mut self, message: &str) -> Vec<String> {
        let frames = self
            .reframer
            .abort(message)
            .iter()
            .map(StreamOutput::to_sse)
            .collect();
        self.log_completion();
        frames
    }

    pub fn is_finished(&self) -> bool {
        self.reframer.is_finished()
    }

    fn reframe(&mut self, events: &[BackendEvent]) -> Vec<String> {
        let mut frames = Vec::new();
        for event in events {
            for output in self.reframer.process(event) {
                if let Some(reason) = output.finish_reason() {
                    tracing::debug!(
                        request_id = %self.request_id,
                        "[STREAM] finish_reason={}",
                        reason
                    );
                }
                frames.push(output.to_sse());
            }
        }
        frames
    }

    fn log_completion(&self) {
        tracing::info!(
            request_id = %self.request_id,
            tool_calls = self.reframer.tool_call_count(),
            warnings = self.reframer.warnings().len(),
            "[STREAM] 流式响应结束"
        );
    }
}

/// 创建流式处理的异步流
///
/// 将后端字节流转换为 SSE 字节流。传输错误不会向外传播，
/// 而是转换为 finish_reason = "error" 的结束 chunk。
/// 丢弃返回的流即丢弃后端字节流，后端连接随之中止。
pub fn create_sse_stream<S>(
    byte_stream: S,
    mut pipeline: StreamPipeline,
) -> impl Stream<Item = Result<Bytes, Infallible>>
where
    S: Stream<Item = Result<Bytes, BackendError>> + Send + 'static,
{
    async_stream::stream! {
        let mut byte_stream = std::pin::pin!(byte_stream);

        while let Some(result) = byte_stream.next().await {
            match result {
                Ok(bytes) => {
                    for frame in pipeline.process_chunk(&bytes) {
                        yield Ok(Bytes::from(frame));
                    }
                    if pipeline.is_finished() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("[STREAM] 读取后端流失败: {}", e);
                    for frame in pipeline.abort(&e.to_string()) {
                        yield Ok(Bytes::from(frame));
                    }
                    return;
                }
            }
        }

        for frame in pipeline.finish() {
            yield Ok(Bytes::from(frame));
        }
    }
}
