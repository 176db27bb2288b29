//! 流式数据解析器
//!
//! 解析后端的流式响应格式，输出统一的 `BackendEvent`。

pub mod mistral_sse;

pub use mistral_sse::MistralSseParser;
