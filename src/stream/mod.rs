//! 流式处理层
//!
//! ```text
//! 后端字节流 ──> [MistralSseParser] ──> BackendEvent ──> [StreamReframer] ──> OpenAI SSE
//! ```
//!
//! - `events`: 后端流事件定义 (`BackendEvent`)
//! - `parsers`: 后端 SSE 解析器
//! - `reframer`: 事件到客户端 chunk 的重组
//! - `pipeline`: 解析 + 重组的组合，以及异步 SSE 流

pub mod events;
pub mod parsers;
pub mod pipeline;
pub mod reframer;

pub use events::BackendEvent;
pub use parsers::MistralSseParser;
pub use pipeline::{create_sse_stream, StreamPipeline};
pub use reframer::{reframe_events, Reframe, StreamOutput, StreamReframer};
