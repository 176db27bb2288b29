//! 后端调用层
//!
//! 提供与推理服务的 HTTP 通信能力。
//! 后端层只负责 HTTP 请求/响应，不包含任何协议转换逻辑。
//!
//! ```text
//! backends/
//! ├── traits.rs          # Backend trait 定义
//! └── mistral.rs         # Mistral 兼容推理服务（vLLM 等）
//! ```

pub mod mistral;
pub mod traits;

pub use mistral::MistralHttpBackend;
pub use traits::{Backend, BackendError, BackendErrorKind, BackendResult, ByteStream};

#[cfg(test)]
pub mod mock;
