//! 协议转换模块
//!
//! - `openai_to_mistral`: 客户端消息 → 后端消息
//! - `mistral_to_openai`: 后端消息/响应 → 客户端格式
//! - `tool_calls`: 工具调用转码、对应关系校验与数量上限

pub mod mistral_to_openai;
pub mod openai_to_mistral;
pub mod tool_calls;

pub use mistral_to_openai::{convert_response, denormalize_messages};
pub use openai_to_mistral::{convert_messages, normalize_content, ConvertedMessages, ToolMessagePolicy};
