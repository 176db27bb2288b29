//! Mistral 兼容后端的协议转换
//!
//! - `request`: OpenAI 请求 → Mistral 请求
//! - `response`: Mistral 响应 / 流事件 → OpenAI 格式

pub mod request;
pub mod response;

pub use request::{apply_sequence_fixups, MistralRequestTranslator, TranslatedRequest};
pub use response::MistralResponseTranslator;
