//! 协议数据模型
//!
//! - `openai`: 客户端使用的 OpenAI 兼容协议
//! - `mistral`: 下游推理服务使用的 Mistral 风格协议

pub mod mistral;
pub mod openai;
