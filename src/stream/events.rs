//! 后端流事件类型
//!
//! 定义流式传输的中间表示，用于解耦解析器 (parsers) 和重组器 (reframer)：
//!
//! - Parsers 把后端 SSE 字节解析为 `BackendEvent`
//! - Reframer 消费 `BackendEvent` 生成客户端 chunk
//!
//! 测试可以直接构造事件序列而无需真实的字节流。

use crate::models::openai::Usage;
use serde::{Deserialize, Serialize};

/// 后端流事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendEvent {
    /// 响应开始（首个携带 ID 的 chunk）
    Start {
        id: String,
        model: String,
        created: Option<i64>,
    },

    /// 文本内容增量
    TextDelta { text: String },

    /// 工具调用片段
    ///
    /// `id` 只在调用的首个片段出现；后续片段靠 `backend_index` 关联。
    ToolCallDelta {
        id: Option<String>,
        backend_index: Option<u32>,
        name: Option<String>,
        /// 参数增量（部分 JSON 字符串）
        arguments: String,
    },

    /// 后端报告的结束原因
    Finish { reason: String },

    /// Token 使用统计
    Usage(Usage),

    /// 后端正常结束信号（`data: [DONE]`）
    Done,

    /// 流中的错误（后端错误载荷或无法解析的数据）
    Error { message: String },
}

impl BackendEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        Self::Finish {
            reason: reason.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
