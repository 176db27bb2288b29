//! OpenAI 消息 → Mistral 后端消息
//!
//! 后端消息内容只能是纯文本：多段纯文本内容以换行合并，
//! 含有图片、音频等非文本段时直接报错，不做静默丢弃。

use super::tool_calls::{enforce_tool_call_limit, to_backend_tool_calls, validate_correspondence};
use crate::models::mistral::MistralMessage;
use crate::models::openai::{ChatMessage, ContentPart, MessageContent};
use crate::policy::ModelPolicy;
use crate::processor::error::ProxyError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// tool 角色消息的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMessagePolicy {
    /// 作为后端 `tool` 消息转发
    #[default]
    Keep,
    /// 丢弃
    Drop,
    /// 合并到下一条 user 消息
    Fold,
}

/// 消息转换结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertedMessages {
    pub messages: Vec<MistralMessage>,
    /// 非致命问题（例如工具调用被截断）
    pub warnings: Vec<String>,
}

/// 将消息内容合并为纯文本
///
/// `message_index` 仅用于错误中的字段路径。
pub fn normalize_content(
    content: &MessageContent,
    message_index: usize,
) -> Result<String, ProxyError> {
    match content {
        MessageContent::Text(text) => Ok(text.clone()),
        MessageContent::Parts(parts) => {
            let mut texts = Vec::with_capacity(parts.len());
            for (j, part) in parts.iter().enumerate() {
                match part {
                    ContentPart::Text { text } => texts.push(text.as_str()),
                    other => {
                        return Err(ProxyError::UnsupportedContent {
                            kind: other.kind().to_string(),
                            param: format!("messages[{}].content[{}]", message_index, j),
                        })
                    }
                }
            }
            Ok(texts.join("\n"))
        }
    }
}

/// 转换客户端消息列表
///
/// 不改变其余消息的相对顺序；只有 `Fold` 模式会合成新的 user 消息。
pub fn convert_messages(
    messages: &[ChatMessage],
    policy: &ModelPolicy,
    tool_messages: ToolMessagePolicy,
) -> Result<ConvertedMessages, ProxyError> {
    validate_correspondence(messages)?;

    let mut out = ConvertedMessages::default();
    let mut folded = FoldBuffer::default();
    // 被截断的工具调用，其结果消息一并丢弃
    let mut truncated_ids: HashSet<String> = HashSet::new();

    for (i, msg) in messages.iter().enumerate() {
        match msg {
            ChatMessage::System { content, name } => {
                out.messages.push(MistralMessage::System {
                    content: normalize_content(content, i)?,
                    name: name.clone(),
                });
            }
            ChatMessage::User { content, name } => {
                let text = normalize_content(content, i)?;
                let content = match folded.take() {
                    Some(results) if text.is_empty() => results,
                    Some(results) => format!("{}\n\n{}", results, text),
                    None => text,
                };
                out.messages.push(MistralMessage::User {
                    content,
                    name: name.clone(),
                });
            }
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                if let Some(results) = folded.take() {
                    out.messages.push(MistralMessage::user(results));
                }

                let content = match content {
                    Some(c) => Some(normalize_content(c, i)?),
                    None => None,
                }
                .filter(|text| !text.is_empty());

                let tool_calls = match tool_calls {
                    Some(calls) if !calls.is_empty() => {
                        let mut calls = calls.clone();
                        let param = format!("messages[{}].tool_calls", i);
                        if let Some(warning) = enforce_tool_call_limit(&mut calls, policy, &param)? {
                            out.warnings.push(warning);
                            truncated_ids.extend(
                                tool_calls
                                    .iter()
                                    .flatten()
                                    .skip(calls.len())
                                    .map(|c| c.id.clone()),
                            );
                        }
                        Some(to_backend_tool_calls(&calls))
                    }
                    _ => None,
                };

                if content.is_none() && tool_calls.is_none() {
                    tracing::debug!("[TRANSLATE] 丢弃空的 assistant 消息 messages[{}]", i);
                    continue;
                }
                out.messages.push(MistralMessage::Assistant {
                    content,
                    tool_calls,
                });
            }
            ChatMessage::Tool {
                content,
                tool_call_id,
            } => {
                let content = normalize_content(content, i)?;
                if truncated_ids.contains(tool_call_id) {
                    tracing::warn!(
                        "[TRANSLATE] 丢弃被截断工具调用的结果 messages[{}] ({})",
                        i,
                        tool_call_id
                    );
                    continue;
                }
                match tool_messages {
                    ToolMessagePolicy::Keep => out.messages.push(MistralMessage::Tool {
                        content,
                        tool_call_id: tool_call_id.clone(),
                    }),
                    ToolMessagePolicy::Drop => {
                        tracing::debug!(
                            "[TRANSLATE] 丢弃 tool 消息 messages[{}] ({})",
                            i,
                            tool_call_id
                        );
                    }
                    ToolMessagePolicy::Fold => folded.push(tool_call_id, &content),
                }
            }
        }
    }

    if let Some(results) = folded.take() {
        out.messages.push(MistralMessage::user(results));
    }

    Ok(out)
}

/// Fold 模式下待合并的工具结果
#[derive(Default)]
struct FoldBuffer {
    entries: Vec<String>,
}

impl FoldBuffer {
    fn push(&mut self, tool_call_id: &str, content: &str) {
        self.entries
            .push(format!("[Tool result {}]\n{}", tool_call_id, content));
    }

    fn take(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.entries).join("\n\n"))
    }
}
