//! Mistral 后端响应 → OpenAI 响应

use super::tool_calls::{to_client_tool_calls, truncate_tool_calls};
use crate::models::mistral::{MistralMessage, MistralResponse};
use crate::models::openai::{
    ChatCompletionResponse, ChatMessage, Choice, MessageContent, ResponseMessage,
};
use crate::policy::ModelPolicy;

/// 后端消息还原为客户端消息
///
/// 内容还原为纯文本，工具调用按顺序编号。
pub fn denormalize_messages(messages: &[MistralMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|msg| match msg {
            MistralMessage::System { content, name } => ChatMessage::System {
                content: MessageContent::Text(content.clone()),
                name: name.clone(),
            },
            MistralMessage::User { content, name } => ChatMessage::User {
                content: MessageContent::Text(content.clone()),
                name: name.clone(),
            },
            MistralMessage::Assistant {
                content,
                tool_calls,
            } => ChatMessage::Assistant {
                content: content.clone().map(MessageContent::Text),
                tool_calls: tool_calls.as_deref().map(to_client_tool_calls),
            },
            MistralMessage::Tool {
                content,
                tool_call_id,
            } => ChatMessage::Tool {
                content: MessageContent::Text(content.clone()),
                tool_call_id: tool_call_id.clone(),
            },
        })
        .collect()
}

/// 转换非流式响应
///
/// 超出模型上限的工具调用被截断，返回的警告随响应一并交给调用方。
pub fn convert_response(
    resp: MistralResponse,
    policy: &ModelPolicy,
) -> (ChatCompletionResponse, Vec<String>) {
    let mut warnings = Vec::new();
    let created = if resp.created > 0 {
        resp.created
    } else {
        chrono::Utc::now().timestamp()
    };

    let choices = resp
        .choices
        .into_iter()
        .map(|choice| {
            let tool_calls = choice.message.tool_calls.and_then(|mut calls| {
                if calls.is_empty() {
                    return None;
                }
                if calls.len() > policy.max_tool_calls {
                    let param = format!("choices[{}].message.tool_calls", choice.index);
                    warnings.push(truncate_tool_calls(&mut calls, policy.max_tool_calls, &param));
                }
                Some(to_client_tool_calls(&calls))
            });

            Choice {
                index: choice.index,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content: choice.message.content,
                    tool_calls,
                },
                finish_reason: choice.finish_reason,
            }
        })
        .collect();

    let response = ChatCompletionResponse {
        id: resp.id,
        object: "chat.completion".to_string(),
        created,
        model: resp.model,
        choices,
        usage: resp.usage,
    };
    (response, warnings)
}
