//! 工具调用转码
//!
//! - 客户端 → 后端：去掉 `index`，`id`/`type`/函数名/参数原样保留
//! - 后端 → 客户端：按出现顺序从 0 重新编号 `index`
//! - 参数始终是不透明字符串，从不解析

use crate::models::mistral::{MistralFunctionCall, MistralToolCall};
use crate::models::openai::{ChatMessage, FunctionCall, ToolCall};
use crate::policy::ModelPolicy;
use crate::processor::error::ProxyError;
use std::collections::HashSet;

pub fn to_backend_tool_call(call: &ToolCall) -> MistralToolCall {
    MistralToolCall {
        id: call.id.clone(),
        call_type: call.call_type.clone(),
        function: MistralFunctionCall {
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        },
    }
}

pub fn to_backend_tool_calls(calls: &[ToolCall]) -> Vec<MistralToolCall> {
    calls.iter().map(to_backend_tool_call).collect()
}

/// 后端工具调用转为客户端格式，`index` 取出现顺序
pub fn to_client_tool_calls(calls: &[MistralToolCall]) -> Vec<ToolCall> {
    calls
        .iter()
        .enumerate()
        .map(|(index, call)| ToolCall {
            index: Some(index as u32),
            id: call.id.clone(),
            call_type: call.call_type.clone(),
            function: FunctionCall {
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            },
        })
        .collect()
}

/// 校验 tool 消息与之前的工具调用一一对应
///
/// 每条 tool 消息的 `tool_call_id` 必须引用之前某条 assistant 消息发出的调用；
/// 没有收到结果的调用只记录警告。
pub fn validate_correspondence(messages: &[ChatMessage]) -> Result<(), ProxyError> {
    let mut emitted: Vec<&str> = Vec::new();
    let mut answered: HashSet<&str> = HashSet::new();

    for (i, msg) in messages.iter().enumerate() {
        match msg {
            ChatMessage::Assistant {
                tool_calls: Some(calls),
                ..
            } => {
                emitted.extend(calls.iter().map(|c| c.id.as_str()));
            }
            ChatMessage::Tool { tool_call_id, .. } => {
                if !emitted.contains(&tool_call_id.as_str()) {
                    return Err(ProxyError::ToolCallCorrespondence {
                        tool_call_id: tool_call_id.clone(),
                        param: format!("messages[{}].tool_call_id", i),
                    });
                }
                answered.insert(tool_call_id.as_str());
            }
            _ => {}
        }
    }

    let unanswered: Vec<&str> = emitted
        .into_iter()
        .filter(|id| !answered.contains(id))
        .collect();
    if !unanswered.is_empty() {
        tracing::warn!(
            "[TOOL_CALLS] {} 个工具调用没有对应的结果: {:?}",
            unanswered.len(),
            unanswered
        );
    }
    Ok(())
}

/// 应用单轮工具调用上限
///
/// 严格模式下超限返回 `ToolCallLimitExceeded`；否则截断并返回警告文本。
pub fn enforce_tool_call_limit<T>(
    calls: &mut Vec<T>,
    policy: &ModelPolicy,
    param: &str,
) -> Result<Option<String>, ProxyError> {
    let count = calls.len();
    if count <= policy.max_tool_calls {
        return Ok(None);
    }
    if policy.strict_validation {
        return Err(ProxyError::ToolCallLimitExceeded {
            count,
            max: policy.max_tool_calls,
            param: param.to_string(),
        });
    }
    Ok(Some(truncate_tool_calls(calls, policy.max_tool_calls, param)))
}

/// 截断到上限并返回警告文本（不考虑严格模式）
pub fn truncate_tool_calls<T>(calls: &mut Vec<T>, max: usize, param: &str) -> String {
    let count = calls.len();
    calls.truncate(max);
    let warning = format!(
        "{}: {} tool calls exceed the model limit of {}, extra calls were dropped",
        param, count, max
    );
    tracing::warn!("[TOOL_CALLS] {}", warning);
    warning
}
