//! 任务执行意图检测
//!
//! 对最新一条 user 消息做大小写无关的子串匹配。命中时由请求转换器在
//! system 消息中注入指令，要求后端调用工具而不是只做文字描述。
//!
//! 这是启发式规则，只对固定短语表负责。

use crate::models::mistral::MistralMessage;
use crate::models::openai::ChatMessage;

/// 命中短语对应的意图类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskIntent {
    /// 逐项完成给定清单
    CompleteItems,
    /// 实现给定内容
    Implement,
    /// 执行任务
    Execute,
    /// 继续推进
    Proceed,
}

/// 有序短语表，按顺序取第一个命中项
pub static TASK_PHRASES: &[(&str, TaskIntent)] = &[
    ("do these items", TaskIntent::CompleteItems),
    ("do the following", TaskIntent::CompleteItems),
    ("complete these tasks", TaskIntent::CompleteItems),
    ("fix these", TaskIntent::CompleteItems),
    ("implement these", TaskIntent::Implement),
    ("implement the following", TaskIntent::Implement),
    ("start implementing", TaskIntent::Implement),
    ("go ahead and implement", TaskIntent::Implement),
    ("execute these tasks", TaskIntent::Execute),
    ("execute the plan", TaskIntent::Execute),
    ("run these commands", TaskIntent::Execute),
    ("apply these changes", TaskIntent::Execute),
    ("proceed with", TaskIntent::Proceed),
    ("go ahead with", TaskIntent::Proceed),
    ("continue with the implementation", TaskIntent::Proceed),
];

/// 注入到 system 消息的指令
pub const TASK_EXECUTION_DIRECTIVE: &str = "[CRITICAL INSTRUCTION] The user is asking you to carry out tasks. You MUST perform them by calling the provided tools. Do NOT only describe what you would do. Call a tool function immediately.";

/// 命中结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMatch {
    pub phrase: &'static str,
    pub intent: TaskIntent,
}

/// 检测文本中的任务执行意图
pub fn detect_task_intent(text: &str) -> Option<TaskMatch> {
    let lowered = text.to_lowercase();
    TASK_PHRASES
        .iter()
        .find(|(phrase, _)| lowered.contains(phrase))
        .map(|&(phrase, intent)| TaskMatch { phrase, intent })
}

pub fn is_execution_request(text: &str) -> bool {
    detect_task_intent(text).is_some()
}

/// 最新一条 user 消息的文本
pub fn latest_user_text(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| matches!(m, ChatMessage::User { .. }))
        .map(ChatMessage::get_content_text)
}

/// 检测一组客户端消息
pub fn detect_in_messages(messages: &[ChatMessage]) -> Option<TaskMatch> {
    let text = latest_user_text(messages)?;
    let matched = detect_task_intent(&text)?;
    tracing::info!(
        "[DETECTOR] 检测到任务执行意图: phrase=\"{}\" intent={:?}",
        matched.phrase,
        matched.intent
    );
    Some(matched)
}

/// 注入工具调用指令
///
/// 追加到开头的 system 消息；没有 system 消息时插入一条新的。
pub fn inject_directive(messages: &mut Vec<MistralMessage>) {
    match messages.first_mut() {
        Some(MistralMessage::System { content, .. }) => {
            if content.contains(TASK_EXECUTION_DIRECTIVE) {
                return;
            }
            if !content.is_empty() {
                content.push_str("\n\n");
            }
            content.push_str(TASK_EXECUTION_DIRECTIVE);
        }
        _ => messages.insert(0, MistralMessage::system(TASK_EXECUTION_DIRECTIVE)),
    }
}

/// 事后检查：命中意图但响应中没有工具调用时返回警告
///
/// 响应本身不做修改。
pub fn check_response(matched: &TaskMatch, has_tool_calls: bool) -> Option<String> {
    if has_tool_calls {
        return None;
    }
    let warning = format!(
        "task execution was requested (\"{}\") but the response contains no tool calls",
        matched.phrase
    );
    tracing::warn!("[DETECTOR] {}", warning);
    Some(warning)
}
