//! OpenAI → Mistral 请求转换器

use crate::config::TranslationConfig;
use crate::converter::convert_messages;
use crate::detector::{self, TaskMatch};
use crate::models::mistral::{MistralMessage, MistralRequest};
use crate::models::openai::ChatCompletionRequest;
use crate::policy::{ModelPolicy, ModelPolicyTable};
use crate::processor::error::ProxyError;
use crate::translator::traits::RequestTranslator;
use serde_json::Value;
use std::sync::Arc;

/// 占位消息内容（后端模板要求角色交替）
const PLACEHOLDER_CONTENT: &str = " ";

/// 请求转换结果
#[derive(Debug, Clone)]
pub struct TranslatedRequest {
    pub request: MistralRequest,
    /// 生效的模型策略
    pub policy: ModelPolicy,
    /// 命中的任务执行意图
    pub task_intent: Option<TaskMatch>,
    /// 非致命问题
    pub warnings: Vec<String>,
}

/// OpenAI → Mistral 请求转换器
#[derive(Debug, Clone)]
pub struct MistralRequestTranslator {
    policies: Arc<ModelPolicyTable>,
    options: TranslationConfig,
}

impl Default for MistralRequestTranslator {
    fn default() -> Self {
        Self::new(Arc::new(ModelPolicyTable::default()), TranslationConfig::default())
    }
}

impl MistralRequestTranslator {
    pub fn new(policies: Arc<ModelPolicyTable>, options: TranslationConfig) -> Self {
        Self { policies, options }
    }

    pub fn policies(&self) -> &ModelPolicyTable {
        &self.policies
    }
}

impl RequestTranslator for MistralRequestTranslator {
    type Input = ChatCompletionRequest;
    type Output = TranslatedRequest;
    type Error = ProxyError;

    fn translate_request(&self, request: ChatCompletionRequest) -> Result<TranslatedRequest, ProxyError> {
        let model = request.model.trim().to_string();
        if model.is_empty() {
            return Err(ProxyError::invalid_request("model 不能为空", Some("model")));
        }
        if request.messages.is_empty() {
            return Err(ProxyError::invalid_request("messages 不能为空", Some("messages")));
        }
        // 流式重组只支持单个候选
        if request.stream && request.extra.get("n").and_then(Value::as_u64).unwrap_or(1) > 1 {
            return Err(ProxyError::invalid_request("流式响应不支持 n > 1", Some("n")));
        }

        let tool_names = request.tool_names();
        if !tool_names.is_empty() {
            tracing::info!("[TRANSLATE] 发现 {} 个工具: {:?}", tool_names.len(), tool_names);
        }

        let policy = self.policies.policy(&model);
        let task_intent = if self.options.task_directive {
            detector::detect_in_messages(&request.messages)
        } else {
            None
        };

        let converted = convert_messages(&request.messages, &policy, self.options.tool_messages)?;
        let mut messages = converted.messages;
        if task_intent.is_some() {
            detector::inject_directive(&mut messages);
            tracing::info!("[TRANSLATE] 已注入工具调用指令 model={}", model);
        }

        let mut continue_final_message = request.continue_final_message;
        if request.add_generation_prompt == Some(true) && continue_final_message == Some(true) {
            tracing::debug!(
                "[TRANSLATE] add_generation_prompt 与 continue_final_message 同时设置，移除 continue_final_message"
            );
            continue_final_message = None;
        }

        if self.options.sequence_fixups {
            apply_sequence_fixups(
                &mut messages,
                request.add_generation_prompt,
                continue_final_message,
            );
        }

        let mut extra = request.extra;
        if !request.stream && self.options.strip_stream_options {
            let removed: Vec<String> = extra
                .keys()
                .filter(|k| is_stream_option(k))
                .cloned()
                .collect();
            if !removed.is_empty() {
                tracing::debug!("[TRANSLATE] 非流式请求，移除流式参数: {:?}", removed);
                extra.retain(|k, _| !is_stream_option(k));
            }
        }

        let parallel_tool_calls = if !policy.supports_parallel_tools && request.tools.is_some() {
            Some(false)
        } else {
            request.parallel_tool_calls
        };

        tracing::debug!(
            "[TRANSLATE] model={} 消息数 {} -> {} stream={} tools={}",
            model,
            request.messages.len(),
            messages.len(),
            request.stream,
            request.tools.as_ref().map_or(0, Vec::len)
        );
        if let Some(last) = messages.last() {
            tracing::debug!(
                "[TRANSLATE] 最后一条消息 role={} 内容: {}",
                last.role(),
                last.content_preview(100)
            );
        }

        Ok(TranslatedRequest {
            request: MistralRequest {
                model,
                messages,
                stream: request.stream,
                temperature: request.temperature,
                top_p: request.top_p,
                max_tokens: request.max_tokens.or(Some(policy.default_max_tokens)),
                stop: request.stop,
                seed: request.seed,
                presence_penalty: request.presence_penalty,
                frequency_penalty: request.frequency_penalty,
                tools: request.tools,
                tool_choice: request.tool_choice,
                parallel_tool_calls,
                add_generation_prompt: request.add_generation_prompt,
                continue_final_message,
                extra,
            },
            policy,
            task_intent,
            warnings: converted.warnings,
        })
    }
}

/// 非流式请求中需要移除的流式参数（大小写不敏感，`stream` 本身除外）
fn is_stream_option(key: &str) -> bool {
    key != "stream" && key.to_ascii_lowercase().contains("stream")
}

/// 后端消息序列修正
///
/// - 位于末尾或紧跟 user 消息的 tool 消息后插入占位 assistant 消息
/// - 最后一条是 assistant 且需要生成提示时追加占位 user 消息
pub fn apply_sequence_fixups(
    messages: &mut Vec<MistralMessage>,
    add_generation_prompt: Option<bool>,
    continue_final_message: Option<bool>,
) {
    let mut i = 0;
    while i < messages.len() {
        if matches!(messages[i], MistralMessage::Tool { .. }) {
            let needs_assistant = match messages.get(i + 1) {
                None => true,
                Some(next) => matches!(next, MistralMessage::User { .. }),
            };
            if needs_assistant {
                messages.insert(
                    i + 1,
                    MistralMessage::Assistant {
                        content: Some(PLACEHOLDER_CONTENT.to_string()),
                        tool_calls: None,
                    },
                );
                i += 1;
            }
        }
        i += 1;
    }

    let ends_with_assistant = matches!(messages.last(), Some(MistralMessage::Assistant { .. }));
    if ends_with_assistant
        && add_generation_prompt != Some(false)
        && continue_final_message != Some(true)
    {
        messages.push(MistralMessage::user(PLACEHOLDER_CONTENT));
    }
}
