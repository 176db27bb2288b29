//! OpenAI 兼容 API 数据模型（客户端协议）
//!
//! 消息按 `role` 建模为封闭的枚举变体，内容为纯文本或有序的多段内容。
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// `null` 与缺省字段统一按默认值处理
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn default_call_type() -> String {
    "function".to_string()
}

// ============================================================================
// 请求
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// vLLM 扩展：是否追加生成提示
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_generation_prompt: Option<bool>,
    /// vLLM 扩展：续写最后一条消息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_final_message: Option<bool>,
    /// 未建模的顶层字段，原样透传
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    /// 使用模型和消息创建最简请求
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
            seed: None,
            presence_penalty: None,
            frequency_penalty: None,
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
            add_generation_prompt: None,
            continue_final_message: None,
            extra: Map::new(),
        }
    }

    /// 请求中声明的工具名称
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools
            .as_ref()
            .map(|tools| tools.iter().map(|t| t.function.name.as_str()).collect())
            .unwrap_or_default()
    }
}

/// 聊天消息
///
/// 以 `role` 字段作为标签的封闭变体集合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        #[serde(default, deserialize_with = "null_as_default")]
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    User {
        #[serde(default, deserialize_with = "null_as_default")]
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<MessageContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        #[serde(default, deserialize_with = "null_as_default")]
        content: MessageContent,
        tool_call_id: String,
    },
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: MessageContent::Text(text.into()),
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: MessageContent::Text(text.into()),
            name: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(MessageContent::Text(text.into())),
            tool_calls: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: None,
            tool_calls: Some(tool_calls),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Tool {
            content: MessageContent::Text(text.into()),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// 角色名称
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// 消息中的文本内容（忽略非文本段）
    pub fn get_content_text(&self) -> String {
        match self {
            Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Tool { content, .. } => content.text_lossy(),
            Self::Assistant { content, .. } => content
                .as_ref()
                .map(MessageContent::text_lossy)
                .unwrap_or_default(),
        }
    }
}

/// 消息内容：纯文本或多段内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// 拼接所有文本段，非文本段被跳过
    ///
    /// 仅用于日志与意图检测；协议转换走严格路径。
    pub fn text_lossy(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    InputAudio { input_audio: Value },
    /// 未知的内容段类型
    #[serde(other)]
    Other,
}

impl ContentPart {
    /// 内容段类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ImageUrl { .. } => "image_url",
            Self::InputAudio { .. } => "input_audio",
            Self::Other => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ============================================================================
// 工具
// ============================================================================

/// 工具定义（客户端与后端格式一致）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type", default = "default_call_type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// 工具调用
///
/// `index` 仅存在于客户端协议，跨协议边界时总是重新计算。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            index: None,
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// 参数 JSON 字符串，不做解析
    #[serde(default)]
    pub arguments: String,
}

// ============================================================================
// 非流式响应
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// 响应中是否包含任何工具调用
    pub fn has_tool_calls(&self) -> bool {
        self.choices.iter().any(|c| {
            c.message
                .tool_calls
                .as_ref()
                .is_some_and(|calls| !calls.is_empty())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

// ============================================================================
// 流式响应
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: StreamDelta,
    /// 始终序列化（未结束时为 `null`）
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_role_tagged_messages() {
        let messages: Vec<ChatMessage> = serde_json::from_value(json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": [{"type": "text", "text": "hi"}]},
            {"role": "assistant", "content": null, "tool_calls": [
                {"index": 0, "id": "call_1", "type": "function",
                 "function": {"name": "read_file", "arguments": "{\"path\":\"a\"}"}}
            ]},
            {"role": "tool", "tool_call_id": "call_1", "content": "file body"}
        ]))
        .unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role(), "system");
        assert!(matches!(
            &messages[1],
            ChatMessage::User { content: MessageContent::Parts(parts), .. } if parts.len() == 1
        ));
        match &messages[2] {
            ChatMessage::Assistant {
                content,
                tool_calls: Some(calls),
            } => {
                assert!(content.is_none());
                assert_eq!(calls[0].index, Some(0));
                assert_eq!(calls[0].function.arguments, "{\"path\":\"a\"}");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(matches!(&messages[3], ChatMessage::Tool { tool_call_id, .. } if tool_call_id == "call_1"));
    }

    #[test]
    fn test_unknown_content_part_is_kept_as_other() {
        let content: MessageContent =
            serde_json::from_value(json!([{"type": "video", "video": {}}])).unwrap();
        assert_eq!(content, MessageContent::Parts(vec![ContentPart::Other]));
    }

    #[test]
    fn test_null_content_defaults_to_empty_text() {
        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "user", "content": null})).unwrap();
        assert_eq!(msg.get_content_text(), "");
    }

    #[test]
    fn test_request_preserves_unknown_fields() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "devstral-small-2",
            "messages": [{"role": "user", "content": "hi"}],
            "stream_options": {"include_usage": true},
            "top_k": 20
        }))
        .unwrap();

        assert!(!req.stream);
        assert_eq!(req.extra.get("top_k"), Some(&json!(20)));
        let back = serde_json::to_value(&req).unwrap();
        assert_eq!(back["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_stream_chunk_serializes_null_finish_reason() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: "m".to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta: StreamDelta {
                    content: Some("Hi".to_string()),
                    ..Default::default()
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert!(value["choices"][0]["finish_reason"].is_null());
        assert!(value["choices"][0]["delta"].get("role").is_none());
        assert!(value.get("usage").is_none());
    }
}
