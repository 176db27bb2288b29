//! 流式响应重组器
//!
//! 将 `BackendEvent` 序列转换为 OpenAI `chat.completion.chunk` 序列。
//!
//! # 输出格式
//!
//! ```text
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","created":1234567890,"model":"devstral","choices":[{"index":0,"delta":{"role":"assistant","content":"Hello"},"finish_reason":null}]}
//!
//! data: {"id":"chatcmpl-xxx",...,"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//! ```
//!
//! 每个响应恰好以一个带 finish_reason 的 chunk 和一个 `[DONE]` 结束，
//! 之后不再输出任何内容。

use crate::models::openai::{
    ChatCompletionChunk, FunctionCallDelta, StreamChoice, StreamDelta, ToolCallDelta, Usage,
};
use crate::policy::ModelPolicy;
use crate::stream::events::BackendEvent;
use std::collections::{HashMap, HashSet, VecDeque};

/// 重组器输出
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutput {
    Chunk(ChatCompletionChunk),
    /// 终止标记 `data: [DONE]`
    Done,
}

impl StreamOutput {
    /// 序列化为 SSE 帧
    pub fn to_sse(&self) -> String {
        match self {
            StreamOutput::Chunk(chunk) => match serde_json::to_string(chunk) {
                Ok(json) => format!("data: {}\n\n", json),
                Err(e) => {
                    tracing::error!("[STREAM] chunk 序列化失败: {}", e);
                    String::new()
                }
            },
            StreamOutput::Done => "data: [DONE]\n\n".to_string(),
        }
    }

    pub fn finish_reason(&self) -> Option<&str> {
        match self {
            StreamOutput::Chunk(chunk) => chunk
                .choices
                .first()
                .and_then(|c| c.finish_reason.as_deref()),
            StreamOutput::Done => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ToolCallState {
    /// 工具调用在客户端 tool_calls 数组中的索引
    index: u32,
    /// 累积的参数
    arguments: String,
}

/// 流式重组器
///
/// 跨 chunk 状态只有：已知工具调用、结束原因、用量以及是否已发出角色。
#[derive(Debug)]
pub struct StreamReframer {
    response_id: String,
    model: String,
    created: i64,
    policy: ModelPolicy,
    role_sent: bool,
    /// 后端调用 ID -> 状态
    tool_calls: HashMap<String, ToolCallState>,
    /// 后端 index -> 调用 ID
    index_hints: HashMap<u32, String>,
    last_call_id: Option<String>,
    next_tool_index: u32,
    /// 超出上限被丢弃的调用
    dropped: HashSet<String>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    finished: bool,
    warnings: Vec<String>,
}

impl StreamReframer {
    pub fn new(model: impl Into<String>, policy: ModelPolicy) -> Self {
        Self {
            response_id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            policy,
            role_sent: false,
            tool_calls: HashMap::new(),
            index_hints: HashMap::new(),
            last_call_id: None,
            next_tool_index: 0,
            dropped: HashSet::new(),
            finish_reason: None,
            usage: None,
            finished: false,
            warnings: Vec::new(),
        }
    }

    /// 处理单个后端事件
    pub fn process(&mut self, event: &BackendEvent) -> Vec<StreamOutput> {
        if self.finished {
            return Vec::new();
        }

        match event {
            BackendEvent::Start { id, model, created } => {
                if !id.is_empty() {
                    self.response_id = id.clone();
                }
                if !model.is_empty() {
                    self.model = model.clone();
                }
                if let Some(created) = created {
                    self.created = *created;
                }
                Vec::new()
            }

            BackendEvent::TextDelta { text } => {
                if text.is_empty() {
                    return Vec::new();
                }
                let delta = StreamDelta {
                    content: Some(text.clone()),
                    ..Default::default()
                };
                vec![self.chunk(delta, None)]
            }

            BackendEvent::ToolCallDelta {
                id,
                backend_index,
                name,
                arguments,
            } => self
                .tool_call_delta(id.as_deref(), *backend_index, name.as_deref(), arguments)
                .into_iter()
                .collect(),

            BackendEvent::Finish { reason } => {
                self.finish_reason = Some(reason.clone());
                Vec::new()
            }

            BackendEvent::Usage(usage) => {
                self.usage = Some(*usage);
                Vec::new()
            }

            BackendEvent::Done => {
                let reason = self.finish_reason.clone().unwrap_or_else(|| {
                    if self.next_tool_index > 0 {
                        "tool_calls".to_string()
                    } else {
                        "stop".to_string()
                    }
                });
                self.terminate(reason)
            }

            BackendEvent::Error { message } => self.abort(message),
        }
    }

    /// 上游结束
    ///
    /// 没有收到 Done 就结束视为异常终止。
    pub fn finish(&mut self) -> Vec<StreamOutput> {
        if self.finished {
            return Vec::new();
        }
        self.abort("upstream stream ended without a completion signal")
    }

    /// 异常终止：输出 finish_reason = "error" 的 chunk 和终止标记
    pub fn abort(&mut self, message: &str) -> Vec<StreamOutput> {
        if self.finished {
            return Vec::new();
        }
        tracing::warn!(
            "[STREAM] 流异常终止 response_id={}: {}",
            self.response_id,
            message
        );
        self.warnings.push(message.to_string());
        self.terminate("error".to_string())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 已输出的工具调用数
    pub fn tool_call_count(&self) -> u32 {
        self.next_tool_index
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn terminate(&mut self, reason: String) -> Vec<StreamOutput> {
        self.finished = true;
        let mut chunk = self.chunk(StreamDelta::default(), Some(reason));
        if let StreamOutput::Chunk(c) = &mut chunk {
            c.usage = self.usage;
        }
        vec![chunk, StreamOutput::Done]
    }

    fn tool_call_delta(
        &mut self,
        id: Option<&str>,
        backend_index: Option<u32>,
        name: Option<&str>,
        arguments: &str,
    ) -> Option<StreamOutput> {
        // 关联顺序：调用 ID → 同一后端 index 上一次宣告的调用 → 最近一个调用
        let existing = match id {
            Some(id) => Some(id.to_string()),
            None => backend_index
                .and_then(|i| self.index_hints.get(&i).cloned())
                .or_else(|| self.last_call_id.clone()),
        };

        if let Some(call_id) = &existing {
            if self.dropped.contains(call_id) {
                return None;
            }
            if self.tool_calls.contains_key(call_id) {
                return self.continue_call(call_id, name, arguments);
            }
        }

        // 新的工具调用
        let call_id = match id {
            Some(id) => id.to_string(),
            // 没有 ID 也无法关联到已有调用：只有带名称的片段才能开启新调用
            None if name.is_some() => {
                format!("call_{}", &uuid::Uuid::new_v4().simple().to_string()[..24])
            }
            None => {
                tracing::warn!("[STREAM] 丢弃无法关联的工具调用片段: {:?}", arguments);
                return None;
            }
        };
        if let Some(i) = backend_index {
            self.index_hints.insert(i, call_id.clone());
        }

        if self.next_tool_index as usize >= self.policy.max_tool_calls {
            let warning = format!(
                "tool call {} dropped: the model limit of {} calls per turn was reached",
                call_id, self.policy.max_tool_calls
            );
            tracing::warn!("[STREAM] {}", warning);
            self.warnings.push(warning);
            self.dropped.insert(call_id);
            return None;
        }

        let index = self.next_tool_index;
        self.next_tool_index += 1;
        self.tool_calls.insert(
            call_id.clone(),
            ToolCallState {
                index,
                arguments: arguments.to_string(),
            },
        );
        self.last_call_id = Some(call_id.clone());

        let delta = StreamDelta {
            tool_calls: Some(vec![ToolCallDelta {
                index,
                id: Some(call_id),
                call_type: Some("function".to_string()),
                function: Some(FunctionCallDelta {
                    name: name.map(str::to_string),
                    arguments: Some(arguments.to_string()),
                }),
            }]),
            ..Default::default()
        };
        Some(self.chunk(delta, None))
    }

    fn continue_call(
        &mut self,
        call_id: &str,
        name: Option<&str>,
        arguments: &str,
    ) -> Option<StreamOutput> {
        let state = self.tool_calls.get_mut(call_id)?;
        if arguments.is_empty() && name.is_none() {
            return None;
        }
        state.arguments.push_str(arguments);
        let index = state.index;
        self.last_call_id = Some(call_id.to_string());

        let delta = StreamDelta {
            tool_calls: Some(vec![ToolCallDelta {
                index,
                id: None,
                call_type: None,
                function: Some(FunctionCallDelta {
                    name: name.map(str::to_string),
                    arguments: Some(arguments.to_string()),
                }),
            }]),
            ..Default::default()
        };
        Some(self.chunk(delta, None))
    }

    /// 构建 chunk；首个 chunk 携带 `role: assistant`
    fn chunk(&mut self, mut delta: StreamDelta, finish_reason: Option<String>) -> StreamOutput {
        if !self.role_sent {
            delta.role = Some("assistant".to_string());
            self.role_sent = true;
        }
        StreamOutput::Chunk(ChatCompletionChunk {
            id: self.response_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        })
    }
}

/// 同步拉取式适配器
///
/// 把事件迭代器包装成输出迭代器：惰性、只前进、不可重启。
pub struct Reframe<I> {
    events: I,
    reframer: StreamReframer,
    pending: VecDeque<StreamOutput>,
    exhausted: bool,
}

impl<I: Iterator<Item = BackendEvent>> Iterator for Reframe<I> {
    type Item = StreamOutput;

    fn next(&mut self) -> Option<StreamOutput> {
        loop {
            if let Some(output) = self.pending.pop_front() {
                return Some(output);
            }
            if self.exhausted {
                return None;
            }
            match self.events.next() {
                Some(event) => {
                    let outputs = self.reframer.process(&event);
                    self.pending.extend(outputs);
                }
                None => {
                    self.exhausted = true;
                    let outputs = self.reframer.finish();
                    self.pending.extend(outputs);
                }
            }
        }
    }
}

/// 对事件序列做重组
pub fn reframe_events<E>(events: E, model: &str, policy: ModelPolicy) -> Reframe<E::IntoIter>
where
    E: IntoIterator<Item = BackendEvent>,
{
    Reframe {
        events: events.into_iter(),
        reframer: StreamReframer::new(model, policy),
        pending: VecDeque::new(),
        exhausted: false,
    }
}
