//! Mistral SSE 流解析器
//!
//! 解析 vLLM / Mistral 兼容服务的 Server-Sent Events 流。
//! 网络分片可能在任意字节处切断（包括 UTF-8 字符中间），
//! 因此按字节缓冲，只处理完整的行。

use crate::models::mistral::MistralStreamChunk;
use crate::stream::events::BackendEvent;
use tracing::warn;

#[derive(Debug, Default)]
pub struct MistralSseParser {
    /// 未处理完的字节
    buffer: Vec<u8>,
    /// 是否已经输出 Start 事件
    started: bool,
}

impl MistralSseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个网络分片
    pub fn process(&mut self, bytes: &[u8]) -> Vec<BackendEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.parse_line(&line, &mut events);
        }
        events
    }

    /// 上游结束，处理缓冲区中没有换行结尾的残余数据
    pub fn finish(&mut self) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.parse_line(&line, &mut events);
        }
        events
    }

    fn parse_line(&mut self, line: &str, events: &mut Vec<BackendEvent>) {
        let line = line.trim_end_matches(['\r', '\n']);
        // 空行、注释行（心跳）和 event: 行都不携带数据
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data.is_empty() {
            return;
        }
        self.parse_data(data, events);
    }

    /// 解析单条 `data:` 载荷
    pub fn parse_data(&mut self, data: &str, events: &mut Vec<BackendEvent>) {
        if data == "[DONE]" {
            events.push(BackendEvent::Done);
            return;
        }

        let chunk: MistralStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("[STREAM] 解析后端 chunk 失败: {} - data: {}", e, data);
                events.push(BackendEvent::error(format!(
                    "undecodable backend chunk: {}",
                    e
                )));
                return;
            }
        };

        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            events.push(BackendEvent::error(message));
            return;
        }

        if !self.started {
            if let Some(id) = chunk.id {
                self.started = true;
                events.push(BackendEvent::Start {
                    id,
                    model: chunk.model.unwrap_or_default(),
                    created: chunk.created,
                });
            }
        }

        for choice in chunk.choices {
            // 流式请求只允许单个候选，其他候选不参与重组
            if choice.index != 0 {
                warn!("[STREAM] 忽略后端候选 index={}", choice.index);
                continue;
            }
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(BackendEvent::TextDelta { text });
            }
            for fragment in choice.delta.tool_calls.into_iter().flatten() {
                let (name, arguments) = match fragment.function {
                    Some(f) => (f.name, f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                events.push(BackendEvent::ToolCallDelta {
                    id: fragment.id.filter(|id| !id.is_empty()),
                    backend_index: fragment.index,
                    name,
                    arguments,
                });
            }
            if let Some(reason) = choice.finish_reason {
                events.push(BackendEvent::Finish { reason });
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(BackendEvent::Usage(usage));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_first_choice_is_parsed() {
        let mut parser = MistralSseParser::new();
        let input = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"A\"}},{\"index\":1,\"delta\":{\"content\":\"B\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"},{\"index\":1,\"delta\":{},\"finish_reason\":\"length\"}]}\n\n",
        );
        let events = parser.process(input.as_bytes());
        assert_eq!(
            events,
            vec![
                BackendEvent::text("A"),
                BackendEvent::Finish {
                    reason: "stop".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_text_and_done() {
        let mut parser = MistralSseParser::new();
        let input = concat!(
            "data: {\"id\":\"cmpl-1\",\"model\":\"devstral\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
            "data: {\"id\":\"cmpl-1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = parser.process(input.as_bytes());

        assert_eq!(
            events,
            vec![
                BackendEvent::Start {
                    id: "cmpl-1".to_string(),
                    model: "devstral".to_string(),
                    created: None,
                },
                BackendEvent::text("Hel"),
                BackendEvent::text("lo"),
                BackendEvent::finish("stop"),
                BackendEvent::Done,
            ]
        );
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut parser = MistralSseParser::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n";
        let bytes = line.as_bytes();
        // 在多字节字符中间切开
        let cut = line.find('é').unwrap() + 1;

        assert!(parser.process(&bytes[..cut]).is_empty());
        let events = parser.process(&bytes[cut..]);
        assert_eq!(events, vec![BackendEvent::text("héllo")]);
    }

    #[test]
    fn test_tool_call_fragments() {
        let mut parser = MistralSseParser::new();
        let input = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"id\":\"Xyz123abc\",\"index\":0,\"function\":{\"name\":\"bash\",\"arguments\":\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"cmd\\\":\\\"ls\\\"}\"}}]}}]}\n",
        );
        let events = parser.process(input.as_bytes());
        assert_eq!(
            events,
            vec![
                BackendEvent::ToolCallDelta {
                    id: Some("Xyz123abc".to_string()),
                    backend_index: Some(0),
                    name: Some("bash".to_string()),
                    arguments: String::new(),
                },
                BackendEvent::ToolCallDelta {
                    id: None,
                    backend_index: Some(0),
                    name: None,
                    arguments: "{\"cmd\":\"ls\"}".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_error_payload_and_garbage() {
        let mut parser = MistralSseParser::new();
        let events = parser.process(b"data: {\"error\":{\"message\":\"out of memory\"}}\ndata: {oops\n");
        assert_eq!(events[0], BackendEvent::error("out of memory"));
        assert!(matches!(&events[1], BackendEvent::Error { message } if message.contains("undecodable")));
    }

    #[test]
    fn test_comments_and_trailing_data_without_newline() {
        let mut parser = MistralSseParser::new();
        assert!(parser.process(b": ping\n\nevent: message\n").is_empty());
        assert!(parser.process(b"data: [DONE]").is_empty());
        assert_eq!(parser.finish(), vec![BackendEvent::Done]);
    }

    #[test]
    fn test_usage_chunk() {
        let mut parser = MistralSseParser::new();
        let events = parser.process(
            b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4,\"total_tokens\":7}}\n",
        );
        match &events[0] {
            BackendEvent::Usage(usage) => assert_eq!(usage.total_tokens, 7),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
