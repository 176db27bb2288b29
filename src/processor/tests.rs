//! 处理器模块测试

use super::*;
use crate::backends::mock::MockBackend;
use crate::backends::traits::{BackendError, BackendErrorKind};
use crate::models::mistral::MistralMessage;
use crate::models::openai::ChatMessage;
use futures::StreamExt;

const SIMPLE_RESPONSE: &str = r#"{
    "id": "cmpl-1",
    "object": "chat.completion",
    "created": 1700000000,
    "model": "devstral-small",
    "choices": [{"index": 0, "message": {"role": "assistant", "content": "done"}, "finish_reason": "stop"}]
}"#;

fn processor_with(backend: Arc<MockBackend>) -> TranslationProcessor {
    let shared: SharedBackend = backend;
    TranslationProcessor::new(shared, MistralRequestTranslator::default())
}

fn tool_call_response(count: usize) -> String {
    let calls: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"id": "call_{i}", "type": "function", "function": {{"name": "read_file", "arguments": "{{}}"}}}}"#
            )
        })
        .collect();
    format!(
        r#"{{"id": "cmpl-2", "object": "chat.completion", "created": 1700000000, "model": "codestral-latest",
            "choices": [{{"index": 0, "message": {{"role": "assistant", "content": null, "tool_calls": [{}]}}, "finish_reason": "tool_calls"}}]}}"#,
        calls.join(",")
    )
}

async fn collect_stream(stream: SseStream) -> String {
    let frames: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
    frames
        .iter()
        .map(|b| String::from_utf8_lossy(b).to_string())
        .collect()
}

#[test]
fn test_request_context_new() {
    let ctx = RequestContext::new("devstral-small".to_string());
    assert_eq!(ctx.original_model, "devstral-small");
    assert!(!ctx.is_stream);
    assert!(ctx.headers.is_empty());
    assert!(uuid::Uuid::parse_str(&ctx.request_id).is_ok());
    assert!(ctx.with_stream(true).is_stream);
}

fn auth_headers() -> Vec<(String, String)> {
    vec![("authorization".to_string(), "Bearer sk-local".to_string())]
}

#[tokio::test]
async fn test_headers_reach_backend() {
    let backend = Arc::new(MockBackend::body(SIMPLE_RESPONSE));
    let processor = processor_with(backend.clone());
    let request = ChatCompletionRequest::new("devstral-small", vec![ChatMessage::user("hi")]);
    processor.handle(request, auth_headers()).await.unwrap();
    assert_eq!(backend.last_header("authorization").as_deref(), Some("Bearer sk-local"));

    let backend = Arc::new(MockBackend::chunks(&["data: [DONE]\n\n"]));
    let processor = processor_with(backend.clone());
    let mut request = ChatCompletionRequest::new("devstral-small", vec![ChatMessage::user("hi")]);
    request.stream = true;
    processor.handle(request, auth_headers()).await.unwrap();
    assert_eq!(backend.last_headers(), auth_headers());
}

#[tokio::test]
async fn test_handle_non_stream() {
    let backend = Arc::new(MockBackend::body(SIMPLE_RESPONSE));
    let processor = processor_with(backend.clone());

    let request = ChatCompletionRequest::new("devstral-small", vec![ChatMessage::user("hello")]);
    let result = processor.handle(request, Vec::new()).await.unwrap();

    let ProcessedResponse::Complete(translated) = result else {
        panic!("expected complete response");
    };
    assert!(translated.warnings.is_empty());
    assert_eq!(translated.response.object, "chat.completion");
    assert_eq!(
        translated.response.choices[0].message.content.as_deref(),
        Some("done")
    );

    let sent = backend.last_request().unwrap();
    assert_eq!(sent.model, "devstral-small");
    assert!(!sent.stream);
    // 未指定时使用策略默认值
    assert_eq!(sent.max_tokens, Some(4096));
}

#[tokio::test]
async fn test_invalid_request_never_reaches_backend() {
    let backend = Arc::new(MockBackend::body(SIMPLE_RESPONSE));
    let processor = processor_with(backend.clone());

    let request = ChatCompletionRequest::new("devstral-small", vec![]);
    let err = processor.handle(request, Vec::new()).await.unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(err.param(), Some("messages"));
    assert!(backend.last_request().is_none());
}

#[tokio::test]
async fn test_task_request_without_tool_calls_warns() {
    let backend = Arc::new(MockBackend::body(SIMPLE_RESPONSE));
    let processor = processor_with(backend.clone());

    let request = ChatCompletionRequest::new(
        "devstral-small",
        vec![ChatMessage::user("Please implement these changes in the repo")],
    );
    let ProcessedResponse::Complete(translated) = processor.handle(request, Vec::new()).await.unwrap() else {
        panic!("expected complete response");
    };

    assert_eq!(translated.warnings.len(), 1);
    assert!(translated.warnings[0].contains("no tool calls"));
    // 响应内容保持不变
    assert_eq!(
        translated.response.choices[0].message.content.as_deref(),
        Some("done")
    );

    let sent = backend.last_request().unwrap();
    match &sent.messages[0] {
        MistralMessage::System { content, .. } => assert!(content.contains("[CRITICAL INSTRUCTION]")),
        other => panic!("expected system directive, got {:?}", other),
    }
}

#[tokio::test]
async fn test_response_tool_calls_truncated_to_policy() {
    let backend = Arc::new(MockBackend::body(&tool_call_response(4)));
    let processor = processor_with(backend);

    let request = ChatCompletionRequest::new("codestral-latest", vec![ChatMessage::user("look")]);
    let ProcessedResponse::Complete(translated) = processor.handle(request, Vec::new()).await.unwrap() else {
        panic!("expected complete response");
    };

    let calls = translated.response.choices[0]
        .message
        .tool_calls
        .as_ref()
        .unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].index, Some(2));
    assert_eq!(translated.warnings.len(), 1);
}

#[tokio::test]
async fn test_backend_errors_are_mapped() {
    let cases = [
        (BackendError::new(BackendErrorKind::NetworkError, "connection refused"), 502),
        (BackendError::new(BackendErrorKind::Timeout, "deadline"), 504),
        (BackendError::from_status(503, "overloaded"), 503),
    ];
    for (err, status) in cases {
        let processor = processor_with(Arc::new(MockBackend::fail(err)));
        let request = ChatCompletionRequest::new("devstral-small", vec![ChatMessage::user("hi")]);
        let result = processor.handle(request, Vec::new()).await.unwrap_err();
        assert_eq!(result.status_code(), status);
    }
}

#[tokio::test]
async fn test_unparseable_backend_body() {
    let processor = processor_with(Arc::new(MockBackend::body("not json")));
    let request = ChatCompletionRequest::new("devstral-small", vec![ChatMessage::user("hi")]);
    let err = processor.handle(request, Vec::new()).await.unwrap_err();
    assert_eq!(err.code(), "backend_protocol_error");
}

#[tokio::test]
async fn test_handle_stream() {
    let backend = Arc::new(MockBackend::chunks(&[
        "data: {\"id\":\"cmpl-s\",\"model\":\"devstral-small\",\"created\":1700000000,\"choices\":[{\"index\":0,\"delta\":{\"content\":\"He\"}}]}\n\n",
        "data: {\"id\":\"cmpl-s\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"llo\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    ]));
    let processor = processor_with(backend.clone());

    let mut request = ChatCompletionRequest::new("devstral-small", vec![ChatMessage::user("hi")]);
    request.stream = true;
    let ProcessedResponse::Stream { stream, warnings } = processor.handle(request, Vec::new()).await.unwrap() else {
        panic!("expected stream");
    };
    assert!(warnings.is_empty());
    assert!(backend.last_request().unwrap().stream);

    let body = collect_stream(stream).await;
    assert!(body.contains("\"content\":\"He\""));
    assert!(body.contains("\"content\":\"llo\""));
    assert!(body.contains("\"finish_reason\":\"stop\""));
    assert!(body.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn test_stream_transport_error_becomes_error_chunk() {
    let backend = Arc::new(MockBackend::new(crate::backends::mock::MockReply::Chunks(vec![
        Ok(Bytes::from(
            "data: {\"id\":\"cmpl-s\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"par\"}}]}\n\n",
        )),
        Err(BackendError::new(BackendErrorKind::NetworkError, "reset by peer")),
    ])));
    let processor = processor_with(backend);

    let mut request = ChatCompletionRequest::new("devstral-small", vec![ChatMessage::user("hi")]);
    request.stream = true;
    let ProcessedResponse::Stream { stream, .. } = processor.handle(request, Vec::new()).await.unwrap() else {
        panic!("expected stream");
    };

    let body = collect_stream(stream).await;
    assert!(body.contains("\"content\":\"par\""));
    assert!(body.contains("\"finish_reason\":\"error\""));
    assert!(body.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn test_stream_call_failure_is_returned_before_streaming() {
    let processor = processor_with(Arc::new(MockBackend::fail(BackendError::new(
        BackendErrorKind::NetworkError,
        "connection refused",
    ))));
    let mut request = ChatCompletionRequest::new("devstral-small", vec![ChatMessage::user("hi")]);
    request.stream = true;
    let err = processor.handle(request, Vec::new()).await.unwrap_err();
    assert_eq!(err.status_code(), 502);
}
