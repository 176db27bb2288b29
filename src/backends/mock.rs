//! 测试用后端
//!
//! 返回预置响应，并记录最近一次收到的请求及请求头。

use super::traits::{Backend, BackendError, BackendErrorKind, BackendResult, ByteStream};
use crate::models::mistral::MistralRequest;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum MockReply {
    /// 完整响应体（流式调用时作为单个分片返回）
    Body(Bytes),
    /// 流式分片
    Chunks(Vec<Result<Bytes, BackendError>>),
    /// 调用直接失败
    Fail(BackendError),
}

pub struct MockBackend {
    reply: MockReply,
    last_request: Mutex<Option<MistralRequest>>,
    last_headers: Mutex<Vec<(String, String)>>,
}

impl MockBackend {
    pub fn new(reply: MockReply) -> Self {
        Self {
            reply,
            last_request: Mutex::new(None),
            last_headers: Mutex::new(Vec::new()),
        }
    }

    pub fn body(json: &str) -> Self {
        Self::new(MockReply::Body(Bytes::from(json.to_string())))
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self::new(MockReply::Chunks(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from(c.to_string())))
                .collect(),
        ))
    }

    pub fn fail(err: BackendError) -> Self {
        Self::new(MockReply::Fail(err))
    }

    pub fn last_request(&self) -> Option<MistralRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub fn last_headers(&self) -> Vec<(String, String)> {
        self.last_headers.lock().unwrap().clone()
    }

    /// 最近一次请求中指定名称的请求头
    pub fn last_header(&self, name: &str) -> Option<String> {
        self.last_headers()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn record(&self, request: &MistralRequest, headers: &[(String, String)]) {
        *self.last_request.lock().unwrap() = Some(request.clone());
        *self.last_headers.lock().unwrap() = headers.to_vec();
    }
}

#[async_trait]
impl Backend for MockBackend {
    type Request = MistralRequest;

    async fn call(&self, request: &MistralRequest, headers: &[(String, String)]) -> BackendResult<Bytes> {
        self.record(request, headers);
        match &self.reply {
            MockReply::Body(body) => Ok(body.clone()),
            MockReply::Fail(err) => Err(err.clone()),
            MockReply::Chunks(_) => Err(BackendError::new(
                BackendErrorKind::Other,
                "mock backend only streams",
            )),
        }
    }

    async fn call_stream(
        &self,
        request: &MistralRequest,
        headers: &[(String, String)],
    ) -> BackendResult<ByteStream> {
        self.record(request, headers);
        match &self.reply {
            MockReply::Body(body) => Ok(Box::pin(futures::stream::iter(vec![Ok(body.clone())]))),
            MockReply::Chunks(chunks) => Ok(Box::pin(futures::stream::iter(chunks.clone()))),
            MockReply::Fail(err) => Err(err.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn target(&self) -> &str {
        "http://mock.local"
    }
}
