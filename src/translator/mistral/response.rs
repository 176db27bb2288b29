//! Mistral → OpenAI 响应转换器

use crate::converter::convert_response;
use crate::models::mistral::MistralResponse;
use crate::models::openai::ChatCompletionResponse;
use crate::policy::ModelPolicy;
use crate::processor::error::ProxyError;

/// 非流式响应转换器
#[derive(Debug, Clone)]
pub struct MistralResponseTranslator {
    policy: ModelPolicy,
}

impl MistralResponseTranslator {
    pub fn new(policy: ModelPolicy) -> Self {
        Self { policy }
    }

    /// 解析并转换后端响应体
    ///
    /// 返回客户端响应和截断等警告。
    pub fn translate_body(
        &self,
        body: &[u8],
    ) -> Result<(ChatCompletionResponse, Vec<String>), ProxyError> {
        let resp: MistralResponse = serde_json::from_slice(body).map_err(|e| {
            tracing::error!(
                "[TRANSLATE] 后端响应无法解析: {} - body: {}",
                e,
                String::from_utf8_lossy(&body[..body.len().min(512)])
            );
            ProxyError::BackendProtocol(format!("invalid backend response: {}", e))
        })?;
        Ok(convert_response(resp, &self.policy))
    }
}
