//! 协议转换器 Trait 定义
//!
//! - `RequestTranslator`: 将客户端请求转换为后端请求
//!
//! 转换是同步的纯计算，从不挂起。

/// 请求转换器 Trait
///
/// # 类型参数
///
/// - `Input`: 客户端请求类型（如 `ChatCompletionRequest`）
/// - `Output`: 后端请求类型（如 `MistralRequest`）
/// - `Error`: 转换错误类型
pub trait RequestTranslator {
    type Input;
    type Output;
    type Error: std::error::Error + Send + Sync + 'static;

    fn translate_request(&self, request: Self::Input) -> Result<Self::Output, Self::Error>;
}
