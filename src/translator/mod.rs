//! 协议转换层
//!
//! 处理 OpenAI 兼容前端协议与 Mistral 风格后端之间的请求和响应格式转换。
//!
//! ```text
//! translator/
//! ├── traits.rs              # 转换器 trait 定义
//! └── mistral/
//!     ├── request.rs         # OpenAI → Mistral 请求
//!     └── response.rs        # Mistral 响应 → OpenAI
//! ```
//!
//! ```ignore
//! use devstral_proxy::translator::{MistralRequestTranslator, RequestTranslator};
//!
//! let translator = MistralRequestTranslator::new(policies, config.translation.clone());
//! let translated = translator.translate_request(openai_request)?;
//! ```

pub mod mistral;
pub mod traits;

pub use mistral::{MistralRequestTranslator, MistralResponseTranslator, TranslatedRequest};
pub use traits::RequestTranslator;
