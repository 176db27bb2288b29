//! devstral-proxy
//!
//! OpenAI 兼容的聊天补全代理，将请求转换为 Mistral 风格推理服务
//! （如 vLLM 部署的 Devstral）可以接受的格式，并将响应转换回来。

pub mod backends;
pub mod config;
pub mod converter;
pub mod detector;
pub mod logger;
pub mod models;
pub mod policy;
pub mod processor;
pub mod server;
pub mod stream;
pub mod translator;

pub use config::Config;
pub use processor::{ProxyError, TranslationProcessor};
pub use server::ProxyServer;
