//! 配置管理
//!
//! 配置在进程启动时构建一次（YAML 文件 → 环境变量 → 命令行），
//! 之后以只读方式传入处理器，转换逻辑中不做任何全局查找。

use crate::converter::ToolMessagePolicy;
use crate::policy::PolicyRule;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 代理配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
    pub translation: TranslationConfig,
    /// 额外的模型策略规则，优先于内置规则参与匹配
    pub policies: Vec<PolicyRule>,
}

/// 监听配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

/// 后端推理服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// 推理服务地址，例如 `http://127.0.0.1:8000`
    pub base_url: String,
    /// 非流式请求总超时（秒），`None` 表示不限制
    pub timeout_secs: Option<u64>,
    /// 建立连接超时（秒）
    pub connect_timeout_secs: u64,
    /// 每个主机保留的空闲连接数
    pub max_connections: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: None,
            connect_timeout_secs: 10,
            max_connections: 100,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 是否输出应用日志
    pub enabled: bool,
    /// 调试模式，强制 debug 级别
    pub debug: bool,
    /// 日志级别: trace / debug / info / warn / error
    pub level: String,
    /// 是否同时写入日志文件
    pub file_logging: bool,
    /// 日志文件路径，未设置时使用 `~/.devstral-proxy/logs/proxy.log`
    pub file: Option<PathBuf>,
    /// 是否在 debug 级别记录请求/响应体（已脱敏）
    pub log_bodies: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            level: "info".to_string(),
            file_logging: false,
            file: None,
            log_bodies: false,
        }
    }
}

impl LoggingConfig {
    /// 生效的日志级别
    pub fn effective_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.level
        }
    }

    /// 日志文件路径（未启用文件日志时为 `None`）
    pub fn log_file_path(&self) -> Option<PathBuf> {
        if !self.file_logging {
            return None;
        }
        Some(self.file.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".devstral-proxy")
                .join("logs")
                .join("proxy.log")
        }))
    }
}

/// 协议转换行为配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// tool 角色消息的处理方式
    pub tool_messages: ToolMessagePolicy,
    /// 检测到任务执行意图时注入工具调用指令
    pub task_directive: bool,
    /// 后端消息序列修正（占位 assistant / user 消息）
    pub sequence_fixups: bool,
    /// 非流式请求时移除 `stream_options` 等流式参数
    pub strip_stream_options: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            tool_messages: ToolMessagePolicy::Keep,
            task_directive: true,
            sequence_fixups: true,
            strip_stream_options: true,
        }
    }
}

impl Config {
    /// 从 YAML 文件加载配置
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("配置文件格式错误 {}", path.display()))?;
        Ok(config)
    }

    /// 有路径时加载文件，否则使用默认配置
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// 应用进程环境变量覆盖
    ///
    /// 返回被忽略的无效值，调用方在日志初始化后输出。
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源应用覆盖
    ///
    /// 支持 `VLLM_BASE`、`PROXY_HOST`、`PROXY_PORT`、`DEBUG`、`LOG_LEVEL`、
    /// `LOG_FILE`、`TIMEOUT`。无法解析的值保持原配置不变，并出现在返回的警告中。
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        if let Some(base) = lookup("VLLM_BASE") {
            self.backend.base_url = base;
        }
        if let Some(host) = lookup("PROXY_HOST") {
            self.server.host = host;
        }
        if let Some(raw) = lookup("PROXY_PORT") {
            match raw.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warnings.push(format!("忽略无效的 PROXY_PORT: {}", raw)),
            }
        }
        if let Some(raw) = lookup("DEBUG") {
            match parse_bool(&raw) {
                Some(enabled) => self.logging.debug = enabled,
                None => warnings.push(format!("忽略无效的 DEBUG: {}", raw)),
            }
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(file) = lookup("LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
            self.logging.file_logging = true;
        }
        if let Some(raw) = lookup("TIMEOUT") {
            match raw.parse() {
                Ok(secs) => self.backend.timeout_secs = Some(secs),
                Err(_) => warnings.push(format!("忽略无效的 TIMEOUT: {}", raw)),
            }
        }
        warnings
    }

    /// 校验配置
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.backend.base_url.starts_with("http://")
            || self.backend.base_url.starts_with("https://"))
        {
            bail!("backend.base_url 必须以 http:// 或 https:// 开头");
        }
        if self.server.port == 0 {
            bail!("server.port 不能为 0");
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.backend.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.translation.tool_messages, ToolMessagePolicy::Keep);
        assert!(config.translation.task_directive);
        assert!(config.policies.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
backend:
  base_url: "http://10.0.0.2:8000"
  timeout_secs: 120
translation:
  tool_messages: fold
policies:
  - pattern: "my-finetune-*"
    max_tool_calls: 2
    strict_validation: true
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.backend.base_url, "http://10.0.0.2:8000");
        assert_eq!(config.backend.timeout_secs, Some(120));
        assert_eq!(config.backend.connect_timeout_secs, 10);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.translation.tool_messages, ToolMessagePolicy::Fold);
        assert_eq!(config.policies.len(), 1);
        assert_eq!(config.policies[0].policy.max_tool_calls, 2);
        assert!(config.policies[0].policy.strict_validation);
    }

    #[test]
    fn test_load_missing_file_fails_with_context() {
        let err = Config::load(Path::new("/nonexistent/devstral.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/devstral.yaml"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VLLM_BASE", "http://gpu-box:8000"),
            ("PROXY_PORT", "9100"),
            ("DEBUG", "true"),
            ("LOG_FILE", "/tmp/proxy.log"),
            ("TIMEOUT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        let warnings = config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.backend.base_url, "http://gpu-box:8000");
        assert_eq!(config.server.port, 9100);
        assert!(config.logging.debug);
        assert_eq!(config.logging.effective_level(), "debug");
        assert_eq!(
            config.logging.log_file_path(),
            Some(PathBuf::from("/tmp/proxy.log"))
        );
        // 无效值被忽略
        assert_eq!(config.backend.timeout_secs, None);
        assert_eq!(warnings, vec!["忽略无效的 TIMEOUT: not-a-number".to_string()]);
    }

    #[test]
    fn test_invalid_env_values_are_reported() {
        let env: HashMap<&str, &str> = [("PROXY_PORT", "ninety"), ("DEBUG", "maybe")]
            .into_iter()
            .collect();

        let mut config = Config::default();
        let warnings = config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert!(!config.logging.debug);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("PROXY_PORT"));
        assert!(warnings[0].contains("ninety"));
        assert!(warnings[1].contains("DEBUG"));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.backend.base_url = "127.0.0.1:8000".to_string();
        assert!(config.validate().is_err());
    }
}
