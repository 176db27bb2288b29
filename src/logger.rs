//! 日志管理模块
//!
//! 初始化 tracing 订阅器（stderr + 可选的追加日志文件），
//! 并提供日志内容脱敏与截断工具。

use crate::config::LoggingConfig;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日志关闭时仍然输出的级别
const DISABLED_LEVEL: &str = "error";

/// 初始化全局日志
///
/// `RUST_LOG` 优先于配置中的级别。
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = if config.enabled {
        config.effective_level()
    } else {
        DISABLED_LEVEL
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match config.log_file_path() {
        Some(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("创建日志目录失败: {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("打开日志文件失败: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("初始化日志系统失败")?;

    if let Some(path) = config.log_file_path() {
        tracing::info!("[LOGGER] 日志文件: {}", path.display());
    }
    Ok(())
}

static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // Bearer token
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        (
            r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        (
            r#"access[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "access_token: ***",
        ),
        (
            r#"refresh[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "refresh_token: ***",
        ),
        (r#"password["']?\s*[:=]\s*["']?[^\s"',}]+"#, "password: ***"),
        (
            r#"secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "secret: ***",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// 日志脱敏，遮盖 token / api key / password 等字段
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SENSITIVE_PATTERNS.iter() {
        if re.is_match(&sanitized) {
            sanitized = re.replace_all(&sanitized, *replacement).into_owned();
        }
    }
    sanitized
}

/// 按字符数截断日志内容
pub fn truncate_for_log(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!(
            "{}...(省略 {} 字符)",
            &message[..byte_idx],
            message[byte_idx..].chars().count()
        ),
        None => message.to_string(),
    }
}
