//! devstral-proxy 入口

use anyhow::Context;
use clap::{ArgAction, Parser};
use devstral_proxy::backends::MistralHttpBackend;
use devstral_proxy::config::Config;
use devstral_proxy::logger;
use devstral_proxy::policy::ModelPolicyTable;
use devstral_proxy::processor::{SharedBackend, TranslationProcessor};
use devstral_proxy::server::ProxyServer;
use devstral_proxy::translator::MistralRequestTranslator;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "devstral-proxy",
    version,
    about = "OpenAI-compatible proxy for Mistral-format inference backends"
)]
struct Cli {
    /// YAML config file
    #[arg(long, short = 'c', env = "DEVSTRAL_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable application logging
    #[arg(long, action = ArgAction::SetTrue)]
    enable_logging: bool,

    /// Enable debug mode (debug-level logs)
    #[arg(long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log file path (enables file logging)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Development mode: --enable-logging --debug --log-level debug
    #[arg(long, action = ArgAction::SetTrue)]
    dev: bool,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    /// 命令行参数优先于环境变量和配置文件
    fn apply(&self, config: &mut Config) {
        if self.dev {
            config.logging.enabled = true;
            config.logging.debug = true;
            config.logging.level = "debug".to_string();
        }
        if self.enable_logging {
            config.logging.enabled = true;
        }
        if self.debug {
            config.logging.debug = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
            config.logging.file_logging = true;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    let env_warnings = config.apply_env_overrides();
    cli.apply(&mut config);
    config.validate()?;

    logger::init_logging(&config.logging)?;
    for warning in &env_warnings {
        tracing::warn!("[CONFIG] {}", warning);
    }
    tracing::info!(
        "[MAIN] devstral-proxy v{} 启动, backend={}, debug={}",
        env!("CARGO_PKG_VERSION"),
        config.backend.base_url,
        config.logging.debug
    );

    let backend = MistralHttpBackend::new(&config.backend).context("创建后端客户端失败")?;
    let backend: SharedBackend = Arc::new(backend);
    let policies = Arc::new(ModelPolicyTable::new(config.policies.clone()));
    let translator = MistralRequestTranslator::new(policies, config.translation.clone());
    let processor = TranslationProcessor::new(backend, translator)
        .with_body_logging(config.logging.log_bodies);

    ProxyServer::new(Arc::new(processor), config.logging.debug)
        .start(&config.server.host, config.server.port)
        .await
}
