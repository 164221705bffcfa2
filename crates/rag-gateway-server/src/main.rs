//! RAG gateway server binary.

use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use rag_gateway_config::{GatewayConfig, LayeredConfigOptions};
use std::path::PathBuf;

/// Command-line options for the gateway.
#[derive(Parser)]
#[command(name = "rag-gateway", version)]
struct Cli {
    /// Optional path to a gateway.json5 config file
    #[arg(long, env = "RAG_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
    /// Address to bind (host:port)
    #[arg(long, env = "RAG_GATEWAY_BIND")]
    bind: Option<String>,
    /// Directory holding the corpus documents
    #[arg(long, env = "RAG_GATEWAY_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// PEM file with the trusted signing key
    #[arg(long, env = "RAG_GATEWAY_PUBLIC_KEY")]
    public_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    info!(
        "starting gateway (config_set={}, bind_set={}, data_dir_set={})",
        cli.config.is_some(),
        cli.bind.is_some(),
        cli.data_dir.is_some()
    );
    let cwd = std::env::current_dir().context("cwd")?;
    info!("loading layered config from cwd: {}", cwd.display());
    let mut options = LayeredConfigOptions::new(&cwd);
    if let Some(path) = cli.config.as_ref() {
        options = options.with_runtime_path(path);
    }
    let layered = GatewayConfig::load_layered_with_options(options)
        .context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    let mut config = layered.config;

    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(data_dir) = cli.data_dir {
        config.corpus.data_dir = data_dir;
    }
    if let Some(public_key) = cli.public_key {
        config.auth.public_key_pem = None;
        config.auth.public_key_path = Some(public_key);
    }
    config.validate().context("invalid config")?;

    rag_gateway_server::serve(config).await
}
