//! zkenvd: zkenv token custodian
//!
//! Usage:
//!   zkenvd [--config zkenv.toml] [--listen 127.0.0.1:3001]

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use zkenv_core::config::ZkenvConfig;

#[derive(Parser, Debug)]
#[command(name = "zkenvd", version, about = "zkenv token custodian")]
struct Cli {
    /// Path to zkenv.toml configuration file
    #[arg(long, short = 'c', env = "ZKENV_CONFIG", default_value = "zkenv.toml")]
    config: PathBuf,

    /// Listen address (overrides server.listen)
    #[arg(long, env = "ZKENVD_LISTEN")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ZKENV_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "ZKENV_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "zkenvd starting"
    );

    let mut config = ZkenvConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    zkenvd::serve(config.server).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
