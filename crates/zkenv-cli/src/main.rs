//! zkenv: encrypt and decrypt .env files against a token custodian
//!
//! Commands:
//!   encrypt       - .env → .zk.env, one token pair per variable
//!   decrypt       - .zk.env → KEY=value / JSON / plaintext file
//!   config show   - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use zkenv_client::HttpTokenService;
use zkenv_core::config::{ServiceConfig, ZkenvConfig};
use zkenv_core::{Protocol, ZkenvResult};
use zkenv_crypto::Pin;
use zkenv_engine::{
    decrypt_file_with, encrypt_file_with, envfile, DecryptOptions, DecryptReport, EncryptOptions,
    PinPurpose, PinSource, RecordOutcome, ReportStatus, TerminalPin,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zkenv",
    version,
    about = "Zero-knowledge .env encryption",
    long_about = "zkenv: encrypt .env values under keys split between the file, a token custodian, and an optional PIN"
)]
struct Cli {
    /// Path to zkenv.toml configuration file
    #[arg(long, short = 'c', env = "ZKENV_CONFIG", default_value = "zkenv.toml", global = true)]
    config: PathBuf,

    /// Token custodian API base (overrides service.api_base)
    #[arg(long, env = "ZKENV_API", global = true)]
    api_base: Option<String>,

    /// Log level (trace, debug, info, warn, error); defaults to log.level
    #[arg(long, env = "ZKENV_LOG", global = true)]
    log: Option<String>,

    /// Log format; defaults to log.format
    #[arg(long, env = "ZKENV_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt every KEY=VALUE line of a .env file
    Encrypt {
        /// Plaintext input
        #[arg(long, default_value = ".env")]
        env: PathBuf,
        /// Encrypted output
        #[arg(long, default_value = ".zk.env")]
        zkenv: PathBuf,
        /// Keep token pairs resolvable after a successful decrypt
        #[arg(long)]
        multi: bool,
        /// Key derivation: pin (tokenA + PIN) or pair (legacy, no PIN)
        #[arg(long)]
        protocol: Option<Protocol>,
        /// Six-digit PIN; prompted for when absent
        #[arg(long, env = "ZKENV_PIN", hide_env_values = true)]
        pin: Option<String>,
        /// Pair lifetime to request from the custodian (overrides service.ttl_hours)
        #[arg(long)]
        ttl_hours: Option<u32>,
    },

    /// Decrypt a .zk.env file
    Decrypt {
        /// Encrypted input
        #[arg(long, default_value = ".zk.env")]
        zkenv: PathBuf,
        /// Six-digit PIN; prompted for when absent and the file needs one
        #[arg(long, env = "ZKENV_PIN", hide_env_values = true)]
        pin: Option<String>,
        /// Output format on stdout
        #[arg(long, default_value = "env")]
        format: OutputFormat,
        /// Write a plaintext .env file instead of printing
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file + flags)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Env,
    Json,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ZkenvConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    if let Some(api_base) = &cli.api_base {
        config.service.api_base = api_base.clone();
    }

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match &cli.log_format {
        Some(f) => f.clone(),
        None if config.log.format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);

    match cli.command {
        Commands::Encrypt {
            env,
            zkenv,
            multi,
            protocol,
            pin,
            ttl_hours,
        } => {
            let mut options = EncryptOptions::from(&config.encrypt);
            options.multi_use |= multi;
            if let Some(p) = protocol {
                options.protocol = p;
            }
            if ttl_hours.is_some() {
                config.service.ttl_hours = ttl_hours;
            }
            cmd_encrypt(&config.service, options, &env, &zkenv, pin.as_deref()).await
        }
        Commands::Decrypt {
            zkenv,
            pin,
            format,
            output,
        } => {
            let options = DecryptOptions {
                concurrency: config.encrypt.concurrency,
            };
            let output = output.as_deref();
            cmd_decrypt(&config.service, options, &zkenv, pin.as_deref(), &format, output).await
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries decrypted output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn parse_pin_arg(pin: Option<&str>) -> Result<Option<Pin>> {
    pin.map(Pin::parse)
        .transpose()
        .context("--pin / ZKENV_PIN must be exactly 6 digits")
}

fn make_spinner(prefix: &str, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Terminal prompt that hides the spinner while the user types.
struct SpinnerPin(ProgressBar);

impl PinSource for SpinnerPin {
    fn pin(&mut self, purpose: PinPurpose) -> ZkenvResult<Pin> {
        self.0.suspend(|| TerminalPin.pin(purpose))
    }
}

fn token_service(config: &ServiceConfig) -> Result<HttpTokenService> {
    let client = HttpTokenService::new(config).context("configuring token service client")?;
    tracing::debug!(api_base = %client.base_url(), "using token service");
    Ok(client)
}

// ── `zkenv encrypt` ───────────────────────────────────────────────────────────

async fn cmd_encrypt(
    service: &ServiceConfig,
    options: EncryptOptions,
    env: &Path,
    zkenv: &Path,
    pin: Option<&str>,
) -> Result<()> {
    let client = token_service(service)?;
    let pin = parse_pin_arg(pin)?;

    let pb = make_spinner("encrypt", "issuing token pairs");
    let mut pin_source = SpinnerPin(pb.clone());
    let result = encrypt_file_with(client, env, zkenv, options, pin, &mut pin_source).await;
    pb.finish_and_clear();
    let report = result.with_context(|| format!("encrypting {}", env.display()))?;

    for (name, error) in report.errored() {
        eprintln!("  error: {name}: {error}");
    }
    if report.status() == ReportStatus::Failed {
        anyhow::bail!(
            "no variables could be encrypted; {} holds only error markers",
            zkenv.display()
        );
    }

    println!(
        "Encrypted {} variable(s) from {} into {} ({})",
        report.emitted(),
        env.display(),
        zkenv.display(),
        options.protocol
    );
    if options.protocol.requires_pin() {
        println!("Share the PIN with recipients out of band. It is not stored anywhere.");
    }
    if !options.multi_use {
        println!("Each value can be decrypted once.");
    }
    Ok(())
}

// ── `zkenv decrypt` ───────────────────────────────────────────────────────────

async fn cmd_decrypt(
    service: &ServiceConfig,
    options: DecryptOptions,
    zkenv: &Path,
    pin: Option<&str>,
    format: &OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let client = token_service(service)?;
    let pin = parse_pin_arg(pin)?;

    let pb = make_spinner("decrypt", "resolving tokens");
    let mut pin_source = SpinnerPin(pb.clone());
    let result = decrypt_file_with(client, zkenv, options, pin, &mut pin_source).await;
    pb.finish_and_clear();
    let report = result.with_context(|| format!("decrypting {}", zkenv.display()))?;

    report_skipped(&report);

    let values: BTreeMap<String, String> = report
        .secrets()
        .into_iter()
        .map(|(k, v)| (k, v.expose_secret().to_string()))
        .collect();

    match (output, format) {
        (Some(path), _) => {
            envfile::write_atomic_async(path, render_env(&values))
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote {} variable(s) to {}", values.len(), path.display());
        }
        (None, OutputFormat::Env) => print!("{}", render_env(&values)),
        (None, OutputFormat::Json) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&values).context("serializing values")?
            );
        }
    }

    if report.status() == ReportStatus::Failed {
        anyhow::bail!("no variables could be recovered from {}", zkenv.display());
    }
    Ok(())
}

fn report_skipped(report: &DecryptReport) {
    for outcome in &report.outcomes {
        match outcome {
            RecordOutcome::Failed { name, error } => {
                eprintln!("  skipped: {name} ({})", error.kind());
            }
            RecordOutcome::SkippedMalformed { name, reason } => {
                eprintln!("  skipped: {name} (malformed: {reason})");
            }
            RecordOutcome::Recovered { .. } => {}
        }
    }
}

fn render_env(values: &BTreeMap<String, String>) -> String {
    values.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
}

// ── `zkenv config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &ZkenvConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
