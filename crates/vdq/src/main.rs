//! vdq: vaultdrop upload queue
//!
//! Commands:
//!   enqueue <path>... --secret <id>  - encrypt files and add them to the queue
//!   drain                            - attempt every due upload once
//!   status                           - list queued entries
//!   requeue <id> / discard <id>      - resolve failed or skipped entries
//!   config show                      - display effective configuration
//!   daemon                           - drain in the background, serve /metrics

mod commands;
mod daemon;
mod metrics;
mod setup;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "vdq",
    version,
    about = "vaultdrop encrypted upload queue",
    long_about = "vdq: queue files for encrypted upload to a vault secret and drain the queue"
)]
struct Cli {
    /// Path to vaultdrop.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "VDQ_CONFIG",
        default_value = "~/.config/vaultdrop/vaultdrop.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [daemon].log_level
    #[arg(long, env = "VDQ_LOG")]
    log: Option<String>,

    /// Log format; overrides [daemon].log_format
    #[arg(long, env = "VDQ_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt files and add them to the upload queue
    ///
    /// The master key is derived from VDQ_PASSPHRASE and the secret id.
    Enqueue {
        /// Files to queue
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Destination secret id
        #[arg(long, short = 's')]
        secret: String,
        /// MIME type recorded for every file
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
    },

    /// Attempt every due upload once and print a summary
    Drain,

    /// List queued entries and their upload state
    Status,

    /// Give a failed or skipped entry a fresh set of attempts
    Requeue {
        /// Entry id (from `vdq status`)
        id: String,
    },

    /// Delete a failed or skipped entry
    Discard {
        /// Entry id (from `vdq status`)
        id: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run the background drain loop with a metrics endpoint
    Daemon,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Display the effective configuration
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = setup::expand_tilde(&cli.config);
    let config = setup::load_config(&config_path)?;

    let level = cli
        .log
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli.log_format.unwrap_or(match config.daemon.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "vdq starting"
    );

    match cli.command {
        Commands::Enqueue {
            paths,
            secret,
            mime,
        } => commands::enqueue(&config, &paths, &secret, &mime).await,
        Commands::Drain => commands::drain(&config).await,
        Commands::Status => commands::status(&config).await,
        Commands::Requeue { id } => commands::requeue(&config, &id).await,
        Commands::Discard { id } => commands::discard(&config, &id).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => commands::config_show(&config, &config_path),
        Commands::Daemon => daemon::run(config).await,
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

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
