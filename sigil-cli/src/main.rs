//! Sigil - Audit manifest signing and verification for release artifacts
//!
//! Main entry point wiring configuration into the audit engine

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sigil_core::config::SigilConfig;

mod audit_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "sigil",
    about = "Audit manifest signing and verification for release artifacts",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit structured JSON logs instead of text
    #[clap(long, global = true)]
    trace: bool,

    /// Override configuration file path
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Hash an artifact, sign the manifest, and write the audit record
    Sign {
        /// Artifact file to sign
        file: PathBuf,

        /// Component name recorded in the manifest
        component: String,

        /// Component version recorded in the manifest
        #[clap(default_value = "1.0.0")]
        version: String,

        /// Skip ledger anchoring for this operation
        #[clap(long)]
        no_anchor: bool,

        /// Write the record here instead of next to the artifact
        #[clap(long)]
        output: Option<PathBuf>,
    },

    /// Check an artifact against an audit record
    Verify {
        /// Artifact file to check
        file: PathBuf,

        /// Audit record path (default: <file>.sigil)
        record: Option<PathBuf>,

        /// Output the result as JSON
        #[clap(long)]
        json: bool,
    },

    /// Print SHA-256 digests without signing anything
    Digest {
        /// Files to hash
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },

    /// Anchor an existing audit record in a fresh ledger transaction
    Anchor {
        /// Audit record path
        record: PathBuf,
    },

    /// List past signing operations from the local registry
    History {
        /// Registry file to read (default: from configuration)
        #[clap(long)]
        registry: Option<PathBuf>,
    },

    /// Write a commented sigil.yml configuration scaffold
    Init {
        /// Write the machine-wide configuration instead of ./sigil.yml
        #[clap(long)]
        global: bool,

        /// Overwrite an existing configuration file
        #[clap(long)]
        force: bool,
    },

    /// Announce a completed audit to the community site
    #[cfg(feature = "publish")]
    Publish {
        /// Audit record path
        record: PathBuf,

        /// Post title (default: derived from the record)
        #[clap(long)]
        title: Option<String>,

        /// Community to post into (default: from configuration)
        #[clap(long)]
        community: Option<String>,
    },
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr; stdout is reserved for command output.
/// When --trace is set, enables JSON output for structured tracing.
fn initialize_tracing(log_level: &LogLevel, trace: bool) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    if trace {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.trace);

    match cli.command {
        Command::Sign {
            file,
            component,
            version,
            no_anchor,
            output,
        } => {
            let config = SigilConfig::load(cli.config.as_deref())?;
            audit_cli::sign_command(
                config,
                &file,
                &component,
                &version,
                no_anchor,
                output.as_deref(),
            )
            .await
        }
        Command::Verify { file, record, json } => {
            let config = SigilConfig::load(cli.config.as_deref())?;
            audit_cli::verify_command(config, &file, record.as_deref(), json).await
        }
        Command::Digest { files } => audit_cli::digest_command(&files).await,
        Command::Anchor { record } => {
            let config = SigilConfig::load(cli.config.as_deref())?;
            audit_cli::anchor_command(config, &record).await
        }
        Command::History { registry } => {
            let config = SigilConfig::load(cli.config.as_deref())?;
            audit_cli::history_command(config, registry.as_deref())
        }
        // Init deliberately skips configuration loading so a broken
        // sigil.yml can still be replaced with --force
        Command::Init { global, force } => audit_cli::init_command(global, force),
        #[cfg(feature = "publish")]
        Command::Publish {
            record,
            title,
            community,
        } => {
            let config = SigilConfig::load(cli.config.as_deref())?;
            audit_cli::publish_command(config, &record, title.as_deref(), community.as_deref())
                .await
        }
    }
}
