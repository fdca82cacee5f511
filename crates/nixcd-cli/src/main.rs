mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use nixcd_core::OperationKind;
use settings::Overrides;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "nixcd",
    about = "Continuous deployment agent for NixOS machines",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, short = 'c', global = true, env = "NIXCD_CONFIG")]
    config: Option<PathBuf>,

    /// Host to deploy (nixosConfigurations attribute name)
    #[arg(long, global = true, env = "NIXCD_HOSTNAME")]
    hostname: Option<String>,

    /// Flake URL of the configuration repository
    #[arg(long, global = true, env = "NIXCD_FLAKE_URL")]
    flake_url: Option<String>,

    /// Directory holding durable state (GC roots)
    #[arg(long, global = true, env = "NIXCD_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// switch, boot, test or dry-activate
    #[arg(long, global = true, env = "NIXCD_OPERATION")]
    operation: Option<OperationKind>,

    /// Evaluate and build, but do not touch the running system
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log debug output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent: webhook server and optional periodic deployments
    Run,

    /// Deploy once and exit
    Deploy {
        /// Print the deployment result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a host (--hostname) or every host of the flake, without activating
    Build,

    /// List the hosts declared by the flake
    Hosts {
        #[arg(long)]
        json: bool,
    },

    /// Query the status of a running agent
    Status {
        /// Agent base URL (default: the configured webhook address)
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let build_host = cli.hostname.clone();
    let overrides = Overrides {
        hostname: cli.hostname,
        flake_url: cli.flake_url,
        state_dir: cli.state_dir,
        operation: cli.operation,
        dry_run: cli.dry_run,
    };

    let result = settings::load(cli.config.as_deref(), overrides).and_then(|config| {
        match cli.command {
            Commands::Run => cmd::run::run(&config),
            Commands::Deploy { json } => cmd::deploy::run(&config, json),
            Commands::Build => cmd::build::run(&config, build_host.as_deref()),
            Commands::Hosts { json } => cmd::hosts::run(&config, json),
            Commands::Status { url, json } => cmd::status::run(&config, url.as_deref(), json),
            Commands::Config => cmd::config::run(&config),
        }
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
