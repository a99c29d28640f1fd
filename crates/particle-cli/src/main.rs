//! particle-cli - demo tool for the Particle Linux device SDK
//!
//! Reads the device's config and distro files (or runs in emulation mode
//! without them) and exercises each SDK call from the command line.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use particle_client::config::{
    DEFAULT_CONFIG_PATH, DEFAULT_DISTRO_VERSIONS_PATH, CONFIG_PATH_ENV, DISTRO_VERSIONS_PATH_ENV,
};
use particle_client::{ConfigPaths, ParticleSdk, PublishEndpoint, SdkOptions, DEFAULT_EVENT_TTL};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "particle-cli")]
#[command(author, version, about = "Particle Linux device SDK demo")]
#[command(propagate_version = true)]
struct Cli {
    /// Device config file
    #[arg(long, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config_path: PathBuf,

    /// Distro versions file
    #[arg(long, env = DISTRO_VERSIONS_PATH_ENV, default_value = DEFAULT_DISTRO_VERSIONS_PATH)]
    distro_path: PathBuf,

    /// Publish to the device-scoped events endpoint even if a product is configured
    #[arg(long)]
    device_scoped: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the configured user and device
    Whoami,

    /// Show the device record from the cloud
    Info,

    /// Show firmware and OS versions
    Versions,

    /// Publish a private event
    Publish {
        /// Event name
        name: String,

        /// Event payload
        data: String,

        /// Time to live in seconds
        #[arg(long, default_value_t = DEFAULT_EVENT_TTL)]
        ttl: u32,
    },

    /// Print incoming events until Ctrl+C
    Subscribe {
        /// Event name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let options = SdkOptions {
        publish_endpoint: if cli.device_scoped {
            PublishEndpoint::Device
        } else {
            PublishEndpoint::Auto
        },
        ..SdkOptions::default()
    };
    let paths = ConfigPaths::new(&cli.config_path, &cli.distro_path);
    let sdk = ParticleSdk::load_from(&paths, options).context("Failed to initialize SDK")?;

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);
    if sdk.is_emulated() {
        ctx.warn("Running in EMULATION mode: config and distro files are missing");
    }

    // Execute command
    match &cli.command {
        Commands::Whoami => commands::whoami(&sdk, &ctx)?,
        Commands::Info => commands::info(&sdk, &ctx).await?,
        Commands::Versions => commands::versions(&sdk, &ctx).await?,
        Commands::Publish { name, data, ttl } => {
            commands::publish(&sdk, name, data, *ttl, &ctx).await?
        }
        Commands::Subscribe { name } => commands::subscribe(&sdk, name, &ctx).await?,
    }

    Ok(())
}
