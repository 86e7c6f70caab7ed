//! turbo-fetch - Command line client for TurboCommerce APIs.
//!
//! Commands:
//! - `turbo-fetch request <path>` - Perform a request through a session
//! - `turbo-fetch config` - Show the resolved configuration

mod commands;
mod config;
mod context;
mod output;
mod transport;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::{ConfigArgs, RequestArgs};

/// turbo-fetch - Call TurboCommerce APIs with retries, deduplication and
/// token refresh
#[derive(Parser)]
#[command(name = "turbo-fetch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output and log format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL (overrides the config file)
    #[arg(long, global = true, env = "TURBO_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform a request
    Request(RequestArgs),

    /// Show the resolved configuration
    Config(ConfigArgs),
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "turbo_net=debug,turbo_auth=debug,turbo_cache=debug,info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let output = output::Output::new(cli.verbose, cli.json);

    let mut ctx = context::Context::load(cli.config.as_deref(), output)?;
    if let Some(base_url) = cli.base_url {
        ctx.config.session.base_url = base_url;
    }

    let result = match cli.command {
        Commands::Request(args) => commands::request::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
