//! Perch CLI - webhook server and manual controls for the review
//! pipeline

mod analyzer;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use perch_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{ReviewArgs, ServeArgs, StatusArgs};

/// Perch: automated pull request review pipeline
#[derive(Parser, Debug)]
#[command(name = "perch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a config file (defaults to ~/.config/perch/config.toml)
    #[arg(long, global = true, env = "PERCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Run the webhook server
    Serve(ServeArgs),

    /// Trigger a review for a pull request
    #[command(visible_alias = "r")]
    Review(ReviewArgs),

    /// Show recent review sessions
    #[command(visible_alias = "st")]
    Status(StatusArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?.with_env_overrides(),
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Version) => {
            println!("perch {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Review(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Status(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Config) => {
            println!("Perch Configuration");
            println!("===================");
            println!();
            println!("Server:");
            println!("  bind_addr: {}", config.server.bind_addr);
            println!();
            println!("Review:");
            println!("  skip_drafts: {}", config.review.skip_drafts);
            println!("  stage_timeout: {:?}", config.review.stage_timeout);
            println!("  max_inline_comments: {}", config.review.max_inline_comments);
            println!();
            println!("Analyzer:");
            println!("  command: {}", config.analyzer.command);
            println!();
            println!("GitHub:");
            println!("  api_base: {}", config.github.api_base);
            println!();
            if let Some(path) = Config::default_config_path() {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
        }
        None => {
            println!("Perch - automated pull request reviews");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
