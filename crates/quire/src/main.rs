//! quire: build, watch and render pipeline for a markdown blog.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;
mod tasks;

use config::Config;

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Build, watch and render pipeline for a markdown blog")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to quire.toml config file
    #[arg(short, long, default_value = "quire.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the site generator once
    Build,

    /// Compile stylesheets
    Style,

    /// Bundle and minify scripts
    Script,

    /// Optimize images
    Images,

    /// Resize social preview images
    PreviewImages,

    /// Build the site, then serve it and rebuild on changes
    Watch,

    /// Compile all assets, then watch (the default)
    Default,

    /// Convert a content file (or stdin) to HTML on stdout
    Render {
        /// Content file with optional front matter
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose. Logs go to stderr so `render` output
    // stays clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(&cli.config)?;
    let command = cli.command.unwrap_or(Commands::Default);

    if let Commands::Render { file } = command {
        return commands::render::run(&config, file);
    }

    config.paths.root = std::fs::canonicalize(&config.paths.root).with_context(|| {
        format!("Project root not found: {}", config.paths.root.display())
    })?;

    match command {
        Commands::Build => commands::build::run(&config, tasks::BUILD).await,
        Commands::Style => commands::build::run(&config, tasks::STYLE).await,
        Commands::Script => commands::build::run(&config, tasks::SCRIPT).await,
        Commands::Images => commands::build::run(&config, tasks::IMAGES).await,
        Commands::PreviewImages => commands::build::run(&config, tasks::PREVIEW_IMAGES).await,
        Commands::Watch => commands::watch::run(&config).await,
        Commands::Default => commands::build::run_default(&config).await,
        Commands::Render { .. } => Ok(()),
    }
}
