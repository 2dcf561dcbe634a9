//! Cadenza CLI - Command-line interface for the cadenza mixing engine.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadenza")]
#[command(author, version, about = "Cadenza mixing engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scripted arpeggio headless and report levels
    Render(commands::render::RenderArgs),

    /// Print the default parameter tree as TOML
    Params(commands::params::ParamsArgs),

    /// List effect types, their parameters and presets
    Effects(commands::effects::EffectsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Params(args) => commands::params::run(args),
        Commands::Effects(args) => commands::effects::run(args),
    }
}
