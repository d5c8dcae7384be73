//! Test Bridge CLI entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use test_bridge::cli::commands::{self, CommandContext};
use test_bridge::cli::{handle_error, Cli, Commands};
use test_bridge::infrastructure::config::ConfigLoader;
use test_bridge::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    let ctx = CommandContext::new(config, PathBuf::from("."), cli.json);

    match cli.command {
        Commands::Activate(args) => commands::activate::execute(args, &ctx).await,
        Commands::Run(args) => commands::run::execute(args, &ctx).await,
        Commands::Refresh(args) => commands::refresh::execute(args, &ctx).await,
        Commands::ShowError(args) => commands::show_error::execute(args, &ctx).await,
        Commands::UseNative(args) => commands::use_native::execute(args, &ctx).await,
    }
}
