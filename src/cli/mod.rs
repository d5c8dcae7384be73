//! Command-line interface.
//!
//! Drives the bridge in-process with scripted legacy adapters and a console
//! host, so discovery and runs can be exercised without an editor.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::activate::ActivateArgs;
use commands::refresh::RefreshArgs;
use commands::run::RunArgs;
use commands::show_error::ShowErrorArgs;
use commands::use_native::UseNativeArgs;

#[derive(Parser, Debug)]
#[command(name = "test-bridge")]
#[command(about = "Bridge legacy test adapters to the native testing protocol", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .test-bridge/config.yaml with overrides)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Activate the bridge and show the discovered tests
    Activate(ActivateArgs),

    /// Run tests through the bridge
    Run(RunArgs),

    /// Re-trigger discovery on every adapter
    Refresh(RefreshArgs),

    /// Show the discovery error of an adapter
    ShowError(ShowErrorArgs),

    /// Switch this project permanently to native testing
    UseNative(UseNativeArgs),
}

/// Report a command failure and exit with status 1.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain.get(1..).unwrap_or_default(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("Error:").red().bold());
    }
    std::process::exit(1);
}
