//! Implementation of the `test-bridge use-native` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::CommandContext;
use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct UseNativeArgs {
    /// Go back to the bridged legacy adapters
    #[arg(long)]
    pub disable: bool,
}

#[derive(Debug, Serialize)]
pub struct UseNativeOutput {
    pub use_native_testing: bool,
    pub config_path: String,
}

impl CommandOutput for UseNativeOutput {
    fn to_human(&self) -> String {
        if self.use_native_testing {
            format!("Native testing enabled in {}", self.config_path)
        } else {
            format!("Native testing disabled in {}", self.config_path)
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: UseNativeArgs, ctx: &CommandContext) -> Result<()> {
    let enabled = !args.disable;
    let path = ConfigLoader::persist_use_native(&ctx.project_root, enabled)?;

    output(
        &UseNativeOutput {
            use_native_testing: enabled,
            config_path: path.display().to_string(),
        },
        ctx.json,
    );
    Ok(())
}
