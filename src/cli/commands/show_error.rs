//! Implementation of the `test-bridge show-error` command.
//!
//! Opens the discovery error of a converter as a document on the host. The
//! console host prints the document, so the human summary only names the
//! converters.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::{start_bridge, CommandContext, ScriptArgs};
use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::BridgeResult;
use crate::domain::models::test_item::ConverterId;
use crate::services::bridge_controller::BridgeController;

#[derive(Args, Debug)]
pub struct ShowErrorArgs {
    #[command(flatten)]
    pub scripts: ScriptArgs,

    /// Converter whose error to show (all converters when omitted)
    #[arg(long, value_name = "ID")]
    pub converter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShownError {
    pub converter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShowErrorOutput {
    pub errors: Vec<ShownError>,
}

impl CommandOutput for ShowErrorOutput {
    fn to_human(&self) -> String {
        self.errors
            .iter()
            .map(|shown| match shown.error {
                Some(_) => format!("{}: discovery error shown above", shown.converter),
                None => format!("{}: no discovery error", shown.converter),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ShowErrorArgs, ctx: &CommandContext) -> Result<()> {
    let bridge = start_bridge(ctx, &args.scripts).await?;
    let controller = bridge.controller();

    let targets = match args.converter {
        Some(id) => vec![ConverterId::new(id)],
        None => controller.converter_ids().await,
    };

    let mut errors = Vec::with_capacity(targets.len());
    let mut failure = None;
    for converter in targets {
        match show(controller, &converter).await {
            Ok(error) => errors.push(ShownError {
                converter: converter.to_string(),
                error,
            }),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    bridge.shutdown().await;

    if let Some(err) = failure {
        return Err(err.into());
    }
    output(&ShowErrorOutput { errors }, ctx.json);
    Ok(())
}

async fn show(
    controller: &BridgeController,
    converter: &ConverterId,
) -> BridgeResult<Option<String>> {
    let error = controller.discovery_error(converter).await?;
    controller.show_discovery_error(converter).await?;
    Ok(error)
}
