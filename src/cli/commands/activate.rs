//! Implementation of the `test-bridge activate` command.
//!
//! Activates the bridge for the given adapter scripts and prints the mirrored
//! test tree once initial discovery has settled.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::{start_bridge, CommandContext, ScriptArgs};
use crate::cli::output::table::supports_color;
use crate::cli::output::tree::{count_items, render_item_tree};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::test_item::ItemSnapshot;

#[derive(Args, Debug)]
pub struct ActivateArgs {
    #[command(flatten)]
    pub scripts: ScriptArgs,
}

#[derive(Debug, Serialize)]
pub struct ActivateOutput {
    pub converters: Vec<String>,
    pub items: Vec<ItemSnapshot>,
    /// Whether to offer the permanent switch to native testing
    pub offer_native_switch: bool,
}

impl CommandOutput for ActivateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Bridge active for {} adapter(s), {} item(s) discovered.",
            self.converters.len(),
            count_items(&self.items)
        )];

        if !self.items.is_empty() {
            lines.push(String::new());
            lines.push(render_item_tree(&self.items, supports_color()).trim_end().to_string());
        }

        if self.offer_native_switch {
            lines.push(String::new());
            lines.push(
                "Tip: run `test-bridge use-native` to always use native testing for this project."
                    .to_string(),
            );
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ActivateArgs, ctx: &CommandContext) -> Result<()> {
    let bridge = start_bridge(ctx, &args.scripts).await?;

    let converters = bridge
        .controller()
        .converter_ids()
        .await
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    let items = bridge.controller().snapshot().await;
    let offer_native_switch =
        !ctx.config.use_native_testing && ctx.session.take_native_switch_offer();

    bridge.shutdown().await;

    output(
        &ActivateOutput {
            converters,
            items,
            offer_native_switch,
        },
        ctx.json,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_output_offers_switch() {
        let out = ActivateOutput {
            converters: vec!["mocha".to_string()],
            items: Vec::new(),
            offer_native_switch: true,
        };
        let human = out.to_human();
        assert!(human.starts_with("Bridge active for 1 adapter(s), 0 item(s) discovered."));
        assert!(human.contains("use-native"));

        let json = out.to_json();
        assert_eq!(json["offer_native_switch"], true);
    }
}
