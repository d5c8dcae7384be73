//! Implementation of the `test-bridge refresh` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::{start_bridge, CommandContext, ScriptArgs};
use crate::cli::output::table::supports_color;
use crate::cli::output::tree::render_item_tree;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::test_item::ItemSnapshot;

#[derive(Args, Debug)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub scripts: ScriptArgs,
}

#[derive(Debug, Serialize)]
pub struct RefreshEntry {
    pub converter: String,
    /// A discovery pass finished within the timeout
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshOutput {
    pub converters: Vec<RefreshEntry>,
    pub items: Vec<ItemSnapshot>,
}

impl CommandOutput for RefreshOutput {
    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self
            .converters
            .iter()
            .map(|entry| match (&entry.error, &entry.discovery_error, entry.completed) {
                (Some(err), _, _) => format!("{}: reload failed: {err}", entry.converter),
                (None, Some(_), _) => format!(
                    "{}: discovery failed (see `test-bridge show-error`)",
                    entry.converter
                ),
                (None, None, true) => format!("{}: reloaded", entry.converter),
                (None, None, false) => format!("{}: discovery timed out", entry.converter),
            })
            .collect();

        if !self.items.is_empty() {
            lines.push(String::new());
            lines.push(render_item_tree(&self.items, supports_color()).trim_end().to_string());
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RefreshArgs, ctx: &CommandContext) -> Result<()> {
    let bridge = start_bridge(ctx, &args.scripts).await?;
    let controller = bridge.controller();

    let mut converters = Vec::new();
    for (converter, result) in controller.refresh().await {
        let discovery_error = controller.discovery_error(&converter).await.ok().flatten();
        let (completed, error) = match result {
            Ok(completed) => (completed, None),
            Err(err) => (false, Some(err.to_string())),
        };
        converters.push(RefreshEntry {
            converter: converter.to_string(),
            completed,
            error,
            discovery_error,
        });
    }
    let items = controller.snapshot().await;

    bridge.shutdown().await;

    output(&RefreshOutput { converters, items }, ctx.json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_output_per_converter() {
        let out = RefreshOutput {
            converters: vec![
                RefreshEntry {
                    converter: "mocha".to_string(),
                    completed: true,
                    error: None,
                    discovery_error: None,
                },
                RefreshEntry {
                    converter: "jest".to_string(),
                    completed: true,
                    error: None,
                    discovery_error: Some("SyntaxError".to_string()),
                },
            ],
            items: Vec::new(),
        };

        let human = out.to_human();

        assert!(human.contains("mocha: reloaded"));
        assert!(human.contains("jest: discovery failed"));
    }
}
