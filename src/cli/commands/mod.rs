//! CLI command implementations.
//!
//! Every command that talks to adapters builds the same in-process bridge:
//! scripted legacy adapters registered on a static hub, activated against a
//! console host.

pub mod activate;
pub mod refresh;
pub mod run;
pub mod show_error;
pub mod use_native;

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::adapters::{AdapterScript, ConsoleHost, ScriptedAdapter, StaticHub};
use crate::domain::models::config::Config;
use crate::domain::ports::adapter_hub::AdapterHub;
use crate::domain::ports::native_host::NativeHost;
use crate::services::activation::{Activation, BridgeSession};
use crate::services::bridge_controller::BridgeController;

/// State shared by every command of one CLI invocation.
#[derive(Debug)]
pub struct CommandContext {
    pub config: Config,
    pub session: BridgeSession,
    /// Project root holding the `.test-bridge` directory
    pub project_root: PathBuf,
    pub json: bool,
}

impl CommandContext {
    pub fn new(config: Config, project_root: PathBuf, json: bool) -> Self {
        Self {
            config,
            session: BridgeSession::new(),
            project_root,
            json,
        }
    }
}

/// Legacy adapter scripts to register.
#[derive(Args, Debug, Clone)]
pub struct ScriptArgs {
    /// YAML adapter script (repeat for several adapters)
    #[arg(short, long = "script", value_name = "FILE", required = true)]
    pub scripts: Vec<PathBuf>,
}

/// A running in-process bridge.
pub struct Bridge {
    activation: Activation,
    host: Arc<ConsoleHost>,
}

impl Bridge {
    pub fn controller(&self) -> &Arc<BridgeController> {
        self.activation.controller()
    }

    pub fn host(&self) -> &ConsoleHost {
        &self.host
    }

    pub async fn shutdown(self) {
        self.activation.shutdown().await;
    }
}

/// Load the scripts, activate the bridge and wait for initial discovery.
pub async fn start_bridge(ctx: &CommandContext, scripts: &ScriptArgs) -> Result<Bridge> {
    if scripts.scripts.is_empty() {
        bail!("No adapter scripts given; pass --script FILE");
    }

    let hub = Arc::new(StaticHub::new());
    for path in &scripts.scripts {
        let script = AdapterScript::from_file(path)
            .with_context(|| format!("Failed to load adapter script {}", path.display()))?;
        hub.add(Arc::new(ScriptedAdapter::new(script)));
    }

    let host = Arc::new(ConsoleHost::new(ctx.json));
    let activation = Activation::start(
        Some(hub as Arc<dyn AdapterHub>),
        Arc::clone(&host) as Arc<dyn NativeHost>,
        ctx.config.clone(),
        &ctx.session,
    )
    .await
    .context("Legacy adapter hub is not available")?;

    for (converter, discovered) in activation.controller().wait_for_discovery().await {
        if !discovered {
            warn!(converter = %converter, "initial discovery did not finish");
        }
    }

    Ok(Bridge { activation, host })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCRIPT: &str = r#"
name: mocha
discovery:
  - suite:
      id: root
      label: Root
      children:
        - type: test
          id: a
          label: A
"#;

    fn context() -> CommandContext {
        CommandContext::new(Config::default(), PathBuf::from("."), true)
    }

    #[tokio::test]
    async fn test_start_bridge_discovers_scripts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mocha.yaml");
        std::fs::write(&path, SCRIPT).unwrap();

        let ctx = context();
        let bridge = start_bridge(&ctx, &ScriptArgs { scripts: vec![path] })
            .await
            .unwrap();

        let snapshot = bridge.controller().snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].children.len(), 1);
        assert!(ctx.session.is_activated());
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_bridge_rejects_missing_script() {
        let ctx = context();
        let result = start_bridge(
            &ctx,
            &ScriptArgs {
                scripts: vec![PathBuf::from("/nonexistent/script.yaml")],
            },
        )
        .await;
        assert!(result.is_err());
    }
}
