//! Implementation of the `test-bridge run` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{start_bridge, Bridge, CommandContext, ScriptArgs};
use crate::adapters::{RunRecord, SinkCall};
use crate::cli::output::table::{
    ConverterOutcomeRow, ResultState, TableFormatter, TestResultRow,
};
use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::BridgeResult;
use crate::domain::models::run::{RunOutcome, RunProfile, RunRequest};
use crate::domain::models::test_item::{ConverterId, ItemId};
use crate::services::bridge_controller::{BridgeController, RunReport};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub scripts: ScriptArgs,

    /// Test to run, by native id (`<converter>/<id>`) or unique legacy id.
    /// Omit to run everything.
    #[arg(short, long = "test", value_name = "ID")]
    pub tests: Vec<String>,

    /// Test to leave out of the run
    #[arg(short = 'x', long, value_name = "ID")]
    pub exclude: Vec<String>,

    /// Use the debug profile
    #[arg(long)]
    pub debug: bool,

    /// Keep rerunning retired tests until interrupted
    #[arg(short, long)]
    pub watch: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct RunOutput {
    pub outcomes: Vec<ConverterOutcomeRow>,
    pub results: Vec<TestResultRow>,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl RunOutput {
    fn new(report: RunReport, runs: &[RunRecord]) -> Self {
        let results = result_rows(runs);
        let count = |state: ResultState| results.iter().filter(|r| r.state == state).count();

        Self {
            outcomes: report.into_iter().map(outcome_row).collect(),
            passed: count(ResultState::Passed),
            failed: count(ResultState::Failed),
            errored: count(ResultState::Errored),
            skipped: count(ResultState::Skipped),
            results,
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut sections = Vec::new();

        if !self.results.is_empty() {
            sections.push(formatter.format_results(&self.results));
        }
        if self.outcomes.is_empty() {
            sections.push("No adapter owns the requested tests.".to_string());
        } else {
            sections.push(formatter.format_outcomes(&self.outcomes));
        }
        sections.push(format!(
            "{} passed, {} failed, {} errored, {} skipped",
            self.passed, self.failed, self.errored, self.skipped
        ));

        sections.join("\n\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RunArgs, ctx: &CommandContext) -> Result<()> {
    let bridge = start_bridge(ctx, &args.scripts).await?;
    let report = run_request(&bridge, &args).await;
    let runs = bridge.host().recorder().runs();
    bridge.shutdown().await;

    output(&RunOutput::new(report?, &runs), ctx.json);
    Ok(())
}

async fn run_request(bridge: &Bridge, args: &RunArgs) -> Result<RunReport> {
    let controller = bridge.controller();
    let profile = if args.debug {
        RunProfile::Debug
    } else {
        RunProfile::Run
    };

    let mut request = if args.tests.is_empty() {
        RunRequest::all(profile)
    } else {
        RunRequest::items(resolve_ids(controller, &args.tests).await?, profile)
    };
    request = request.excluding(resolve_ids(controller, &args.exclude).await?);
    if args.watch {
        request = request.continuous();
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted; cancelling run");
                cancel.cancel();
            }
        })
    };

    let report = controller.run(request, cancel).await;
    interrupt.abort();
    Ok(report)
}

async fn resolve_ids(controller: &BridgeController, ids: &[String]) -> Result<Vec<ItemId>> {
    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        let item = controller
            .resolve_test(id)
            .await
            .with_context(|| format!("Unknown or ambiguous test id: {id}"))?;
        resolved.push(item);
    }
    Ok(resolved)
}

fn outcome_row((converter, result): (ConverterId, BridgeResult<RunOutcome>)) -> ConverterOutcomeRow {
    let converter = converter.to_string();
    let (outcome, token) = match result {
        Ok(RunOutcome::Completed { token, runs }) if runs > 1 => {
            (format!("completed ({runs} runs)"), Some(token.to_string()))
        }
        Ok(RunOutcome::Completed { token, .. }) => ("completed".to_string(), Some(token.to_string())),
        Ok(RunOutcome::Unsupported) => ("debug unsupported".to_string(), None),
        Ok(RunOutcome::NothingToRun) => ("nothing to run".to_string(), None),
        Ok(RunOutcome::NotStarted) => ("not started".to_string(), None),
        Ok(RunOutcome::Disposed) => ("disposed".to_string(), None),
        Err(err) => {
            return ConverterOutcomeRow {
                converter,
                outcome: "error".to_string(),
                token: None,
                error: Some(err.to_string()),
            }
        }
    };
    ConverterOutcomeRow {
        converter,
        outcome,
        token,
        error: None,
    }
}

/// Final states reported to the native sessions, in order.
fn result_rows(runs: &[RunRecord]) -> Vec<TestResultRow> {
    runs.iter()
        .flat_map(|run| run.calls.iter())
        .filter_map(|call| {
            let (test, state, messages) = match call {
                SinkCall::Passed(id) => (id, ResultState::Passed, None),
                SinkCall::Skipped(id) => (id, ResultState::Skipped, None),
                SinkCall::Failed(id, messages) => (id, ResultState::Failed, Some(messages)),
                SinkCall::Errored(id, messages) => (id, ResultState::Errored, Some(messages)),
                _ => return None,
            };
            Some(TestResultRow {
                test: test.clone(),
                state,
                message: messages.and_then(|m| m.first()).map(|m| m.text.clone()),
            })
        })
        .collect()
}
