//! Terminal native host for the CLI.
//!
//! Streams run results to stderr as they arrive and shows a spinner per
//! converter while discovery is in flight. Everything is also recorded so
//! the command can print a summary at the end.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::adapters::recording_host::RecordingHost;
use crate::domain::errors::BridgeResult;
use crate::domain::models::run::{Location, RunRequestContext, TestMessage};
use crate::domain::models::test_item::{ConverterId, ItemId, TestItem};
use crate::domain::ports::native_host::{NativeHost, TestRunSink};

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

pub struct ConsoleHost {
    recorder: RecordingHost,
    spinners: Mutex<HashMap<ConverterId, ProgressBar>>,
    quiet: bool,
}

impl ConsoleHost {
    /// `quiet` suppresses streaming output (JSON mode).
    pub fn new(quiet: bool) -> Self {
        Self {
            recorder: RecordingHost::new(),
            spinners: Mutex::new(HashMap::new()),
            quiet,
        }
    }

    pub fn recorder(&self) -> &RecordingHost {
        &self.recorder
    }

    fn spinner(&self, converter: &ConverterId) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if self.quiet {
            spinner.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            spinner.set_style(style.tick_chars(SPINNER_CHARS));
        }
        spinner.set_message(format!("Discovering tests for {converter}"));
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

impl NativeHost for ConsoleHost {
    fn create_run(
        &self,
        converter: &ConverterId,
        context: &RunRequestContext,
    ) -> Box<dyn TestRunSink> {
        if !self.quiet {
            eprintln!(
                "{} {} ({})",
                style("▶").cyan(),
                style(converter).bold(),
                context.profile.as_str()
            );
        }
        Box::new(ConsoleSink {
            inner: self.recorder.create_run(converter, context),
            quiet: self.quiet,
        })
    }

    fn derives_suite_state(&self) -> bool {
        self.recorder.derives_suite_state()
    }

    fn supports_continuous_run(&self) -> bool {
        true
    }

    fn invalidate_results(&self, items: &[ItemId]) {
        self.recorder.invalidate_results(items);
        if !self.quiet && !items.is_empty() {
            eprintln!("{} {} result(s) outdated", style("↻").yellow(), items.len());
        }
    }

    fn open_document(&self, content: &str) -> BridgeResult<()> {
        self.recorder.open_document(content)?;
        if !self.quiet {
            println!("{content}");
        }
        Ok(())
    }

    fn load_progress(&self, converter: &ConverterId, loading: bool) {
        self.recorder.load_progress(converter, loading);
        let mut spinners = self
            .spinners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if loading {
            spinners
                .entry(converter.clone())
                .or_insert_with(|| self.spinner(converter));
        } else if let Some(spinner) = spinners.remove(converter) {
            spinner.finish_and_clear();
        }
    }
}

impl std::fmt::Debug for ConsoleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleHost")
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

struct ConsoleSink {
    inner: Box<dyn TestRunSink>,
    quiet: bool,
}

impl ConsoleSink {
    fn line(&self, marker: console::StyledObject<&str>, item: &TestItem) {
        if !self.quiet {
            eprintln!("  {marker} {}", item.label);
        }
    }

    fn messages(&self, messages: &[TestMessage]) {
        if self.quiet {
            return;
        }
        for message in messages {
            for line in message.text.lines() {
                eprintln!("      {}", style(line).red());
            }
        }
    }
}

impl TestRunSink for ConsoleSink {
    fn enqueued(&mut self, item: &TestItem) {
        self.inner.enqueued(item);
    }

    fn started(&mut self, item: &TestItem) {
        self.inner.started(item);
    }

    fn passed(&mut self, item: &TestItem) {
        self.line(style("✓").green(), item);
        self.inner.passed(item);
    }

    fn failed(&mut self, item: &TestItem, messages: Vec<TestMessage>) {
        self.line(style("✗").red(), item);
        self.messages(&messages);
        self.inner.failed(item, messages);
    }

    fn errored(&mut self, item: &TestItem, messages: Vec<TestMessage>) {
        self.line(style("!").red().bold(), item);
        self.messages(&messages);
        self.inner.errored(item, messages);
    }

    fn skipped(&mut self, item: &TestItem) {
        self.line(style("-").yellow(), item);
        self.inner.skipped(item);
    }

    fn append_output(&mut self, output: &str, location: Option<&Location>, item: Option<&TestItem>) {
        self.inner.append_output(output, location, item);
    }

    fn end(&mut self) {
        self.inner.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::recording_host::SinkCall;
    use crate::domain::models::run::RunProfile;

    #[test]
    fn test_quiet_host_records_through() {
        let host = ConsoleHost::new(true);
        let converter = ConverterId::new("mocha");

        host.load_progress(&converter, true);
        host.load_progress(&converter, false);
        let mut sink = host.create_run(&converter, &RunRequestContext::new(RunProfile::Run, false));
        sink.end();

        assert_eq!(
            host.recorder().progress(),
            vec![(converter.clone(), true), (converter, false)]
        );
        assert_eq!(host.recorder().calls(), vec![SinkCall::End]);
    }
}
