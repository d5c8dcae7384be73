//! In-memory native host that records every call.
//!
//! Used by the test suite and as the storage layer behind the console host.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::domain::errors::BridgeResult;
use crate::domain::models::run::{Location, RunRequestContext, TestMessage};
use crate::domain::models::test_item::{ConverterId, ItemId, TestItem};
use crate::domain::ports::native_host::{NativeHost, TestRunSink};

/// One sink call, with items reduced to their native ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Enqueued(String),
    Started(String),
    Passed(String),
    Failed(String, Vec<TestMessage>),
    Errored(String, Vec<TestMessage>),
    Skipped(String),
    Output {
        text: String,
        location: Option<Location>,
        item: Option<String>,
    },
    End,
}

impl SinkCall {
    /// Native id of the item the call is about.
    pub fn item(&self) -> Option<&str> {
        match self {
            Self::Enqueued(id)
            | Self::Started(id)
            | Self::Passed(id)
            | Self::Skipped(id)
            | Self::Failed(id, _)
            | Self::Errored(id, _) => Some(id),
            Self::Output { item, .. } => item.as_deref(),
            Self::End => None,
        }
    }
}

/// Calls of one run session.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub converter: ConverterId,
    pub context: RunRequestContext,
    pub calls: Vec<SinkCall>,
}

impl RunRecord {
    pub fn ended(&self) -> bool {
        self.calls.last() == Some(&SinkCall::End)
    }
}

#[derive(Debug, Default)]
struct Recorded {
    runs: Vec<RunRecord>,
    invalidated: Vec<ItemId>,
    opened: Vec<String>,
    progress: Vec<(ConverterId, bool)>,
}

/// Native host that keeps everything in memory.
#[derive(Debug, Clone)]
pub struct RecordingHost {
    recorded: Arc<Mutex<Recorded>>,
    changed: Arc<Notify>,
    derives_suite_state: bool,
    continuous: bool,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Recorded::default())),
            changed: Arc::new(Notify::new()),
            derives_suite_state: true,
            continuous: true,
        }
    }

    pub fn with_suite_derivation(mut self, derives: bool) -> Self {
        self.derives_suite_state = derives;
        self
    }

    pub fn with_continuous_support(mut self, supported: bool) -> Self {
        self.continuous = supported;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Every session created so far, in creation order.
    pub fn runs(&self) -> Vec<RunRecord> {
        self.lock().runs.clone()
    }

    /// Calls of every session, flattened in session order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.lock()
            .runs
            .iter()
            .flat_map(|r| r.calls.iter().cloned())
            .collect()
    }

    pub fn invalidated(&self) -> Vec<ItemId> {
        self.lock().invalidated.clone()
    }

    pub fn opened_documents(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn progress(&self) -> Vec<(ConverterId, bool)> {
        self.lock().progress.clone()
    }

    /// Forget every recorded call.
    pub fn clear(&self) {
        *self.lock() = Recorded::default();
    }

    /// Resolves after the next recorded change.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

impl NativeHost for RecordingHost {
    fn create_run(
        &self,
        converter: &ConverterId,
        context: &RunRequestContext,
    ) -> Box<dyn TestRunSink> {
        let index = {
            let mut recorded = self.lock();
            recorded.runs.push(RunRecord {
                converter: converter.clone(),
                context: context.clone(),
                calls: Vec::new(),
            });
            recorded.runs.len() - 1
        };
        self.changed.notify_waiters();
        Box::new(RecordingSink {
            host: self.clone(),
            index,
        })
    }

    fn derives_suite_state(&self) -> bool {
        self.derives_suite_state
    }

    fn supports_continuous_run(&self) -> bool {
        self.continuous
    }

    fn invalidate_results(&self, items: &[ItemId]) {
        self.lock().invalidated.extend_from_slice(items);
        self.changed.notify_waiters();
    }

    fn open_document(&self, content: &str) -> BridgeResult<()> {
        self.lock().opened.push(content.to_string());
        Ok(())
    }

    fn load_progress(&self, converter: &ConverterId, loading: bool) {
        self.lock().progress.push((converter.clone(), loading));
        self.changed.notify_waiters();
    }
}

struct RecordingSink {
    host: RecordingHost,
    index: usize,
}

impl RecordingSink {
    fn push(&self, call: SinkCall) {
        if let Some(run) = self.host.lock().runs.get_mut(self.index) {
            run.calls.push(call);
        }
        self.host.changed.notify_waiters();
    }
}

impl TestRunSink for RecordingSink {
    fn enqueued(&mut self, item: &TestItem) {
        self.push(SinkCall::Enqueued(item.native_id.clone()));
    }

    fn started(&mut self, item: &TestItem) {
        self.push(SinkCall::Started(item.native_id.clone()));
    }

    fn passed(&mut self, item: &TestItem) {
        self.push(SinkCall::Passed(item.native_id.clone()));
    }

    fn failed(&mut self, item: &TestItem, messages: Vec<TestMessage>) {
        self.push(SinkCall::Failed(item.native_id.clone(), messages));
    }

    fn errored(&mut self, item: &TestItem, messages: Vec<TestMessage>) {
        self.push(SinkCall::Errored(item.native_id.clone(), messages));
    }

    fn skipped(&mut self, item: &TestItem) {
        self.push(SinkCall::Skipped(item.native_id.clone()));
    }

    fn append_output(&mut self, output: &str, location: Option<&Location>, item: Option<&TestItem>) {
        self.push(SinkCall::Output {
            text: output.to_string(),
            location: location.cloned(),
            item: item.map(|i| i.native_id.clone()),
        });
    }

    fn end(&mut self) {
        self.push(SinkCall::End);
    }
}
