//! Native testing host port.
//!
//! The host owns tree rendering, progress UI and result storage. The bridge
//! reports into it through a [`TestRunSink`] per run session and a handful
//! of controller-level notifications.

use crate::domain::errors::BridgeResult;
use crate::domain::models::run::{Location, RunRequestContext, TestMessage};
use crate::domain::models::test_item::{ConverterId, ItemId, TestItem};

/// One native run session.
///
/// Calls arrive in protocol order for a single session; the sink never sees
/// two sessions' calls interleaved within one event.
pub trait TestRunSink: Send {
    fn enqueued(&mut self, item: &TestItem);
    fn started(&mut self, item: &TestItem);
    fn passed(&mut self, item: &TestItem);
    fn failed(&mut self, item: &TestItem, messages: Vec<TestMessage>);
    fn errored(&mut self, item: &TestItem, messages: Vec<TestMessage>);
    fn skipped(&mut self, item: &TestItem);

    /// Append raw console output. Line endings are already `\r\n`.
    fn append_output(&mut self, output: &str, location: Option<&Location>, item: Option<&TestItem>);

    /// Close the session. No further calls follow.
    fn end(&mut self);
}

/// Port for the native testing host.
pub trait NativeHost: Send + Sync {
    /// Open a run session for one converter's share of a request.
    fn create_run(&self, converter: &ConverterId, context: &RunRequestContext)
        -> Box<dyn TestRunSink>;

    /// Whether the host computes suite status from its children. When it
    /// does not, the bridge announces each ancestor explicitly.
    fn derives_suite_state(&self) -> bool {
        true
    }

    /// Whether the host offers continuous (auto-rerun) runs.
    fn supports_continuous_run(&self) -> bool {
        true
    }

    /// Mark prior results of these items as outdated.
    fn invalidate_results(&self, items: &[ItemId]);

    /// Show raw text (e.g. a discovery error) in an editor surface.
    fn open_document(&self, content: &str) -> BridgeResult<()>;

    /// Discovery progress for one converter started (`true`) or ended.
    fn load_progress(&self, converter: &ConverterId, loading: bool);
}
