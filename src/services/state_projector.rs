//! Projection of legacy state events onto a native run session.
//!
//! The projector translates per-test and per-suite transitions into sink
//! calls. When the host does not derive suite status on its own, each
//! ancestor of a reported node is announced as started exactly once per
//! run, root first, before the node's own state.

use tracing::debug;

use crate::domain::models::legacy::{
    NodeRef, SuiteState, TestDecoration, TestDescriptor, TestEvent, TestState, TestSuiteEvent,
};
use crate::domain::models::run::TestMessage;
use crate::domain::models::test_item::{ItemId, ItemTree, TestItem};
use crate::services::run_correlator::ActiveRun;
use crate::services::tree_reconciler::TreeReconciler;
use crate::services::uri_mapping;

/// Stateless translator; per-run state lives in [`ActiveRun`].
#[derive(Debug, Clone, Copy)]
pub struct StateProjector {
    host_derives_suite_state: bool,
}

impl StateProjector {
    pub fn new(host_derives_suite_state: bool) -> Self {
        Self {
            host_derives_suite_state,
        }
    }

    pub fn on_suite(
        &self,
        run: &mut ActiveRun,
        event: &TestSuiteEvent,
        tree: &mut ItemTree,
        reconciler: &mut TreeReconciler,
    ) {
        let descriptor = match &event.suite {
            NodeRef::Descriptor(info) => Some(TestDescriptor::Suite(info.clone())),
            NodeRef::Id(_) => None,
        };
        let Some(id) = resolve(run, event.suite.id(), descriptor, tree, reconciler) else {
            debug!(legacy_id = event.suite.id(), "state for unknown suite dropped");
            return;
        };
        update_text(tree, id, event.description.as_ref(), event.tooltip.as_ref());

        match event.state {
            SuiteState::Running => {
                if !run.running_suites.contains(&id) {
                    run.running_suites.push(id);
                }
                if !self.host_derives_suite_state {
                    self.announce_ancestors(run, tree, id);
                    if run.announced.insert(id) {
                        if let Some(item) = tree.get(id) {
                            run.sink.started(item);
                        }
                    }
                }
            }
            SuiteState::Completed => {
                leave_suite(run, id);
            }
            SuiteState::Errored => {
                leave_suite(run, id);
                let Some(item) = tree.get(id) else {
                    return;
                };
                let text = event.message.as_deref().unwrap_or("Suite errored");
                echo_output(run, item, text);
                run.sink
                    .errored(item, vec![TestMessage::failure(text, item.location.clone())]);
            }
        }
    }

    pub fn on_test(
        &self,
        run: &mut ActiveRun,
        event: &TestEvent,
        tree: &mut ItemTree,
        reconciler: &mut TreeReconciler,
    ) {
        let descriptor = match &event.test {
            NodeRef::Descriptor(info) => Some(TestDescriptor::Test(info.clone())),
            NodeRef::Id(_) => None,
        };
        let Some(id) = resolve(run, event.test.id(), descriptor, tree, reconciler) else {
            debug!(legacy_id = event.test.id(), "state for unknown test dropped");
            return;
        };
        update_text(tree, id, event.description.as_ref(), event.tooltip.as_ref());

        if !self.host_derives_suite_state {
            self.announce_ancestors(run, tree, id);
        }

        let Some(item) = tree.get(id) else {
            return;
        };
        match event.state {
            TestState::Running => run.sink.started(item),
            TestState::Passed => {
                attach_info(run, item, event);
                run.sink.passed(item);
            }
            TestState::Skipped => {
                attach_info(run, item, event);
                run.sink.skipped(item);
            }
            TestState::Failed => {
                let messages = failure_messages(run, item, event);
                run.sink.failed(item, messages);
            }
            TestState::Errored => {
                let messages = failure_messages(run, item, event);
                run.sink.errored(item, messages);
            }
        }
    }

    fn announce_ancestors(&self, run: &mut ActiveRun, tree: &ItemTree, id: ItemId) {
        for ancestor in tree.ancestors(id) {
            if run.announced.insert(ancestor) {
                if let Some(item) = tree.get(ancestor) {
                    run.sink.started(item);
                }
            }
        }
    }
}

/// Look a node up; graft it when only a full descriptor knows about it.
fn resolve(
    run: &ActiveRun,
    legacy_id: &str,
    descriptor: Option<TestDescriptor>,
    tree: &mut ItemTree,
    reconciler: &mut TreeReconciler,
) -> Option<ItemId> {
    if let Some(id) = reconciler.lookup(legacy_id).filter(|id| tree.contains(*id)) {
        return Some(id);
    }
    let descriptor = descriptor?;
    let parent = run.current_suite(tree).or_else(|| reconciler.root(tree));
    reconciler.graft(tree, parent, &descriptor)
}

fn update_text(
    tree: &mut ItemTree,
    id: ItemId,
    description: Option<&String>,
    tooltip: Option<&String>,
) {
    let Some(item) = tree.get_mut(id) else {
        return;
    };
    if let Some(description) = description {
        item.description = Some(description.clone());
    }
    if let Some(tooltip) = tooltip {
        item.tooltip = Some(tooltip.clone());
    }
}

fn leave_suite(run: &mut ActiveRun, id: ItemId) {
    if let Some(pos) = run.running_suites.iter().rposition(|s| *s == id) {
        run.running_suites.remove(pos);
    }
}

fn echo_output(run: &mut ActiveRun, item: &TestItem, text: &str) {
    let mut output = uri_mapping::normalize_output(text);
    if !output.ends_with("\r\n") {
        output.push_str("\r\n");
    }
    run.sink.append_output(&output, item.location.as_ref(), Some(item));
}

fn decoration_text(decoration: &TestDecoration) -> String {
    match &decoration.hover {
        Some(hover) if hover != &decoration.message => format!("{}\n{}", decoration.message, hover),
        _ => decoration.message.clone(),
    }
}

/// Plain message and decorations on a non-failing test become
/// informational annotations in the output stream.
fn attach_info(run: &mut ActiveRun, item: &TestItem, event: &TestEvent) {
    if let Some(message) = &event.message {
        echo_output(run, item, message);
    }
    for decoration in &event.decorations {
        let location = uri_mapping::decoration_location(
            decoration.file.as_deref(),
            decoration.line,
            item.location.as_ref(),
        );
        let mut output = uri_mapping::normalize_output(&decoration_text(decoration));
        output.push_str("\r\n");
        run.sink.append_output(&output, location.as_ref(), Some(item));
    }
}

/// Structured messages for a failed or errored test. The plain message is
/// also echoed to the raw output stream.
fn failure_messages(run: &mut ActiveRun, item: &TestItem, event: &TestEvent) -> Vec<TestMessage> {
    let mut messages = Vec::with_capacity(event.decorations.len() + 1);
    if let Some(message) = &event.message {
        echo_output(run, item, message);
        messages.push(TestMessage::failure(message.clone(), item.location.clone()));
    }
    for decoration in &event.decorations {
        let location = uri_mapping::decoration_location(
            decoration.file.as_deref(),
            decoration.line,
            item.location.as_ref(),
        );
        messages.push(TestMessage::failure(decoration_text(decoration), location));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::recording_host::{RecordingHost, SinkCall};
    use crate::domain::models::legacy::{
        DiscoveryOutcome, TestInfo, TestRunStarted, TestSuiteInfo,
    };
    use crate::domain::models::run::{Location, RunProfile, RunRequestContext, RunToken};
    use crate::domain::models::test_item::ConverterId;
    use crate::services::run_correlator::RunCorrelator;

    struct Fixture {
        tree: ItemTree,
        rec: TreeReconciler,
        host: RecordingHost,
        corr: RunCorrelator,
        token: RunToken,
    }

    fn fixture(derives: bool) -> Fixture {
        let converter = ConverterId::new("mocha");
        let mut tree = ItemTree::new();
        let mut rec = TreeReconciler::new(converter.clone());
        let root = TestSuiteInfo::new("root", "Root").with_child(
            TestSuiteInfo::new("S", "S")
                .at("/src/s.js", 0)
                .with_child(TestInfo::new("A", "A").at("/src/s.js", 2))
                .with_child(TestInfo::new("B", "B").at("/src/s.js", 8)),
        );
        rec.apply(&mut tree, DiscoveryOutcome::Tree(root));

        let host = RecordingHost::new().with_suite_derivation(derives);
        let mut corr = RunCorrelator::new();
        let token = RunToken::new("T");
        let _ticket = corr.expect_run(RunRequestContext::new(RunProfile::Run, false), vec![]);
        let started = TestRunStarted {
            tests: vec![],
            test_run_id: Some("T".into()),
        };
        corr.on_started(token.clone(), &started, &tree, &rec, &host, &converter);
        Fixture {
            tree,
            rec,
            host,
            corr,
            token,
        }
    }

    impl Fixture {
        fn test(&mut self, projector: StateProjector, event: TestEvent) {
            let run = self.corr.session_mut(&self.token).unwrap();
            projector.on_test(run, &event, &mut self.tree, &mut self.rec);
        }

        fn suite(&mut self, projector: StateProjector, event: TestSuiteEvent) {
            let run = self.corr.session_mut(&self.token).unwrap();
            projector.on_suite(run, &event, &mut self.tree, &mut self.rec);
        }
    }

    fn suite_event(id: &str, state: SuiteState) -> TestSuiteEvent {
        TestSuiteEvent {
            suite: NodeRef::Id(id.into()),
            state,
            description: None,
            tooltip: None,
            message: None,
            test_run_id: Some("T".into()),
        }
    }

    #[test]
    fn test_passed_and_failed_with_decoration() {
        let mut f = fixture(true);
        let projector = StateProjector::new(true);

        f.test(projector, TestEvent::new("A", TestState::Passed));
        f.test(
            projector,
            TestEvent::new("B", TestState::Failed)
                .with_message("expected 1 to equal 2\nat B")
                .with_decoration(TestDecoration {
                    line: 10,
                    message: "expected 1".into(),
                    file: None,
                    hover: None,
                }),
        );

        let calls = f.host.calls();
        assert!(calls.contains(&SinkCall::Passed("mocha/A".into())));
        let failed = calls
            .iter()
            .find_map(|c| match c {
                SinkCall::Failed(id, messages) if id == "mocha/B" => Some(messages.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(failed.len(), 2);
        assert_eq!(
            failed[1].location,
            Some(Location {
                uri: "file:///src/s.js".into(),
                line: Some(10)
            })
        );
        assert!(calls.iter().any(|c| matches!(c,
            SinkCall::Output { text, item: Some(id), .. }
                if id == "mocha/B" && text == "expected 1 to equal 2\r\nat B\r\n")));
        // The host derives suite status; no ancestor announcements.
        assert!(!calls.contains(&SinkCall::Started("mocha/S".into())));
    }

    #[test]
    fn test_ancestors_announced_once_root_first() {
        let mut f = fixture(false);
        let projector = StateProjector::new(false);

        f.test(projector, TestEvent::new("A", TestState::Running));
        f.test(projector, TestEvent::new("A", TestState::Passed));
        f.test(projector, TestEvent::new("B", TestState::Failed));

        let started: Vec<SinkCall> = f
            .host
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, SinkCall::Enqueued(_)))
            .collect();
        assert_eq!(
            started,
            vec![
                SinkCall::Started("mocha/root".into()),
                SinkCall::Started("mocha/S".into()),
                SinkCall::Started("mocha/A".into()),
                SinkCall::Passed("mocha/A".into()),
                SinkCall::Failed("mocha/B".into(), vec![]),
            ]
        );
    }

    #[test]
    fn test_unknown_id_is_dropped() {
        let mut f = fixture(true);
        let projector = StateProjector::new(true);
        let before = f.host.calls().len();

        f.test(projector, TestEvent::new("nope", TestState::Passed));

        assert_eq!(f.host.calls().len(), before);
        assert!(f.rec.lookup("nope").is_none());
    }

    #[test]
    fn test_descriptor_grafted_under_running_suite() {
        let mut f = fixture(true);
        let projector = StateProjector::new(true);

        f.suite(projector, suite_event("S", SuiteState::Running));
        let mut event = TestEvent::new("ignored", TestState::Passed);
        event.test = NodeRef::Descriptor(TestInfo::new("A[1]", "A with 1"));
        f.test(projector, event);

        let grafted = f.rec.lookup("A[1]").unwrap();
        assert_eq!(f.tree.get(grafted).unwrap().parent(), f.rec.lookup("S"));
        assert!(f.host.calls().contains(&SinkCall::Passed("mocha/A[1]".into())));

        f.suite(projector, suite_event("S", SuiteState::Completed));
        assert!(f.corr.session_mut(&f.token).unwrap().running_suites.is_empty());
    }

    #[test]
    fn test_descriptor_falls_back_to_root_when_running_suite_is_gone() {
        let mut f = fixture(true);
        let projector = StateProjector::new(true);
        f.suite(projector, suite_event("S", SuiteState::Running));

        // Rediscovery without S while S is still marked running.
        let root = TestSuiteInfo::new("root", "Root").with_child(TestInfo::new("A", "A"));
        f.rec.apply(&mut f.tree, DiscoveryOutcome::Tree(root));
        assert!(f.rec.lookup("S").is_none());

        let mut event = TestEvent::new("ignored", TestState::Passed);
        event.test = NodeRef::Descriptor(TestInfo::new("X", "X"));
        f.test(projector, event);

        let root_id = f.rec.lookup("root").unwrap();
        let grafted = f.rec.lookup("X").unwrap();
        assert_eq!(f.tree.get(grafted).unwrap().parent(), Some(root_id));
        assert!(f.tree.subtree(root_id).contains(&grafted));

        f.rec.clear(&mut f.tree);
        assert!(f.tree.is_empty());
    }

    #[test]
    fn test_errored_suite_reports_message() {
        let mut f = fixture(true);
        let projector = StateProjector::new(true);
        let mut event = suite_event("S", SuiteState::Errored);
        event.message = Some("before hook failed".into());

        f.suite(projector, event);

        assert!(f.host.calls().iter().any(|c| matches!(c,
            SinkCall::Errored(id, messages) if id == "mocha/S" && messages[0].text == "before hook failed")));
    }

    #[test]
    fn test_description_update_and_info_message() {
        let mut f = fixture(true);
        let projector = StateProjector::new(true);
        let mut event = TestEvent::new("A", TestState::Passed).with_message("took 3ms");
        event.description = Some("3ms".into());

        f.test(projector, event);

        let a = f.rec.lookup("A").unwrap();
        assert_eq!(f.tree.get(a).unwrap().description.as_deref(), Some("3ms"));
        assert!(f.host.calls().iter().any(|c| matches!(c,
            SinkCall::Output { text, .. } if text == "took 3ms\r\n")));
    }
}
