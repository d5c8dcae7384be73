//! Scripted legacy adapter.
//!
//! Replays discovery results and test outcomes from a YAML script. The CLI
//! uses it to drive the bridge without an editor host; the test suite uses
//! it (often in manual mode, emitting events by hand) as the adapter double.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::models::legacy::{
    DiscoveryEvent, DiscoveryFinished, NodeRef, RetireEvent, SuiteState, TestDecoration,
    TestDescriptor, TestEvent, TestRunEvent, TestRunFinished, TestRunStarted, TestState,
    TestSuiteEvent, TestSuiteInfo,
};
use crate::domain::models::run::RunToken;
use crate::domain::ports::legacy_adapter::LegacyTestAdapter;

/// Result the script assigns to one test id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScriptedOutcome {
    pub state: TestState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorations: Vec<TestDecoration>,
}

impl ScriptedOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: TestState::Failed,
            message: Some(message.into()),
            decorations: Vec::new(),
        }
    }
}

/// Behaviour of a [`ScriptedAdapter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdapterScript {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_folder: Option<String>,
    #[serde(default)]
    pub supports_debug: bool,
    /// Expose a retirement stream.
    #[serde(default)]
    pub retire: bool,
    /// Result of each `load` call in order; the last one repeats.
    #[serde(default)]
    pub discovery: Vec<DiscoveryFinished>,
    /// Per-test outcomes; unlisted tests pass.
    #[serde(default)]
    pub outcomes: HashMap<String, ScriptedOutcome>,
    /// When set, `run` and `load` only record the call; events are emitted
    /// by hand through the `emit_*` methods.
    #[serde(default)]
    pub manual: bool,
    /// Make every `run` / `debug` call fail with this reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_error: Option<String>,
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

const fn default_capacity() -> usize {
    256
}

impl AdapterScript {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workspace_folder: None,
            supports_debug: false,
            retire: false,
            discovery: Vec::new(),
            outcomes: HashMap::new(),
            manual: false,
            run_error: None,
            channel_capacity: default_capacity(),
        }
    }

    pub fn with_discovery(mut self, finished: DiscoveryFinished) -> Self {
        self.discovery.push(finished);
        self
    }

    pub fn with_suite(self, suite: TestSuiteInfo) -> Self {
        self.with_discovery(DiscoveryFinished {
            suite: Some(suite),
            error_message: None,
        })
    }

    pub fn with_outcome(mut self, id: impl Into<String>, outcome: ScriptedOutcome) -> Self {
        self.outcomes.insert(id.into(), outcome);
        self
    }

    pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
        self.workspace_folder = Some(folder.into());
        self
    }

    pub fn debuggable(mut self) -> Self {
        self.supports_debug = true;
        self
    }

    pub fn with_retire(mut self) -> Self {
        self.retire = true;
        self
    }

    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    pub fn from_yaml(yaml: &str) -> BridgeResult<Self> {
        let script: Self = serde_yaml::from_str(yaml)
            .map_err(|e| BridgeError::InvalidFixture(e.to_string()))?;
        script.validate()?;
        Ok(script)
    }

    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::InvalidFixture(format!("{}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::InvalidFixture("adapter name is empty".into()));
        }
        if self.channel_capacity == 0 {
            return Err(BridgeError::InvalidFixture(
                "channel_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Calls the bridge made into the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterCalls {
    pub loads: usize,
    pub runs: Vec<Vec<String>>,
    pub debugs: Vec<Vec<String>>,
    pub cancels: usize,
}

/// Legacy adapter double driven by an [`AdapterScript`].
pub struct ScriptedAdapter {
    script: AdapterScript,
    discovery_tx: broadcast::Sender<DiscoveryEvent>,
    states_tx: broadcast::Sender<TestRunEvent>,
    retire_tx: broadcast::Sender<RetireEvent>,
    calls: Mutex<AdapterCalls>,
    current: Mutex<Option<TestSuiteInfo>>,
    cancelled: AtomicBool,
    next_run: AtomicU64,
}

impl std::fmt::Debug for ScriptedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAdapter")
            .field("name", &self.script.name)
            .field("manual", &self.script.manual)
            .finish_non_exhaustive()
    }
}

impl ScriptedAdapter {
    pub fn new(script: AdapterScript) -> Self {
        let capacity = script.channel_capacity.max(1);
        let (discovery_tx, _) = broadcast::channel(capacity);
        let (states_tx, _) = broadcast::channel(capacity);
        let (retire_tx, _) = broadcast::channel(capacity);
        Self {
            script,
            discovery_tx,
            states_tx,
            retire_tx,
            calls: Mutex::new(AdapterCalls::default()),
            current: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            next_run: AtomicU64::new(1),
        }
    }

    pub fn script(&self) -> &AdapterScript {
        &self.script
    }

    /// Snapshot of the calls received so far.
    pub fn calls(&self) -> AdapterCalls {
        lock(&self.calls).clone()
    }

    pub fn emit_discovery(&self, event: DiscoveryEvent) {
        if let DiscoveryEvent::Finished(DiscoveryFinished {
            suite: Some(suite), ..
        }) = &event
        {
            *lock(&self.current) = Some(suite.clone());
        }
        let _ = self.discovery_tx.send(event);
    }

    pub fn emit_state(&self, event: TestRunEvent) {
        let _ = self.states_tx.send(event);
    }

    pub fn emit_retire(&self, event: RetireEvent) {
        let _ = self.retire_tx.send(event);
    }

    fn discovery_for(&self, load: usize) -> DiscoveryFinished {
        let discovery = &self.script.discovery;
        discovery
            .get(load.min(discovery.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_default()
    }

    async fn play(&self, ids: &[String]) {
        self.cancelled.store(false, Ordering::SeqCst);
        let token = RunToken::new(format!("run-{}", self.next_run.fetch_add(1, Ordering::SeqCst)));
        let raw = token.as_option().map(str::to_string);

        self.emit_state(TestRunEvent::Started(TestRunStarted {
            tests: ids.to_vec(),
            test_run_id: raw.clone(),
        }));
        tokio::task::yield_now().await;

        let current = lock(&self.current).clone();
        if let Some(root) = current {
            let root = TestDescriptor::Suite(root);
            for id in ids {
                if let Some(node) = find(&root, id) {
                    self.play_node(node, &token).await;
                }
            }
        }

        self.emit_state(TestRunEvent::Finished(TestRunFinished { test_run_id: raw }));
        tokio::task::yield_now().await;
    }

    fn play_node<'a>(&'a self, node: &'a TestDescriptor, token: &'a RunToken) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.cancelled.load(Ordering::SeqCst) {
                return;
            }
            match node {
                TestDescriptor::Suite(suite) => {
                    self.emit_suite(&suite.id, SuiteState::Running, token);
                    for child in &suite.children {
                        self.play_node(child, token).await;
                    }
                    self.emit_suite(&suite.id, SuiteState::Completed, token);
                }
                TestDescriptor::Test(test) => {
                    self.emit_state(TestRunEvent::Test(
                        TestEvent::new(test.id.clone(), TestState::Running).in_run(token),
                    ));
                    tokio::task::yield_now().await;

                    let mut event = match self.script.outcomes.get(&test.id) {
                        Some(outcome) => {
                            let mut event = TestEvent::new(test.id.clone(), outcome.state);
                            event.message.clone_from(&outcome.message);
                            event.decorations.clone_from(&outcome.decorations);
                            event
                        }
                        None if test.skipped => TestEvent::new(test.id.clone(), TestState::Skipped),
                        None => TestEvent::new(test.id.clone(), TestState::Passed),
                    };
                    event = event.in_run(token);
                    self.emit_state(TestRunEvent::Test(event));
                    tokio::task::yield_now().await;
                }
            }
        })
    }

    fn emit_suite(&self, id: &str, state: SuiteState, token: &RunToken) {
        self.emit_state(TestRunEvent::Suite(TestSuiteEvent {
            suite: NodeRef::Id(id.to_string()),
            state,
            description: None,
            tooltip: None,
            message: None,
            test_run_id: token.as_option().map(str::to_string),
        }));
    }

    async fn execute(&self, ids: &[String], operation: &'static str) -> BridgeResult<()> {
        if let Some(reason) = &self.script.run_error {
            return Err(BridgeError::adapter_call(&self.script.name, operation, reason));
        }
        if !self.script.manual {
            self.play(ids).await;
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn find<'a>(node: &'a TestDescriptor, id: &str) -> Option<&'a TestDescriptor> {
    if node.id() == id {
        return Some(node);
    }
    node.children().iter().find_map(|child| find(child, id))
}

#[async_trait]
impl LegacyTestAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.script.name
    }

    fn workspace_folder(&self) -> Option<&str> {
        self.script.workspace_folder.as_deref()
    }

    fn subscribe_discovery(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.discovery_tx.subscribe()
    }

    fn subscribe_states(&self) -> broadcast::Receiver<TestRunEvent> {
        self.states_tx.subscribe()
    }

    fn subscribe_retire(&self) -> Option<broadcast::Receiver<RetireEvent>> {
        self.script.retire.then(|| self.retire_tx.subscribe())
    }

    fn supports_debug(&self) -> bool {
        self.script.supports_debug
    }

    async fn load(&self) -> BridgeResult<()> {
        let load = {
            let mut calls = lock(&self.calls);
            calls.loads += 1;
            calls.loads - 1
        };
        debug!(adapter = %self.script.name, load, "scripted load");
        if self.script.manual {
            return Ok(());
        }

        self.emit_discovery(DiscoveryEvent::Started);
        tokio::task::yield_now().await;
        self.emit_discovery(DiscoveryEvent::Finished(self.discovery_for(load)));
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn run(&self, ids: &[String]) -> BridgeResult<()> {
        lock(&self.calls).runs.push(ids.to_vec());
        self.execute(ids, "run").await
    }

    async fn debug(&self, ids: &[String]) -> BridgeResult<()> {
        if !self.script.supports_debug {
            return Err(BridgeError::DebugUnsupported(self.script.name.clone()));
        }
        lock(&self.calls).debugs.push(ids.to_vec());
        self.execute(ids, "debug").await
    }

    fn cancel(&self) {
        lock(&self.calls).cancels += 1;
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::legacy::TestInfo;

    #[test]
    fn test_script_from_yaml() {
        let yaml = r#"
name: mocha
workspace_folder: /work/app
supports_debug: true
discovery:
  - suite:
      id: root
      label: Root
      children:
        - type: test
          id: a
          label: A
          file: /work/app/a.js
          line: 2
  - errorMessage: "SyntaxError: unexpected token"
outcomes:
  a:
    state: failed
    message: expected 1 to equal 2
"#;
        let script = AdapterScript::from_yaml(yaml).unwrap();
        assert_eq!(script.name, "mocha");
        assert!(script.supports_debug);
        assert_eq!(script.discovery.len(), 2);
        assert_eq!(script.outcomes["a"].state, TestState::Failed);
        assert_eq!(
            script.discovery[1].error_message.as_deref(),
            Some("SyntaxError: unexpected token")
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = AdapterScript::from_yaml("name: ''").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidFixture(_)));
    }

    #[tokio::test]
    async fn test_last_discovery_repeats() {
        let adapter = ScriptedAdapter::new(
            AdapterScript::new("mocha")
                .with_suite(TestSuiteInfo::new("root", "First"))
                .with_suite(TestSuiteInfo::new("root", "Second")),
        );
        let mut rx = adapter.subscribe_discovery();

        for _ in 0..3 {
            adapter.load().await.unwrap();
        }

        let mut labels = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DiscoveryEvent::Finished(f) = event {
                labels.push(f.suite.unwrap().label);
            }
        }
        assert_eq!(labels, vec!["First", "Second", "Second"]);
        assert_eq!(adapter.calls().loads, 3);
    }

    #[tokio::test]
    async fn test_run_plays_outcomes_in_order() {
        let adapter = ScriptedAdapter::new(
            AdapterScript::new("mocha")
                .with_suite(
                    TestSuiteInfo::new("root", "Root").with_child(
                        TestSuiteInfo::new("S", "S")
                            .with_child(TestInfo::new("a", "A"))
                            .with_child(TestInfo::new("b", "B")),
                    ),
                )
                .with_outcome("b", ScriptedOutcome::failed("boom")),
        );
        adapter.load().await.unwrap();
        let mut rx = adapter.subscribe_states();

        adapter.run(&["S".to_string()]).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.token(), RunToken::new("run-1"));
            kinds.push(match event {
                TestRunEvent::Test(t) => format!("{}:{}", t.test.id(), t.state.as_str()),
                other => other.kind().to_string(),
            });
        }
        assert_eq!(
            kinds,
            vec![
                "started", "suite", "a:running", "a:passed", "b:running", "b:failed", "suite",
                "finished"
            ]
        );
    }

    #[tokio::test]
    async fn test_debug_without_support_fails() {
        let adapter = ScriptedAdapter::new(AdapterScript::new("mocha"));
        let err = adapter.debug(&["a".into()]).await.unwrap_err();
        assert!(matches!(err, BridgeError::DebugUnsupported(_)));
        assert!(adapter.calls().debugs.is_empty());
    }
}
