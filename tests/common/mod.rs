//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

use std::sync::Arc;

use test_bridge::adapters::{AdapterScript, RecordingHost, ScriptedAdapter};
use test_bridge::domain::models::legacy::{DiscoveryEvent, TestInfo, TestSuiteInfo};
use test_bridge::domain::models::test_item::{ItemTree, SharedItemTree};
use test_bridge::services::Converter;
use test_bridge::Config;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or timeout is reached.
#[allow(dead_code)]
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    predicate()
}

/// Configuration for tests: no automatic initial load, short timeouts.
#[allow(dead_code)]
pub fn test_config() -> Config {
    Config {
        initial_load_delay_ms: 3_600_000,
        discovery_timeout_secs: 5,
        run_start_timeout_secs: 5,
        ..Config::default()
    }
}

/// root { S { A, B }, C }
#[allow(dead_code)]
pub fn fixture_suite() -> TestSuiteInfo {
    TestSuiteInfo::new("root", "Root")
        .with_child(
            TestSuiteInfo::new("S", "S")
                .with_child(TestInfo::new("A", "A").at("/work/s.test.js", 3))
                .with_child(TestInfo::new("B", "B").at("/work/s.test.js", 9)),
        )
        .with_child(TestInfo::new("C", "C"))
}

/// A converter wired to a recording host over its own tree.
#[allow(dead_code)]
pub struct Harness {
    pub converter: Arc<Converter>,
    pub adapter: Arc<ScriptedAdapter>,
    pub host: RecordingHost,
    pub tree: SharedItemTree,
}

#[allow(dead_code)]
impl Harness {
    pub fn start(script: AdapterScript, host: RecordingHost, config: Config) -> Self {
        let adapter = Arc::new(ScriptedAdapter::new(script));
        let tree = ItemTree::shared();
        let converter = Converter::start(
            adapter.clone(),
            Arc::new(host.clone()),
            Arc::clone(&tree),
            config,
        );
        Self {
            converter,
            adapter,
            host,
            tree,
        }
    }

    /// Manual adapter named `mocha`; events are emitted by the test.
    pub fn manual() -> Self {
        Self::start(
            AdapterScript::new("mocha").manual(),
            RecordingHost::new(),
            test_config(),
        )
    }

    /// Emit a complete discovery pass and wait until it is applied.
    pub async fn discover(&self, finished: DiscoveryEvent) {
        let before = self.converter.passes();
        self.adapter.emit_discovery(DiscoveryEvent::Started);
        self.adapter.emit_discovery(finished);
        let converter = Arc::clone(&self.converter);
        assert!(
            wait_for(move || converter.passes() > before, 2_000).await,
            "discovery pass was not applied"
        );
    }

    /// Whether `legacy_id` is mirrored in the tree.
    pub async fn present(&self, legacy_id: &str) -> bool {
        match self.converter.lookup(legacy_id).await {
            Some(id) => self.tree.read().await.contains(id),
            None => false,
        }
    }

    /// Legacy ids of the children of `legacy_id`, in order.
    pub async fn children(&self, legacy_id: &str) -> Vec<String> {
        let Some(parent) = self.converter.lookup(legacy_id).await else {
            return Vec::new();
        };
        let tree = self.tree.read().await;
        tree.children_of(Some(parent))
            .iter()
            .filter_map(|id| tree.get(*id))
            .map(|item| item.legacy_id.clone())
            .collect()
    }
}
