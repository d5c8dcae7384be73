//! Legacy test adapter protocol models.
//!
//! These mirror the JSON shapes the legacy adapter emits: a recursive
//! suite/test descriptor tree produced by discovery, and a stream of run
//! events (`started`, `suite`, `test`, `finished`) tagged with an optional
//! run-correlation token.

use serde::{Deserialize, Serialize};

use super::run::RunToken;

/// A single test as described by the legacy adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
    /// Identifier, unique within one adapter's namespace.
    pub id: String,
    /// Display label.
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// Source file (plain path or URI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Zero-based line in `file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub debuggable: bool,
    /// Set when the adapter could not fully load this test.
    #[serde(default)]
    pub errored: bool,
    /// Error detail accompanying `errored`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            tooltip: None,
            file: None,
            line: None,
            skipped: false,
            debuggable: false,
            errored: false,
            message: None,
        }
    }

    /// Set the source location.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A suite as described by the legacy adapter, with its ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteInfo {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub debuggable: bool,
    #[serde(default)]
    pub errored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub children: Vec<TestDescriptor>,
}

impl TestSuiteInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            tooltip: None,
            file: None,
            line: None,
            debuggable: false,
            errored: false,
            message: None,
            children: Vec::new(),
        }
    }

    /// Append a child descriptor.
    pub fn with_child(mut self, child: impl Into<TestDescriptor>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

/// Either a suite or a test in a discovery tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestDescriptor {
    Suite(TestSuiteInfo),
    Test(TestInfo),
}

impl From<TestInfo> for TestDescriptor {
    fn from(info: TestInfo) -> Self {
        Self::Test(info)
    }
}

impl From<TestSuiteInfo> for TestDescriptor {
    fn from(info: TestSuiteInfo) -> Self {
        Self::Suite(info)
    }
}

impl TestDescriptor {
    pub fn id(&self) -> &str {
        match self {
            Self::Suite(s) => &s.id,
            Self::Test(t) => &t.id,
        }
    }

    pub fn is_suite(&self) -> bool {
        matches!(self, Self::Suite(_))
    }

    /// Children of a suite; tests have none.
    pub fn children(&self) -> &[TestDescriptor] {
        match self {
            Self::Suite(s) => &s.children,
            Self::Test(_) => &[],
        }
    }

    /// The discovery-error message, if the adapter flagged this node as errored.
    pub fn error(&self) -> Option<&str> {
        let (errored, message) = match self {
            Self::Suite(s) => (s.errored, s.message.as_deref()),
            Self::Test(t) => (t.errored, t.message.as_deref()),
        };
        if errored {
            Some(message.unwrap_or("Failed to load"))
        } else {
            None
        }
    }
}

/// Reference to a node in a run event: a bare id or a full descriptor.
///
/// Adapters that create tests while running (parameterized tests, for
/// instance) send the full descriptor so the bridge can materialize it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeRef<T> {
    Id(String),
    Descriptor(T),
}

impl NodeRef<TestInfo> {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Descriptor(info) => &info.id,
        }
    }
}

impl NodeRef<TestSuiteInfo> {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Descriptor(info) => &info.id,
        }
    }
}

/// Discovery lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoveryEvent {
    Started,
    Finished(DiscoveryFinished),
}

impl DiscoveryEvent {
    pub fn finished_with_suite(suite: TestSuiteInfo) -> Self {
        Self::Finished(DiscoveryFinished {
            suite: Some(suite),
            error_message: None,
        })
    }

    pub fn finished_with_error(message: impl Into<String>) -> Self {
        Self::Finished(DiscoveryFinished {
            suite: None,
            error_message: Some(message.into()),
        })
    }

    pub fn finished_empty() -> Self {
        Self::Finished(DiscoveryFinished::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryFinished {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<TestSuiteInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// What a finished discovery pass means for the mirrored tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// A (possibly partial) tree to reconcile against.
    Tree(TestSuiteInfo),
    /// Discovery failed; the tree is replaced by one error node.
    Error(String),
    /// Nothing reported (still loading); the tree is left untouched.
    Empty,
}

impl DiscoveryFinished {
    pub fn into_outcome(self) -> DiscoveryOutcome {
        match (self.error_message, self.suite) {
            (Some(message), _) => DiscoveryOutcome::Error(message),
            (None, Some(suite)) => DiscoveryOutcome::Tree(suite),
            (None, None) => DiscoveryOutcome::Empty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteState {
    Running,
    Completed,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    Running,
    Passed,
    Failed,
    Skipped,
    Errored,
}

impl TestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// An inline message tied to a file and zero-based line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDecoration {
    pub line: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunStarted {
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunFinished {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteEvent {
    pub suite: NodeRef<TestSuiteInfo>,
    pub state: SuiteState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEvent {
    pub test: NodeRef<TestInfo>,
    pub state: TestState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorations: Vec<TestDecoration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run_id: Option<String>,
}

impl TestEvent {
    pub fn new(test: impl Into<String>, state: TestState) -> Self {
        Self {
            test: NodeRef::Id(test.into()),
            state,
            message: None,
            decorations: Vec::new(),
            description: None,
            tooltip: None,
            test_run_id: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_decoration(mut self, decoration: TestDecoration) -> Self {
        self.decorations.push(decoration);
        self
    }

    pub fn in_run(mut self, token: &RunToken) -> Self {
        self.test_run_id = token.as_option().map(str::to_string);
        self
    }
}

/// Events on the legacy adapter's state stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestRunEvent {
    Started(TestRunStarted),
    Finished(TestRunFinished),
    Suite(TestSuiteEvent),
    Test(TestEvent),
}

impl TestRunEvent {
    /// The run-correlation token this event belongs to.
    pub fn token(&self) -> RunToken {
        let raw = match self {
            Self::Started(e) => e.test_run_id.as_deref(),
            Self::Finished(e) => e.test_run_id.as_deref(),
            Self::Suite(e) => e.test_run_id.as_deref(),
            Self::Test(e) => e.test_run_id.as_deref(),
        };
        RunToken::from_option(raw)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::Finished(_) => "finished",
            Self::Suite(_) => "suite",
            Self::Test(_) => "test",
        }
    }
}

/// Notification that prior results for some tests are stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetireEvent {
    /// Retired ids; `None` means every test of the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_tree_deserializes() {
        let json = r#"{
            "type": "finished",
            "suite": {
                "type": "suite",
                "id": "root",
                "label": "Mocha",
                "children": [
                    {"type": "test", "id": "a", "label": "A", "file": "/src/a.js", "line": 3},
                    {"type": "suite", "id": "s", "label": "S", "children": []}
                ]
            }
        }"#;

        let event: DiscoveryEvent = serde_json::from_str(json).unwrap();
        let DiscoveryEvent::Finished(finished) = event else {
            panic!("expected finished");
        };
        let DiscoveryOutcome::Tree(root) = finished.into_outcome() else {
            panic!("expected tree");
        };
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].id(), "a");
        assert!(!root.children[0].is_suite());
        assert!(root.children[1].is_suite());
    }

    #[test]
    fn test_error_wins_over_suite() {
        let finished = DiscoveryFinished {
            suite: Some(TestSuiteInfo::new("root", "Root")),
            error_message: Some("syntax error".into()),
        };
        assert_eq!(
            finished.into_outcome(),
            DiscoveryOutcome::Error("syntax error".into())
        );
        assert_eq!(DiscoveryFinished::default().into_outcome(), DiscoveryOutcome::Empty);
    }

    #[test]
    fn test_run_event_with_bare_id_and_token() {
        let json = r#"{"type":"test","test":"a","state":"failed","message":"boom","testRunId":"r1",
            "decorations":[{"line":10,"message":"expected 1"}]}"#;
        let event: TestRunEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.token(), RunToken::new("r1"));
        let TestRunEvent::Test(test) = event else {
            panic!("expected test event");
        };
        assert_eq!(test.test, NodeRef::Id("a".into()));
        assert_eq!(test.state, TestState::Failed);
        assert_eq!(test.decorations[0].line, 10);
    }

    #[test]
    fn test_run_event_with_descriptor() {
        let json = r#"{"type":"test","test":{"type":"test","id":"p[1]","label":"p 1"},"state":"passed"}"#;
        let event: TestRunEvent = serde_json::from_str(json).unwrap();
        let TestRunEvent::Test(test) = event else {
            panic!("expected test event");
        };
        assert!(matches!(test.test, NodeRef::Descriptor(ref info) if info.id == "p[1]"));
        assert_eq!(test.test.id(), "p[1]");
    }

    #[test]
    fn test_errored_descriptor_default_message() {
        let mut info = TestInfo::new("a", "A");
        info.errored = true;
        assert_eq!(TestDescriptor::Test(info).error(), Some("Failed to load"));
    }
}
