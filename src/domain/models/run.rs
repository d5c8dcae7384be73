//! Run request and run-session models shared by the converter and the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::test_item::ItemId;

/// Opaque token correlating a legacy run with its state events.
///
/// Legacy adapters may omit the token entirely; all untagged events then
/// belong to the single anonymous run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunToken(Option<String>);

impl RunToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn from_option(token: Option<&str>) -> Self {
        Self(token.map(str::to_string))
    }

    pub fn as_option(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl std::fmt::Display for RunToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(token) => write!(f, "{token}"),
            None => write!(f, "<anonymous>"),
        }
    }
}

/// Execution mode of a run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunProfile {
    Run,
    Debug,
}

impl RunProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Debug => "debug",
        }
    }
}

/// Shared native request context.
///
/// One native request spanning several converters yields one session per
/// converter; all of them carry the same context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequestContext {
    pub request_id: Uuid,
    pub profile: RunProfile,
    pub continuous: bool,
    /// `false` for runs the legacy adapter started on its own.
    pub solicited: bool,
    pub created_at: DateTime<Utc>,
}

impl RunRequestContext {
    pub fn new(profile: RunProfile, continuous: bool) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            profile,
            continuous,
            solicited: true,
            created_at: Utc::now(),
        }
    }

    /// Context for a run the legacy adapter initiated itself (e.g. autorun).
    pub fn unsolicited() -> Self {
        Self {
            solicited: false,
            ..Self::new(RunProfile::Run, false)
        }
    }
}

/// A native run request as received from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Requested items; `None` means everything.
    pub include: Option<Vec<ItemId>>,
    pub exclude: Vec<ItemId>,
    pub profile: RunProfile,
    pub continuous: bool,
}

impl RunRequest {
    pub fn all(profile: RunProfile) -> Self {
        Self {
            include: None,
            exclude: Vec::new(),
            profile,
            continuous: false,
        }
    }

    pub fn items(items: Vec<ItemId>, profile: RunProfile) -> Self {
        Self {
            include: Some(items),
            exclude: Vec::new(),
            profile,
            continuous: false,
        }
    }

    pub fn excluding(mut self, exclude: Vec<ItemId>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn continuous(mut self) -> Self {
        self.continuous = true;
        self
    }
}

/// Native location reference: a URI plus an optional zero-based line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Failure,
}

/// An annotation attached to a test result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMessage {
    pub text: String,
    pub location: Option<Location>,
    pub kind: MessageKind,
}

impl TestMessage {
    pub fn failure(text: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            text: text.into(),
            location,
            kind: MessageKind::Failure,
        }
    }

    pub fn info(text: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            text: text.into(),
            location,
            kind: MessageKind::Info,
        }
    }
}

/// How a converter-level run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The legacy adapter reported `finished` for the session.
    Completed { token: RunToken, runs: u32 },
    /// Debug was requested but the adapter cannot debug; no session exists.
    Unsupported,
    /// Nothing in the request belonged to a runnable item.
    NothingToRun,
    /// The adapter accepted the call but never announced a run.
    NotStarted,
    /// The converter went away while the run was pending.
    Disposed,
}
