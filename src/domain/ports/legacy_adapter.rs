//! Legacy test adapter port.
//!
//! The legacy adapter is an external plugin with its own discovery and
//! execution logic. The bridge consumes it only through this contract:
//! three event streams plus `load`, `run`, optional `debug`, and `cancel`.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::models::legacy::{DiscoveryEvent, RetireEvent, TestRunEvent};

/// Port for a legacy test adapter instance.
///
/// One instance usually corresponds to one workspace folder. Events for a
/// given adapter are emitted serially; the bridge never sees two discovery
/// passes of the same adapter interleaved.
#[async_trait]
pub trait LegacyTestAdapter: Send + Sync {
    /// Human-readable adapter name (e.g. "mocha").
    fn name(&self) -> &str;

    /// Workspace folder this instance serves, if any.
    fn workspace_folder(&self) -> Option<&str> {
        None
    }

    /// Subscribe to discovery events (`started` / `finished`).
    fn subscribe_discovery(&self) -> broadcast::Receiver<DiscoveryEvent>;

    /// Subscribe to run state events.
    fn subscribe_states(&self) -> broadcast::Receiver<TestRunEvent>;

    /// Subscribe to retirement notifications, when the adapter has them.
    fn subscribe_retire(&self) -> Option<broadcast::Receiver<RetireEvent>> {
        None
    }

    /// Whether [`debug`](Self::debug) is implemented.
    fn supports_debug(&self) -> bool {
        false
    }

    /// Trigger discovery. Results arrive on the discovery stream.
    async fn load(&self) -> BridgeResult<()>;

    /// Run the given ids. Results arrive on the state stream.
    async fn run(&self, ids: &[String]) -> BridgeResult<()>;

    /// Debug the given ids.
    async fn debug(&self, _ids: &[String]) -> BridgeResult<()> {
        Err(BridgeError::DebugUnsupported(self.name().to_string()))
    }

    /// Ask the adapter to stop the current run. Best effort.
    fn cancel(&self);
}
