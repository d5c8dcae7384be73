//! Concrete implementations of the domain ports.

pub mod console_host;
pub mod recording_host;
pub mod scripted;
pub mod static_hub;

pub use console_host::ConsoleHost;
pub use recording_host::{RecordingHost, RunRecord, SinkCall};
pub use scripted::{AdapterCalls, AdapterScript, ScriptedAdapter, ScriptedOutcome};
pub use static_hub::StaticHub;
