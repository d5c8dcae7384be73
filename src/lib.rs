//! Test Bridge - legacy test adapters on the native testing protocol
//!
//! Mirrors the test tree each legacy adapter discovers into a native item
//! tree, translates native run requests into legacy run calls and projects
//! the legacy run events back onto native run sessions.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Protocol models, ports and errors
//! - **Service Layer** (`services`): The conversion engine
//! - **Adapters** (`adapters`): Concrete hosts, hubs and legacy adapters
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use test_bridge::adapters::{AdapterScript, RecordingHost, ScriptedAdapter, StaticHub};
//! use test_bridge::services::{Activation, BridgeSession};
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Arc::new(StaticHub::new());
//!     hub.add(Arc::new(ScriptedAdapter::new(AdapterScript::new("mocha"))));
//!     let session = BridgeSession::new();
//!     let activation = Activation::start(
//!         Some(hub as Arc<dyn test_bridge::AdapterHub>),
//!         Arc::new(RecordingHost::new()),
//!         Default::default(),
//!         &session,
//!     )
//!     .await;
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Config, ConverterId, ItemId, ItemKind, ItemSnapshot, LoggingConfig, RunOutcome, RunProfile,
    RunRequest,
};
pub use domain::ports::{AdapterHub, HubEvent, LegacyTestAdapter, NativeHost, TestRunSink};
pub use domain::{BridgeError, BridgeResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Activation, BridgeController, BridgeSession, Converter};
