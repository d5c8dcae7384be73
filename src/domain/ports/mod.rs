//! Port trait definitions (Hexagonal Architecture)
//!
//! The conversion engine talks to its two external collaborators only
//! through these contracts:
//! - LegacyTestAdapter: the legacy discovery/execution plugin
//! - AdapterHub: the registry announcing legacy adapters
//! - NativeHost / TestRunSink: the native testing UI

pub mod adapter_hub;
pub mod legacy_adapter;
pub mod native_host;

pub use adapter_hub::{AdapterHub, HubEvent};
pub use legacy_adapter::LegacyTestAdapter;
pub use native_host::{NativeHost, TestRunSink};
