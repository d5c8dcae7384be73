//! Domain layer for the test bridge
//!
//! Protocol models on both sides of the bridge, the ports the engine is
//! wired to, and the error type.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{BridgeError, BridgeResult};
