//! The conversion engine.

pub mod activation;
pub mod bridge_controller;
pub mod converter;
pub mod run_correlator;
pub mod state_projector;
pub mod tree_reconciler;
pub mod uri_mapping;

pub use activation::{Activation, BridgeSession};
pub use bridge_controller::{BridgeController, RunReport};
pub use converter::Converter;
pub use run_correlator::{ActiveRun, RunCorrelator, RunTicket};
pub use state_projector::StateProjector;
pub use tree_reconciler::{ReconcileReport, TreeReconciler};
