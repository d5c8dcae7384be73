//! Port for the registry that owns legacy adapters.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::legacy_adapter::LegacyTestAdapter;

/// Registration changes published by the hub.
#[derive(Clone)]
pub enum HubEvent {
    Registered(Arc<dyn LegacyTestAdapter>),
    Unregistered(Arc<dyn LegacyTestAdapter>),
}

impl std::fmt::Debug for HubEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registered(a) => f.debug_tuple("Registered").field(&a.name()).finish(),
            Self::Unregistered(a) => f.debug_tuple("Unregistered").field(&a.name()).finish(),
        }
    }
}

/// The legacy adapter registry (the host extension legacy adapters
/// register with).
pub trait AdapterHub: Send + Sync {
    /// Adapters registered before the bridge subscribed.
    fn adapters(&self) -> Vec<Arc<dyn LegacyTestAdapter>>;

    /// Subscribe to later registrations and unregistrations.
    fn subscribe(&self) -> broadcast::Receiver<HubEvent>;
}
