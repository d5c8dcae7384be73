//! In-process adapter hub.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::domain::ports::adapter_hub::{AdapterHub, HubEvent};
use crate::domain::ports::legacy_adapter::LegacyTestAdapter;

/// Hub holding adapters registered in the same process.
pub struct StaticHub {
    adapters: Mutex<Vec<Arc<dyn LegacyTestAdapter>>>,
    events: broadcast::Sender<HubEvent>,
}

impl Default for StaticHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            adapters: Mutex::new(Vec::new()),
            events,
        }
    }

    fn adapters_mut(&self) -> MutexGuard<'_, Vec<Arc<dyn LegacyTestAdapter>>> {
        self.adapters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn add(&self, adapter: Arc<dyn LegacyTestAdapter>) {
        self.adapters_mut().push(Arc::clone(&adapter));
        let _ = self.events.send(HubEvent::Registered(adapter));
    }

    /// Remove an adapter; `false` if it was not registered.
    pub fn remove(&self, adapter: Arc<dyn LegacyTestAdapter>) -> bool {
        let removed = {
            let mut adapters = self.adapters_mut();
            let before = adapters.len();
            adapters.retain(|a| !Arc::ptr_eq(a, &adapter));
            before != adapters.len()
        };
        if removed {
            let _ = self.events.send(HubEvent::Unregistered(adapter));
        }
        removed
    }
}

impl AdapterHub for StaticHub {
    fn adapters(&self) -> Vec<Arc<dyn LegacyTestAdapter>> {
        self.adapters_mut().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::{AdapterScript, ScriptedAdapter};

    #[test]
    fn test_add_and_remove_publish_events() {
        let hub = StaticHub::new();
        let mut rx = hub.subscribe();
        let adapter: Arc<dyn LegacyTestAdapter> =
            Arc::new(ScriptedAdapter::new(AdapterScript::new("mocha")));

        hub.add(Arc::clone(&adapter));
        assert_eq!(hub.adapters().len(), 1);
        assert!(hub.remove(Arc::clone(&adapter)));
        assert!(!hub.remove(adapter));

        assert!(matches!(rx.try_recv(), Ok(HubEvent::Registered(_))));
        assert!(matches!(rx.try_recv(), Ok(HubEvent::Unregistered(_))));
        assert!(rx.try_recv().is_err());
    }
}
