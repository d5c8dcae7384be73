//! Bridge activation and process-scoped session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::models::config::Config;
use crate::domain::ports::adapter_hub::{AdapterHub, HubEvent};
use crate::domain::ports::native_host::NativeHost;
use crate::services::bridge_controller::BridgeController;

/// One-time flags that live as long as the process.
#[derive(Debug, Default)]
pub struct BridgeSession {
    native_switch_offered: AtomicBool,
    activated: AtomicBool,
}

impl BridgeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` exactly once: the first time the permanent switch to native
    /// testing may be offered.
    pub fn take_native_switch_offer(&self) -> bool {
        !self.native_switch_offered.swap(true, Ordering::SeqCst)
    }

    /// Record activation; `false` if the bridge was already active.
    pub fn mark_activated(&self) -> bool {
        !self.activated.swap(true, Ordering::SeqCst)
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }
}

/// A running bridge: the controller plus the task following the hub.
pub struct Activation {
    controller: Arc<BridgeController>,
    shutdown: CancellationToken,
    hub_task: JoinHandle<()>,
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activation").finish_non_exhaustive()
    }
}

impl Activation {
    /// Wire every adapter the hub knows (now and later) into one controller.
    ///
    /// Returns `None` when the hub is not available.
    pub async fn start(
        hub: Option<Arc<dyn AdapterHub>>,
        host: Arc<dyn NativeHost>,
        config: Config,
        session: &BridgeSession,
    ) -> Option<Self> {
        let Some(hub) = hub else {
            info!("legacy adapter hub not available; bridge stays inactive");
            return None;
        };
        if !session.mark_activated() {
            debug!("bridge activated again in this session");
        }

        let controller = Arc::new(BridgeController::new(host, config));
        // Subscribe first so no registration falls between snapshot and stream.
        let mut events = hub.subscribe();
        for adapter in hub.adapters() {
            controller.register(adapter).await;
        }

        let shutdown = CancellationToken::new();
        let hub_task = {
            let controller = Arc::clone(&controller);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let event = tokio::select! {
                        () = shutdown.cancelled() => break,
                        event = events.recv() => event,
                    };
                    match event {
                        Ok(HubEvent::Registered(adapter)) => {
                            controller.register(adapter).await;
                        }
                        Ok(HubEvent::Unregistered(adapter)) => {
                            if let Err(err) = controller.unregister_adapter(adapter.as_ref()).await {
                                debug!(error = %err, "unregistration for unknown adapter");
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(skipped = n, "missed adapter registrations");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        info!("bridge activated");
        Some(Self {
            controller,
            shutdown,
            hub_task,
        })
    }

    pub fn controller(&self) -> &Arc<BridgeController> {
        &self.controller
    }

    /// Stop following the hub and dispose every converter.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.hub_task.await {
            warn!(error = %err, "hub task ended abnormally");
        }
        self.controller.dispose().await;
        info!("bridge shut down");
    }
}
