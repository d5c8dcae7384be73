//! Shared native controller.
//!
//! Owns the item tree shared by every converter and routes native requests
//! to the converters that own the requested items.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::models::config::Config;
use crate::domain::models::run::{RunOutcome, RunRequest, RunRequestContext};
use crate::domain::models::test_item::{
    ConverterId, ItemId, ItemSnapshot, ItemTree, SharedItemTree,
};
use crate::domain::ports::legacy_adapter::LegacyTestAdapter;
use crate::domain::ports::native_host::NativeHost;
use crate::services::converter::Converter;
use crate::services::uri_mapping;

/// Per-converter result of a native run request.
pub type RunReport = Vec<(ConverterId, BridgeResult<RunOutcome>)>;

/// Controller shared by every registered legacy adapter.
pub struct BridgeController {
    host: Arc<dyn NativeHost>,
    tree: SharedItemTree,
    config: Config,
    converters: RwLock<BTreeMap<ConverterId, Arc<Converter>>>,
}

impl std::fmt::Debug for BridgeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeController").finish_non_exhaustive()
    }
}

impl BridgeController {
    pub fn new(host: Arc<dyn NativeHost>, config: Config) -> Self {
        Self {
            host,
            tree: ItemTree::shared(),
            config,
            converters: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn tree(&self) -> &SharedItemTree {
        &self.tree
    }

    pub fn host(&self) -> &Arc<dyn NativeHost> {
        &self.host
    }

    /// Create a converter for a newly registered adapter.
    ///
    /// A converter already registered under the same id is replaced.
    pub async fn register(&self, adapter: Arc<dyn LegacyTestAdapter>) -> ConverterId {
        let id = uri_mapping::converter_id(adapter.name(), adapter.workspace_folder());
        let mut converters = self.converters.write().await;
        // Dispose before starting: disposal clears every item under this id.
        if let Some(previous) = converters.remove(&id) {
            warn!(converter = %id, "adapter registered twice; replacing converter");
            previous.dispose().await;
        }
        let converter = Converter::start(
            adapter,
            Arc::clone(&self.host),
            Arc::clone(&self.tree),
            self.config.clone(),
        );
        converters.insert(id.clone(), converter);
        info!(converter = %id, "adapter registered");
        id
    }

    /// Tear down the converter registered under `id`.
    pub async fn unregister(&self, id: &ConverterId) -> BridgeResult<()> {
        let converter = self
            .converters
            .write()
            .await
            .remove(id)
            .ok_or_else(|| BridgeError::ConverterNotFound(id.to_string()))?;
        converter.dispose().await;
        info!(converter = %id, "adapter unregistered");
        Ok(())
    }

    /// Tear down the converter serving `adapter`.
    pub async fn unregister_adapter(&self, adapter: &dyn LegacyTestAdapter) -> BridgeResult<()> {
        let id = uri_mapping::converter_id(adapter.name(), adapter.workspace_folder());
        self.unregister(&id).await
    }

    pub async fn converter_ids(&self) -> Vec<ConverterId> {
        self.converters.read().await.keys().cloned().collect()
    }

    pub async fn converter(&self, id: &ConverterId) -> Option<Arc<Converter>> {
        self.converters.read().await.get(id).cloned()
    }

    async fn all_converters(&self) -> Vec<Arc<Converter>> {
        self.converters.read().await.values().cloned().collect()
    }

    /// Re-trigger discovery on every converter and wait for the passes.
    pub async fn refresh(&self) -> Vec<(ConverterId, BridgeResult<bool>)> {
        let converters = self.all_converters().await;
        let results = join_all(converters.iter().map(|c| c.refresh())).await;
        converters
            .iter()
            .map(|c| c.id().clone())
            .zip(results)
            .collect()
    }

    /// Wait for the initial discovery pass of every converter.
    pub async fn wait_for_discovery(&self) -> Vec<(ConverterId, bool)> {
        let converters = self.all_converters().await;
        let results = join_all(converters.iter().map(|c| c.wait_for_discovery())).await;
        converters
            .iter()
            .map(|c| c.id().clone())
            .zip(results)
            .collect()
    }

    /// Split a native request by owning converter and run the shares
    /// concurrently, one native session per converter.
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> RunReport {
        let context = RunRequestContext::new(request.profile, request.continuous);

        let shares: Vec<(Arc<Converter>, Option<Vec<ItemId>>)> = match &request.include {
            None => self
                .all_converters()
                .await
                .into_iter()
                .map(|c| (c, None))
                .collect(),
            Some(items) => {
                let mut by_converter: BTreeMap<ConverterId, Vec<ItemId>> = BTreeMap::new();
                {
                    let tree = self.tree.read().await;
                    for id in items {
                        match tree.get(*id) {
                            Some(item) => by_converter
                                .entry(item.converter.clone())
                                .or_default()
                                .push(*id),
                            None => warn!(item = %id, "run request names an unknown item"),
                        }
                    }
                }
                let converters = self.converters.read().await;
                by_converter
                    .into_iter()
                    .filter_map(|(cid, ids)| converters.get(&cid).map(|c| (Arc::clone(c), Some(ids))))
                    .collect()
            }
        };

        info!(
            request = %context.request_id,
            profile = request.profile.as_str(),
            converters = shares.len(),
            "dispatching run request"
        );

        let runs = shares.iter().map(|(converter, include)| {
            converter.run(
                include.as_deref(),
                &request.exclude,
                context.clone(),
                cancel.child_token(),
            )
        });
        let results = join_all(runs).await;
        shares
            .iter()
            .map(|(c, _)| c.id().clone())
            .zip(results)
            .collect()
    }

    /// Discovery error text of one converter.
    pub async fn discovery_error(&self, id: &ConverterId) -> BridgeResult<Option<String>> {
        let converter = self
            .converter(id)
            .await
            .ok_or_else(|| BridgeError::ConverterNotFound(id.to_string()))?;
        Ok(converter.discovery_error().await)
    }

    /// Open the discovery error of `id` in a host document.
    ///
    /// Returns `false` when the converter has no discovery error.
    pub async fn show_discovery_error(&self, id: &ConverterId) -> BridgeResult<bool> {
        match self.discovery_error(id).await? {
            Some(message) => {
                self.host.open_document(&message)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Find an item by native id, or by legacy id when unambiguous.
    pub async fn resolve_test(&self, id: &str) -> Option<ItemId> {
        let tree = self.tree.read().await;
        let mut legacy_matches = Vec::new();
        for item_id in tree.roots().iter().flat_map(|root| tree.subtree(*root)) {
            let Some(item) = tree.get(item_id) else {
                continue;
            };
            if item.native_id == id {
                return Some(item_id);
            }
            if item.legacy_id == id {
                legacy_matches.push(item_id);
            }
        }
        match legacy_matches.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub async fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.tree.read().await.snapshot()
    }

    /// Dispose every converter.
    pub async fn dispose(&self) {
        let converters: Vec<Arc<Converter>> = std::mem::take(&mut *self.converters.write().await)
            .into_values()
            .collect();
        for converter in converters {
            converter.dispose().await;
        }
    }
}
