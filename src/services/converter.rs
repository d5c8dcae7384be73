//! One converter per legacy adapter.
//!
//! The converter subscribes to the adapter's three event streams and
//! processes them one at a time on a single task, so discovery passes and
//! run events of one adapter are never interleaved. Run requests and
//! refreshes run on the caller's task and only touch converter state under
//! the state lock; every wait is followed by a re-check of that state.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::BridgeResult;
use crate::domain::models::config::Config;
use crate::domain::models::legacy::{DiscoveryEvent, RetireEvent, TestRunEvent};
use crate::domain::models::run::{RunOutcome, RunProfile, RunRequestContext, RunToken};
use crate::domain::models::test_item::{ConverterId, ItemId, ItemTree, SharedItemTree};
use crate::domain::ports::legacy_adapter::LegacyTestAdapter;
use crate::domain::ports::native_host::NativeHost;
use crate::services::run_correlator::RunCorrelator;
use crate::services::state_projector::StateProjector;
use crate::services::tree_reconciler::TreeReconciler;
use crate::services::uri_mapping;

struct ConverterState {
    reconciler: TreeReconciler,
    correlator: RunCorrelator,
    disposed: bool,
    /// Set while a discovery pass is in flight.
    loading_deadline: Option<Instant>,
}

/// What woke the event loop.
enum Wake {
    Shutdown,
    Discovery(Result<DiscoveryEvent, RecvError>),
    State(Result<TestRunEvent, RecvError>),
    Retire(Result<RetireEvent, RecvError>),
    DiscoveryTimeout,
}

/// Bridges one legacy adapter into the shared native tree.
pub struct Converter {
    id: ConverterId,
    adapter: Arc<dyn LegacyTestAdapter>,
    host: Arc<dyn NativeHost>,
    tree: SharedItemTree,
    config: Config,
    projector: StateProjector,
    state: Mutex<ConverterState>,
    shutdown: CancellationToken,
    has_retire: bool,
    retired: broadcast::Sender<RetireEvent>,
    passes: watch::Sender<u64>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("id", &self.id)
            .field("adapter", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Create the converter, subscribe to the adapter and schedule the
    /// initial load.
    pub fn start(
        adapter: Arc<dyn LegacyTestAdapter>,
        host: Arc<dyn NativeHost>,
        tree: SharedItemTree,
        config: Config,
    ) -> Arc<Self> {
        let id = uri_mapping::converter_id(adapter.name(), adapter.workspace_folder());

        // Subscribe before anything can emit.
        let discovery = adapter.subscribe_discovery();
        let states = adapter.subscribe_states();
        let retire = adapter.subscribe_retire();

        let (retired, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (passes, _) = watch::channel(0);

        let converter = Arc::new(Self {
            projector: StateProjector::new(host.derives_suite_state()),
            state: Mutex::new(ConverterState {
                reconciler: TreeReconciler::new(id.clone()),
                correlator: RunCorrelator::new(),
                disposed: false,
                loading_deadline: None,
            }),
            id,
            adapter,
            host,
            tree,
            config,
            shutdown: CancellationToken::new(),
            has_retire: retire.is_some(),
            retired,
            passes,
        });

        info!(converter = %converter.id, "converter started");
        tokio::spawn(Arc::clone(&converter).event_loop(discovery, states, retire));
        tokio::spawn(Arc::clone(&converter).initial_load());
        converter
    }

    pub fn id(&self) -> &ConverterId {
        &self.id
    }

    pub fn adapter(&self) -> &Arc<dyn LegacyTestAdapter> {
        &self.adapter
    }

    pub async fn is_disposed(&self) -> bool {
        self.state.lock().await.disposed
    }

    /// Item mapped to a legacy id.
    pub async fn lookup(&self, legacy_id: &str) -> Option<ItemId> {
        self.state.lock().await.reconciler.lookup(legacy_id)
    }

    /// Number of discovery passes applied so far.
    pub fn passes(&self) -> u64 {
        *self.passes.borrow()
    }

    /// Full text of the current discovery error, if discovery failed.
    pub async fn discovery_error(&self) -> Option<String> {
        let state = self.state.lock().await;
        let node = state.reconciler.error_node()?;
        let tree = self.tree.read().await;
        tree.get(node).and_then(|item| item.error.clone())
    }

    async fn initial_load(self: Arc<Self>) {
        tokio::select! {
            () = self.shutdown.cancelled() => return,
            () = tokio::time::sleep(self.config.initial_load_delay()) => {}
        }
        if self.is_disposed().await {
            return;
        }
        if let Err(err) = self.adapter.load().await {
            warn!(converter = %self.id, error = %err, "initial load failed");
        }
    }

    async fn event_loop(
        self: Arc<Self>,
        mut discovery: broadcast::Receiver<DiscoveryEvent>,
        mut states: broadcast::Receiver<TestRunEvent>,
        mut retire: Option<broadcast::Receiver<RetireEvent>>,
    ) {
        loop {
            let deadline = self.state.lock().await.loading_deadline;
            let wake = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => Wake::Shutdown,
                event = discovery.recv() => Wake::Discovery(event),
                event = states.recv() => Wake::State(event),
                event = recv_optional(&mut retire) => Wake::Retire(event),
                () = sleep_until_deadline(deadline) => Wake::DiscoveryTimeout,
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Discovery(Ok(event)) => self.on_discovery(event).await,
                Wake::State(Ok(event)) => self.on_state(event).await,
                Wake::Retire(Ok(event)) => self.on_retire(event).await,
                Wake::DiscoveryTimeout => self.on_discovery_timeout().await,
                Wake::Discovery(Err(RecvError::Lagged(n)))
                | Wake::State(Err(RecvError::Lagged(n)))
                | Wake::Retire(Err(RecvError::Lagged(n))) => {
                    warn!(converter = %self.id, skipped = n, "event stream lagged; events lost");
                }
                Wake::Retire(Err(RecvError::Closed)) => retire = None,
                Wake::Discovery(Err(RecvError::Closed)) | Wake::State(Err(RecvError::Closed)) => {
                    debug!(converter = %self.id, "adapter event stream closed");
                    break;
                }
            }
        }
        debug!(converter = %self.id, "event loop stopped");
    }

    async fn on_discovery(&self, event: DiscoveryEvent) {
        let mut state = self.state.lock().await;
        if state.disposed {
            return;
        }
        let mut tree = self.tree.write().await;

        match event {
            DiscoveryEvent::Started => {
                set_busy(&mut tree, &self.id, true);
                if state.loading_deadline.is_none() {
                    self.host.load_progress(&self.id, true);
                }
                state.loading_deadline = Some(Instant::now() + self.config.discovery_timeout());
                debug!(converter = %self.id, "discovery started");
            }
            DiscoveryEvent::Finished(finished) => {
                let report = state.reconciler.apply(&mut tree, finished.into_outcome());
                set_busy(&mut tree, &self.id, false);
                if state.loading_deadline.take().is_some() {
                    self.host.load_progress(&self.id, false);
                }
                debug!(converter = %self.id, generation = report.generation, applied = report.applied, "discovery finished");
                self.passes.send_modify(|n| *n += 1);
            }
        }
    }

    async fn on_discovery_timeout(&self) {
        let mut state = self.state.lock().await;
        match state.loading_deadline {
            Some(deadline) if deadline <= Instant::now() => {}
            _ => return,
        }
        state.loading_deadline = None;
        let mut tree = self.tree.write().await;
        set_busy(&mut tree, &self.id, false);
        self.host.load_progress(&self.id, false);
        warn!(
            converter = %self.id,
            timeout_secs = self.config.discovery_timeout_secs,
            "discovery did not finish in time; clearing busy state"
        );
    }

    async fn on_state(&self, event: TestRunEvent) {
        let token = event.token();
        let mut state = self.state.lock().await;
        if state.disposed {
            return;
        }
        let mut tree = self.tree.write().await;
        let ConverterState {
            reconciler,
            correlator,
            ..
        } = &mut *state;

        match event {
            TestRunEvent::Started(started) => {
                correlator.on_started(token, &started, &tree, reconciler, self.host.as_ref(), &self.id);
            }
            TestRunEvent::Finished(_) => {
                correlator.finish(&token);
            }
            TestRunEvent::Suite(suite) => match correlator.session_mut(&token) {
                Some(run) => self.projector.on_suite(run, &suite, &mut tree, reconciler),
                None => debug!(converter = %self.id, %token, "suite event for unknown run dropped"),
            },
            TestRunEvent::Test(test) => match correlator.session_mut(&token) {
                Some(run) => self.projector.on_test(run, &test, &mut tree, reconciler),
                None => debug!(converter = %self.id, %token, "test event for unknown run dropped"),
            },
        }
    }

    async fn on_retire(&self, event: RetireEvent) {
        let state = self.state.lock().await;
        if state.disposed {
            return;
        }

        if self.retired.receiver_count() > 0 {
            debug!(converter = %self.id, "retirement forwarded to continuous run");
            let _ = self.retired.send(event);
            return;
        }

        let tree = self.tree.read().await;
        let items: Vec<ItemId> = match &event.tests {
            Some(ids) => ids
                .iter()
                .filter_map(|id| state.reconciler.lookup(id))
                .collect(),
            None => tree
                .roots_of(&self.id)
                .flat_map(|root| tree.subtree(root))
                .collect(),
        };
        if !items.is_empty() {
            debug!(converter = %self.id, count = items.len(), "invalidating retired results");
            self.host.invalidate_results(&items);
        }
    }

    /// Wait for the first discovery pass without triggering a load.
    ///
    /// `false` when none arrived within the discovery timeout.
    pub async fn wait_for_discovery(&self) -> bool {
        let mut passes = self.passes.subscribe();
        let first_pass = async { passes.wait_for(|n| *n > 0).await.is_ok() };
        match tokio::time::timeout(self.config.discovery_timeout(), first_pass).await {
            Ok(arrived) => arrived,
            Err(_) => {
                warn!(converter = %self.id, "no discovery pass within the timeout");
                false
            }
        }
    }

    /// Trigger discovery and wait for the resulting pass.
    ///
    /// Returns `false` when no pass completed within the discovery timeout.
    pub async fn refresh(&self) -> BridgeResult<bool> {
        let mut passes = self.passes.subscribe();
        passes.borrow_and_update();

        self.adapter.load().await?;

        match tokio::time::timeout(self.config.discovery_timeout(), passes.changed()).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(_)) => Ok(false),
            Err(_) => {
                warn!(converter = %self.id, "refresh timed out waiting for discovery");
                Ok(false)
            }
        }
    }

    /// Run the selected items (or everything) through the legacy adapter.
    ///
    /// The returned future resolves once the adapter reported `finished`
    /// for the run, or, for continuous runs, once `cancel` fires.
    pub async fn run(
        &self,
        include: Option<&[ItemId]>,
        exclude: &[ItemId],
        context: RunRequestContext,
        cancel: CancellationToken,
    ) -> BridgeResult<RunOutcome> {
        if context.profile == RunProfile::Debug && !self.adapter.supports_debug() {
            info!(converter = %self.id, "debug requested but adapter cannot debug; ignoring");
            return Ok(RunOutcome::Unsupported);
        }

        let selected = {
            let state = self.state.lock().await;
            if state.disposed {
                return Ok(RunOutcome::Disposed);
            }
            let tree = self.tree.read().await;
            self.select_items(&tree, &state.reconciler, include, exclude)
        };
        if selected.is_empty() {
            debug!(converter = %self.id, "nothing to run");
            return Ok(RunOutcome::NothingToRun);
        }

        let continuous = context.continuous && self.has_retire && self.host.supports_continuous_run();
        let mut retired = continuous.then(|| self.retired.subscribe());
        let mut cancel_sent = false;

        let mut outcome = self
            .run_once(selected.clone(), &context, &cancel, &mut cancel_sent)
            .await?;
        let Some(retired) = retired.as_mut() else {
            return Ok(outcome);
        };

        let mut runs = 1;
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = retired.recv() => event,
            };
            let event = match event {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!(converter = %self.id, skipped = n, "missed retirements; rerunning the original request");
                    RetireEvent::default()
                }
                Err(RecvError::Closed) => break,
            };

            let items = match &event.tests {
                Some(ids) => {
                    let state = self.state.lock().await;
                    ids.iter()
                        .filter_map(|id| state.reconciler.lookup(id))
                        .collect()
                }
                None => selected.clone(),
            };
            if items.is_empty() {
                continue;
            }
            // The cancel may have fired while the retire was being resolved.
            if cancel.is_cancelled() {
                break;
            }

            outcome = self
                .run_once(items, &context, &cancel, &mut cancel_sent)
                .await?;
            match outcome {
                RunOutcome::Completed { .. } => runs += 1,
                RunOutcome::Disposed => return Ok(outcome),
                _ => {}
            }
        }

        Ok(match outcome {
            RunOutcome::Completed { token, .. } => RunOutcome::Completed { token, runs },
            other => other,
        })
    }

    async fn run_once(
        &self,
        items: Vec<ItemId>,
        context: &RunRequestContext,
        cancel: &CancellationToken,
        cancel_sent: &mut bool,
    ) -> BridgeResult<RunOutcome> {
        let (ids, ticket) = {
            let mut state = self.state.lock().await;
            if state.disposed {
                return Ok(RunOutcome::Disposed);
            }
            let tree = self.tree.read().await;
            let ids: Vec<String> = items
                .iter()
                .filter_map(|id| tree.get(*id))
                .map(|item| item.legacy_id.clone())
                .collect();
            (ids, state.correlator.expect_run(context.clone(), items))
        };
        let request_id = ticket.request_id;

        info!(converter = %self.id, profile = context.profile.as_str(), tests = ids.len(), "issuing legacy run");
        let call = async {
            match context.profile {
                RunProfile::Debug => self.adapter.debug(&ids).await,
                RunProfile::Run => self.adapter.run(&ids).await,
            }
        };
        if let Err(err) = self.forward_cancel(call, cancel, cancel_sent).await {
            self.state.lock().await.correlator.abandon(request_id);
            return Err(err);
        }

        let started = tokio::time::timeout(
            self.config.run_start_timeout(),
            self.forward_cancel(ticket.started, cancel, cancel_sent),
        )
        .await;
        let token: RunToken = match started {
            Ok(Ok(token)) => token,
            Ok(Err(_)) => return Ok(RunOutcome::Disposed),
            Err(_) => {
                self.state.lock().await.correlator.abandon(request_id);
                warn!(converter = %self.id, "legacy adapter never started the run");
                return Ok(RunOutcome::NotStarted);
            }
        };

        match self.forward_cancel(ticket.finished, cancel, cancel_sent).await {
            Ok(token) => Ok(RunOutcome::Completed { token, runs: 1 }),
            Err(_) if self.is_disposed().await => Ok(RunOutcome::Disposed),
            Err(_) => {
                debug!(converter = %self.id, %token, "run session closed without finished");
                Ok(RunOutcome::Completed { token, runs: 1 })
            }
        }
    }

    /// Drive `fut` to completion, forwarding `cancel` to the adapter the
    /// first time it fires for this request.
    async fn forward_cancel<F: Future>(
        &self,
        fut: F,
        cancel: &CancellationToken,
        cancel_sent: &mut bool,
    ) -> F::Output {
        tokio::pin!(fut);
        if !*cancel_sent {
            tokio::select! {
                out = &mut fut => return out,
                () = cancel.cancelled() => {
                    *cancel_sent = true;
                    info!(converter = %self.id, "run cancelled; asking adapter to stop");
                    self.adapter.cancel();
                }
            }
        }
        fut.await
    }

    /// Resolve a request into runnable items of this converter.
    ///
    /// Without an explicit selection the root's direct children are used. A
    /// requested item containing an excluded descendant is replaced by its
    /// children so the exclusion survives the legacy id-list protocol.
    fn select_items(
        &self,
        tree: &ItemTree,
        reconciler: &TreeReconciler,
        include: Option<&[ItemId]>,
        exclude: &[ItemId],
    ) -> Vec<ItemId> {
        let requested: Vec<ItemId> = match include {
            Some(ids) => ids.to_vec(),
            None => reconciler
                .root(tree)
                .map(|root| tree.children_of(Some(root)).to_vec())
                .unwrap_or_default(),
        };
        let excluded: HashSet<ItemId> = exclude.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for id in requested {
            self.expand(tree, id, &excluded, &mut seen, &mut selected);
        }
        selected
    }

    fn expand(
        &self,
        tree: &ItemTree,
        id: ItemId,
        excluded: &HashSet<ItemId>,
        seen: &mut HashSet<ItemId>,
        out: &mut Vec<ItemId>,
    ) {
        let Some(item) = tree.get(id) else {
            return;
        };
        if item.converter != self.id
            || !item.is_runnable()
            || excluded.contains(&id)
            || !seen.insert(id)
        {
            return;
        }
        let partially_excluded =
            !excluded.is_empty() && tree.subtree(id).iter().any(|d| excluded.contains(d));
        if partially_excluded {
            for child in item.children() {
                self.expand(tree, *child, excluded, seen, out);
            }
        } else {
            out.push(id);
        }
    }

    /// Tear down: end sessions, drop pending requests, remove the subtree.
    pub async fn dispose(&self) {
        let mut state = self.state.lock().await;
        if state.disposed {
            return;
        }
        state.disposed = true;
        self.shutdown.cancel();
        state.correlator.dispose();

        let mut tree = self.tree.write().await;
        let removed = state.reconciler.clear(&mut tree);
        if state.loading_deadline.take().is_some() {
            self.host.load_progress(&self.id, false);
        }
        info!(converter = %self.id, removed, "converter disposed");
    }
}

fn set_busy(tree: &mut ItemTree, converter: &ConverterId, busy: bool) {
    let roots: Vec<ItemId> = tree.roots_of(converter).collect();
    for id in roots {
        if let Some(item) = tree.get_mut(id) {
            item.busy = busy;
        }
    }
}

async fn recv_optional<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
