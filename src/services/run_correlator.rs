//! Correlation of run requests with the legacy adapter's run streams.
//!
//! A run request is registered as pending *before* the legacy `run` call is
//! issued. The next `started` event claims the oldest pending request: the
//! requested items and their descendants are enqueued in a fresh native
//! session, and the session is registered under the event's token. Later
//! state events are routed by token; `finished` closes the session.

use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::legacy::TestRunStarted;
use crate::domain::models::run::{RunRequestContext, RunToken};
use crate::domain::models::test_item::{ConverterId, ItemId, ItemTree};
use crate::domain::ports::native_host::{NativeHost, TestRunSink};
use crate::services::tree_reconciler::TreeReconciler;

/// A request waiting for its `started` event.
struct PendingRun {
    context: RunRequestContext,
    items: Vec<ItemId>,
    started_tx: oneshot::Sender<RunToken>,
    finished_tx: oneshot::Sender<RunToken>,
}

/// Receivers handed back to the caller that registered a pending run.
pub struct RunTicket {
    pub request_id: Uuid,
    pub started: oneshot::Receiver<RunToken>,
    pub finished: oneshot::Receiver<RunToken>,
}

/// A native session bound to a run-correlation token.
pub struct ActiveRun {
    pub context: RunRequestContext,
    pub sink: Box<dyn TestRunSink>,
    /// Ancestors already announced to the host in this run.
    pub announced: HashSet<ItemId>,
    /// Suites currently reporting `running`, innermost last.
    pub running_suites: Vec<ItemId>,
    finished_tx: Option<oneshot::Sender<RunToken>>,
}

impl ActiveRun {
    /// Innermost running suite still present in `tree`, used to attach
    /// run-time tests. Suites removed by a discovery pass are skipped.
    pub fn current_suite(&self, tree: &ItemTree) -> Option<ItemId> {
        self.running_suites
            .iter()
            .rev()
            .copied()
            .find(|id| tree.contains(*id))
    }
}

/// Per-converter run bookkeeping.
#[derive(Default)]
pub struct RunCorrelator {
    pending: VecDeque<PendingRun>,
    active: HashMap<RunToken, ActiveRun>,
}

impl std::fmt::Debug for RunCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCorrelator")
            .field("pending", &self.pending.len())
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RunCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request that is about to be sent to the legacy adapter.
    pub fn expect_run(&mut self, context: RunRequestContext, items: Vec<ItemId>) -> RunTicket {
        let (started_tx, started) = oneshot::channel();
        let (finished_tx, finished) = oneshot::channel();
        let request_id = context.request_id;
        self.pending.push_back(PendingRun {
            context,
            items,
            started_tx,
            finished_tx,
        });
        RunTicket {
            request_id,
            started,
            finished,
        }
    }

    /// Drop a pending request that will never be claimed.
    pub fn abandon(&mut self, request_id: Uuid) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.context.request_id != request_id);
        before != self.pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, token: &RunToken) -> bool {
        self.active.contains_key(token)
    }

    /// Handle a `started` event: bind a session to its token.
    ///
    /// Without a pending request the run was started by the adapter itself
    /// and gets an unsolicited session covering the ids it announced.
    pub fn on_started(
        &mut self,
        token: RunToken,
        started: &TestRunStarted,
        tree: &ItemTree,
        reconciler: &TreeReconciler,
        host: &dyn NativeHost,
        converter: &ConverterId,
    ) {
        if let Some(mut previous) = self.active.remove(&token) {
            warn!(%converter, %token, "run token reused while active; closing previous session");
            previous.close(&token);
        }

        let (context, items, started_tx, finished_tx) = match self.pending.pop_front() {
            Some(p) => (p.context, p.items, Some(p.started_tx), Some(p.finished_tx)),
            None => {
                let items = started
                    .tests
                    .iter()
                    .filter_map(|id| reconciler.lookup(id))
                    .collect();
                info!(%converter, %token, "adapter started a run on its own");
                (RunRequestContext::unsolicited(), items, None, None)
            }
        };

        let mut sink = host.create_run(converter, &context);
        let mut enqueued = HashSet::new();
        for root in items {
            for id in tree.subtree(root) {
                if !enqueued.insert(id) {
                    continue;
                }
                if let Some(item) = tree.get(id).filter(|i| i.is_runnable()) {
                    sink.enqueued(item);
                }
            }
        }
        debug!(%converter, %token, enqueued = enqueued.len(), request = %context.request_id, "run started");

        self.active.insert(
            token.clone(),
            ActiveRun {
                context,
                sink,
                announced: HashSet::new(),
                running_suites: Vec::new(),
                finished_tx,
            },
        );

        if let Some(tx) = started_tx {
            // The requester may have given up (timeout); the session still runs.
            let _ = tx.send(token);
        }
    }

    /// Session bound to `token`, if any.
    pub fn session_mut(&mut self, token: &RunToken) -> Option<&mut ActiveRun> {
        self.active.get_mut(token)
    }

    /// Handle `finished`: end the session and release the requester.
    pub fn finish(&mut self, token: &RunToken) -> bool {
        match self.active.remove(token) {
            Some(mut run) => {
                run.close(token);
                true
            }
            None => {
                debug!(%token, "finished for unknown run token dropped");
                false
            }
        }
    }

    /// End every session and drop every pending request.
    pub fn dispose(&mut self) {
        for (token, mut run) in self.active.drain() {
            run.close(&token);
        }
        self.pending.clear();
    }
}

impl ActiveRun {
    fn close(&mut self, token: &RunToken) {
        self.sink.end();
        if let Some(tx) = self.finished_tx.take() {
            let _ = tx.send(token.clone());
        }
    }
}
