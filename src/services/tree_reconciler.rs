//! Tree reconciliation across repeated discovery passes.
//!
//! Each completed pass bumps a generation counter. The walk over the
//! descriptor tree looks every node up by legacy id (creating it when new),
//! refreshes its fields and stamps it with the current generation. Whatever
//! is left unstamped under the root after the walk is stale and removed. This
//! is a full structural diff in O(nodes) without comparing subtrees, and an
//! item that survives keeps its [`ItemId`].

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::domain::models::legacy::{DiscoveryOutcome, TestDescriptor};
use crate::domain::models::test_item::{ConverterId, ItemDraft, ItemId, ItemKind, ItemTree};
use crate::services::uri_mapping::{self, DISCOVERY_ERROR_ID};

/// Label of the synthetic node shown when discovery fails.
pub const DISCOVERY_ERROR_LABEL: &str = "Test discovery failed";

/// Summary of one reconciliation, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub generation: u64,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub duplicates: usize,
    /// Whether the pass left a discovery-error node in place.
    pub errored: bool,
    /// Whether the pass changed anything at all.
    pub applied: bool,
}

/// Per-converter reconciler: owns the legacy id → item index.
#[derive(Debug)]
pub struct TreeReconciler {
    converter: ConverterId,
    generation: u64,
    index: HashMap<String, ItemId>,
    error_node: Option<ItemId>,
}

impl TreeReconciler {
    pub fn new(converter: ConverterId) -> Self {
        Self {
            converter,
            generation: 0,
            index: HashMap::new(),
            error_node: None,
        }
    }

    pub fn converter(&self) -> &ConverterId {
        &self.converter
    }

    /// Generation of the last completed discovery pass.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Item currently mapped to a legacy id.
    pub fn lookup(&self, legacy_id: &str) -> Option<ItemId> {
        self.index.get(legacy_id).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The synthetic error node, while discovery is in a failed state.
    pub fn error_node(&self) -> Option<ItemId> {
        self.error_node
    }

    /// Top-level item of the converter's real tree (not the error node).
    pub fn root(&self, tree: &ItemTree) -> Option<ItemId> {
        tree.roots_of(&self.converter)
            .find(|id| Some(*id) != self.error_node)
    }

    /// Apply one finished discovery pass.
    pub fn apply(&mut self, tree: &mut ItemTree, outcome: DiscoveryOutcome) -> ReconcileReport {
        match outcome {
            DiscoveryOutcome::Tree(suite) => self.reconcile(tree, &TestDescriptor::Suite(suite)),
            DiscoveryOutcome::Error(message) => self.show_error(tree, &message),
            DiscoveryOutcome::Empty => {
                debug!(converter = %self.converter, "discovery finished without a suite; tree untouched");
                ReconcileReport {
                    generation: self.generation,
                    ..ReconcileReport::default()
                }
            }
        }
    }

    fn reconcile(&mut self, tree: &mut ItemTree, root: &TestDescriptor) -> ReconcileReport {
        self.generation += 1;
        let mut report = ReconcileReport {
            generation: self.generation,
            applied: true,
            ..ReconcileReport::default()
        };

        let root_id = self.visit(tree, None, root, &mut report);

        // Sweep only after the whole walk: an item may have moved under a
        // parent visited later in the pass.
        if let Some(root_id) = root_id {
            let unstamped: Vec<ItemId> = tree
                .subtree(root_id)
                .into_iter()
                .filter(|id| tree.get(*id).is_some_and(|item| item.generation != self.generation))
                .collect();
            for id in unstamped {
                if tree.contains(id) {
                    report.removed += self.remove_subtree(tree, id);
                }
            }
        }
        let stale: Vec<ItemId> = tree
            .roots_of(&self.converter)
            .filter(|id| Some(*id) != root_id)
            .collect();
        for id in stale {
            report.removed += self.remove_subtree(tree, id);
        }
        self.error_node = None;

        info!(
            converter = %self.converter,
            generation = report.generation,
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            duplicates = report.duplicates,
            "reconciled discovery tree"
        );
        report
    }

    fn visit(
        &mut self,
        tree: &mut ItemTree,
        parent: Option<ItemId>,
        descriptor: &TestDescriptor,
        report: &mut ReconcileReport,
    ) -> Option<ItemId> {
        let generation = self.generation;
        let legacy_id = descriptor.id();

        let id = match self.lookup(legacy_id).filter(|id| tree.contains(*id)) {
            Some(existing) => {
                let item = tree.get(existing)?;
                if item.generation == generation {
                    warn!(converter = %self.converter, legacy_id, "duplicate test id in discovery tree; keeping first");
                    report.duplicates += 1;
                    return None;
                }
                if item.parent() != parent {
                    tree.reparent(existing, parent);
                }
                report.updated += 1;
                existing
            }
            None => {
                let id = tree.insert(parent, self.draft(descriptor))?;
                self.index.insert(legacy_id.to_string(), id);
                report.created += 1;
                id
            }
        };

        self.refresh_fields(tree, id, descriptor);

        let mut order = Vec::with_capacity(descriptor.children().len());
        for child in descriptor.children() {
            if let Some(child_id) = self.visit(tree, Some(id), child, report) {
                order.push(child_id);
            }
        }

        tree.reorder_children(Some(id), &order);

        Some(id)
    }

    fn draft(&self, descriptor: &TestDescriptor) -> ItemDraft {
        let (kind, label) = match descriptor {
            TestDescriptor::Suite(s) => (ItemKind::Suite, s.label.clone()),
            TestDescriptor::Test(t) => (ItemKind::Test, t.label.clone()),
        };
        ItemDraft {
            native_id: uri_mapping::native_item_id(&self.converter, descriptor.id()),
            legacy_id: descriptor.id().to_string(),
            converter: self.converter.clone(),
            kind,
            label,
            generation: self.generation,
        }
    }

    fn refresh_fields(&self, tree: &mut ItemTree, id: ItemId, descriptor: &TestDescriptor) {
        let Some(item) = tree.get_mut(id) else {
            return;
        };
        let (kind, label, description, tooltip, file, line, debuggable) = match descriptor {
            TestDescriptor::Suite(s) => (
                ItemKind::Suite,
                &s.label,
                &s.description,
                &s.tooltip,
                s.file.as_deref(),
                s.line,
                s.debuggable,
            ),
            TestDescriptor::Test(t) => (
                ItemKind::Test,
                &t.label,
                &t.description,
                &t.tooltip,
                t.file.as_deref(),
                t.line,
                t.debuggable,
            ),
        };
        item.kind = kind;
        item.label.clone_from(label);
        item.description.clone_from(description);
        item.tooltip.clone_from(tooltip);
        item.location = uri_mapping::location(file, line);
        item.error = descriptor.error().map(str::to_string);
        item.debuggable = debuggable;
        item.generation = self.generation;
    }

    /// Replace the converter's whole tree with one error node.
    fn show_error(&mut self, tree: &mut ItemTree, message: &str) -> ReconcileReport {
        self.generation += 1;
        let mut report = ReconcileReport {
            generation: self.generation,
            applied: true,
            errored: true,
            ..ReconcileReport::default()
        };

        let existing: Vec<ItemId> = tree.roots_of(&self.converter).collect();
        for id in existing {
            report.removed += self.remove_subtree(tree, id);
        }

        let id = tree.insert(
            None,
            ItemDraft {
                native_id: uri_mapping::native_item_id(&self.converter, DISCOVERY_ERROR_ID),
                legacy_id: DISCOVERY_ERROR_ID.to_string(),
                converter: self.converter.clone(),
                kind: ItemKind::DiscoveryError,
                label: DISCOVERY_ERROR_LABEL.to_string(),
                generation: self.generation,
            },
        );
        if let Some(item) = id.and_then(|id| tree.get_mut(id)) {
            item.description = message.lines().next().map(str::to_string);
            item.error = Some(message.to_string());
            report.created = 1;
        }
        self.error_node = id;

        warn!(converter = %self.converter, generation = report.generation, "discovery failed: {}", message);
        report
    }

    /// Materialize a node that only appeared at run time.
    ///
    /// An existing node with the same legacy id is refreshed in place.
    /// `None` when `parent` is gone from the tree.
    pub fn graft(
        &mut self,
        tree: &mut ItemTree,
        parent: Option<ItemId>,
        descriptor: &TestDescriptor,
    ) -> Option<ItemId> {
        let id = match self.lookup(descriptor.id()).filter(|id| tree.contains(*id)) {
            Some(existing) => existing,
            None => {
                let id = tree.insert(parent, self.draft(descriptor))?;
                self.index.insert(descriptor.id().to_string(), id);
                debug!(converter = %self.converter, legacy_id = descriptor.id(), "grafted run-time node");
                id
            }
        };
        self.refresh_fields(tree, id, descriptor);
        Some(id)
    }

    /// Remove every item owned by this converter.
    pub fn clear(&mut self, tree: &mut ItemTree) -> usize {
        let roots: Vec<ItemId> = tree.roots_of(&self.converter).collect();
        let mut removed = 0;
        for id in roots {
            removed += self.remove_subtree(tree, id);
        }
        self.index.clear();
        self.error_node = None;
        removed
    }

    fn remove_subtree(&mut self, tree: &mut ItemTree, id: ItemId) -> usize {
        let removed = tree.remove(id);
        for item in &removed {
            if self.index.get(&item.legacy_id) == Some(&item.id) {
                self.index.remove(&item.legacy_id);
            }
            if self.error_node == Some(item.id) {
                self.error_node = None;
            }
        }
        removed.len()
    }
}
