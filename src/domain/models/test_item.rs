//! Native test item tree.
//!
//! The mirrored native tree is an arena of [`TestItem`]s addressed by
//! [`ItemId`]. Ids are never reused, so an item that survives a discovery
//! pass keeps its id and the host keeps its selection and expansion state.
//! Parent links are plain ids (non-owning); ownership lives in the arena.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::run::Location;

/// Identity of a native test item. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Stable identifier of one converter (one legacy adapter registration).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConverterId(String);

impl ConverterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConverterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Suite,
    Test,
    /// Synthetic node standing in for a failed discovery pass.
    DiscoveryError,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suite => "suite",
            Self::Test => "test",
            Self::DiscoveryError => "discovery_error",
        }
    }
}

/// One node of the native tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestItem {
    pub id: ItemId,
    /// Id exposed to the host, unique across converters.
    pub native_id: String,
    /// Id in the owning adapter's namespace.
    pub legacy_id: String,
    pub converter: ConverterId,
    pub kind: ItemKind,
    pub label: String,
    pub description: Option<String>,
    pub tooltip: Option<String>,
    pub location: Option<Location>,
    /// Discovery error reported for this node (or the raw error text for
    /// a [`ItemKind::DiscoveryError`] node).
    pub error: Option<String>,
    pub debuggable: bool,
    /// Set while discovery for the owning converter is in flight.
    pub busy: bool,
    /// Discovery pass that last observed this node.
    pub generation: u64,
    parent: Option<ItemId>,
    children: Vec<ItemId>,
}

impl TestItem {
    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    pub fn is_suite(&self) -> bool {
        self.kind == ItemKind::Suite
    }

    /// Whether the item can be sent to the legacy adapter in a run request.
    pub fn is_runnable(&self) -> bool {
        self.kind != ItemKind::DiscoveryError
    }
}

/// Fields needed to materialize a new item.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub native_id: String,
    pub legacy_id: String,
    pub converter: ConverterId,
    pub kind: ItemKind,
    pub label: String,
    pub generation: u64,
}

/// Arena holding every native item of one controller.
#[derive(Debug, Default)]
pub struct ItemTree {
    items: HashMap<ItemId, TestItem>,
    roots: Vec<ItemId>,
    next_id: u64,
}

/// Tree shared between the controller and its converters.
pub type SharedItemTree = Arc<RwLock<ItemTree>>;

impl ItemTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedItemTree {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&TestItem> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut TestItem> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn roots(&self) -> &[ItemId] {
        &self.roots
    }

    /// Children of `parent`, or the top-level items when `parent` is `None`.
    pub fn children_of(&self, parent: Option<ItemId>) -> &[ItemId] {
        match parent {
            Some(id) => self.items.get(&id).map_or(&[], |item| item.children.as_slice()),
            None => &self.roots,
        }
    }

    /// Insert a new item as the last child of `parent`.
    ///
    /// `None` when `parent` names an item that is no longer in the tree.
    pub fn insert(&mut self, parent: Option<ItemId>, draft: ItemDraft) -> Option<ItemId> {
        if parent.is_some_and(|p| !self.items.contains_key(&p)) {
            return None;
        }
        self.next_id += 1;
        let id = ItemId(self.next_id);
        let item = TestItem {
            id,
            native_id: draft.native_id,
            legacy_id: draft.legacy_id,
            converter: draft.converter,
            kind: draft.kind,
            label: draft.label,
            description: None,
            tooltip: None,
            location: None,
            error: None,
            debuggable: false,
            busy: false,
            generation: draft.generation,
            parent,
            children: Vec::new(),
        };
        self.items.insert(id, item);
        self.attach(parent, id);
        Some(id)
    }

    fn attach(&mut self, parent: Option<ItemId>, id: ItemId) {
        match parent {
            Some(p) => {
                if let Some(parent_item) = self.items.get_mut(&p) {
                    parent_item.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
    }

    fn detach(&mut self, id: ItemId) {
        let parent = self.items.get(&id).and_then(|item| item.parent);
        match parent {
            Some(p) => {
                if let Some(parent_item) = self.items.get_mut(&p) {
                    parent_item.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
    }

    /// Move an existing item (with its subtree) under a new parent.
    pub fn reparent(&mut self, id: ItemId, new_parent: Option<ItemId>) {
        if !self.items.contains_key(&id) {
            return;
        }
        self.detach(id);
        if let Some(item) = self.items.get_mut(&id) {
            item.parent = new_parent;
        }
        self.attach(new_parent, id);
    }

    /// Reorder the children of `parent` to follow `order`.
    ///
    /// Ids in `order` that are not currently children are ignored; current
    /// children missing from `order` keep their relative order at the end.
    pub fn reorder_children(&mut self, parent: Option<ItemId>, order: &[ItemId]) {
        let current = self.children_of(parent).to_vec();
        let mut reordered: Vec<ItemId> = order
            .iter()
            .copied()
            .filter(|id| current.contains(id))
            .collect();
        for id in current {
            if !reordered.contains(&id) {
                reordered.push(id);
            }
        }
        match parent {
            Some(p) => {
                if let Some(item) = self.items.get_mut(&p) {
                    item.children = reordered;
                }
            }
            None => self.roots = reordered,
        }
    }

    /// Remove an item and its whole subtree. Returns every removed item.
    pub fn remove(&mut self, id: ItemId) -> Vec<TestItem> {
        if !self.items.contains_key(&id) {
            return Vec::new();
        }
        self.detach(id);
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(item) = self.items.remove(&next) {
                stack.extend(item.children.iter().copied());
                removed.push(item);
            }
        }
        removed
    }

    /// Ancestors of `id` in root-to-leaf order, excluding `id` itself.
    pub fn ancestors(&self, id: ItemId) -> Vec<ItemId> {
        let mut chain = Vec::new();
        let mut cursor = self.items.get(&id).and_then(|item| item.parent);
        while let Some(parent) = cursor {
            chain.push(parent);
            cursor = self.items.get(&parent).and_then(|item| item.parent);
        }
        chain.reverse();
        chain
    }

    /// `id` followed by all of its descendants, in pre-order.
    pub fn subtree(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(item) = self.items.get(&next) {
                out.push(next);
                stack.extend(item.children.iter().rev().copied());
            }
        }
        out
    }

    /// Top-level items owned by `converter`.
    pub fn roots_of<'a>(
        &'a self,
        converter: &'a ConverterId,
    ) -> impl Iterator<Item = ItemId> + 'a {
        self.roots
            .iter()
            .copied()
            .filter(move |id| self.items.get(id).is_some_and(|i| &i.converter == converter))
    }

    /// Serializable view of the whole tree.
    pub fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.roots.iter().filter_map(|id| self.snapshot_of(*id)).collect()
    }

    pub fn snapshot_of(&self, id: ItemId) -> Option<ItemSnapshot> {
        let item = self.items.get(&id)?;
        Some(ItemSnapshot {
            id: item.id,
            native_id: item.native_id.clone(),
            label: item.label.clone(),
            kind: item.kind,
            description: item.description.clone(),
            location: item.location.clone(),
            error: item.error.clone(),
            busy: item.busy,
            children: item
                .children
                .iter()
                .filter_map(|c| self.snapshot_of(*c))
                .collect(),
        })
    }
}

/// Owned, serializable copy of a subtree, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub native_id: String,
    pub label: String,
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub busy: bool,
    pub children: Vec<ItemSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(legacy_id: &str, kind: ItemKind) -> ItemDraft {
        ItemDraft {
            native_id: format!("c/{legacy_id}"),
            legacy_id: legacy_id.to_string(),
            converter: ConverterId::new("c"),
            kind,
            label: legacy_id.to_uppercase(),
            generation: 1,
        }
    }

    #[test]
    fn test_insert_and_ancestors() {
        let mut tree = ItemTree::new();
        let root = tree.insert(None, draft("root", ItemKind::Suite)).unwrap();
        let suite = tree.insert(Some(root), draft("s", ItemKind::Suite)).unwrap();
        let test = tree.insert(Some(suite), draft("t", ItemKind::Test)).unwrap();

        assert_eq!(tree.ancestors(test), vec![root, suite]);
        assert_eq!(tree.subtree(root), vec![root, suite, test]);
        assert_eq!(tree.roots(), &[root]);
    }

    #[test]
    fn test_remove_drops_whole_subtree() {
        let mut tree = ItemTree::new();
        let root = tree.insert(None, draft("root", ItemKind::Suite)).unwrap();
        let suite = tree.insert(Some(root), draft("s", ItemKind::Suite)).unwrap();
        tree.insert(Some(suite), draft("t1", ItemKind::Test)).unwrap();
        tree.insert(Some(suite), draft("t2", ItemKind::Test)).unwrap();

        let removed = tree.remove(suite);
        assert_eq!(removed.len(), 3);
        assert_eq!(tree.len(), 1);
        assert!(tree.children_of(Some(root)).is_empty());
    }

    #[test]
    fn test_insert_under_removed_parent_is_refused() {
        let mut tree = ItemTree::new();
        let root = tree.insert(None, draft("root", ItemKind::Suite)).unwrap();
        let suite = tree.insert(Some(root), draft("s", ItemKind::Suite)).unwrap();
        tree.remove(suite);

        assert!(tree.insert(Some(suite), draft("t", ItemKind::Test)).is_none());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut tree = ItemTree::new();
        let first = tree.insert(None, draft("a", ItemKind::Test)).unwrap();
        tree.remove(first);
        let second = tree.insert(None, draft("a", ItemKind::Test)).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_reparent_and_reorder() {
        let mut tree = ItemTree::new();
        let root = tree.insert(None, draft("root", ItemKind::Suite)).unwrap();
        let a = tree.insert(Some(root), draft("a", ItemKind::Suite)).unwrap();
        let b = tree.insert(Some(root), draft("b", ItemKind::Suite)).unwrap();
        let t = tree.insert(Some(a), draft("t", ItemKind::Test)).unwrap();

        tree.reparent(t, Some(b));
        assert!(tree.children_of(Some(a)).is_empty());
        assert_eq!(tree.children_of(Some(b)), &[t]);
        assert_eq!(tree.get(t).unwrap().parent(), Some(b));

        tree.reorder_children(Some(root), &[b, a]);
        assert_eq!(tree.children_of(Some(root)), &[b, a]);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut tree = ItemTree::new();
        let root = tree.insert(None, draft("root", ItemKind::Suite)).unwrap();
        tree.insert(Some(root), draft("t", ItemKind::Test)).unwrap();

        let json = serde_json::to_value(tree.snapshot()).unwrap();
        assert_eq!(json[0]["label"], "ROOT");
        assert_eq!(json[0]["children"][0]["kind"], "test");
    }
}
