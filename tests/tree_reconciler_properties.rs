//! Property tests for reconciliation across two discovery passes.

use proptest::prelude::*;
use test_bridge::domain::models::legacy::{DiscoveryOutcome, TestInfo, TestSuiteInfo};
use test_bridge::domain::models::test_item::{ItemId, ItemTree};
use test_bridge::services::TreeReconciler;
use test_bridge::ConverterId;

const SUITES: usize = 4;

/// One test across two passes: its suite in each pass (`SUITES` means the
/// root) and whether it survives into the second pass.
#[derive(Debug, Clone, Copy)]
struct Placement {
    first: usize,
    second: usize,
    kept: bool,
}

fn placement() -> impl Strategy<Value = Placement> {
    (0..=SUITES, 0..=SUITES, any::<bool>()).prop_map(|(first, second, kept)| Placement {
        first,
        second,
        kept,
    })
}

fn test_id(i: usize) -> String {
    format!("t{i}")
}

fn suite_id(s: usize) -> String {
    format!("s{s}")
}

/// Legacy ids expected under each suite (index `SUITES` is the root's
/// own tests), in descriptor order.
fn layout(placements: &[Placement], second: bool, reversed: bool) -> Vec<Vec<String>> {
    let mut homes = vec![Vec::new(); SUITES + 1];
    let mut order: Vec<usize> = (0..placements.len()).collect();
    if reversed {
        order.reverse();
    }
    for i in order {
        let p = placements[i];
        match (second, p.kept) {
            (false, _) => homes[p.first].push(test_id(i)),
            (true, true) => homes[p.second].push(test_id(i)),
            (true, false) => {}
        }
    }
    homes
}

fn build(homes: &[Vec<String>]) -> TestSuiteInfo {
    let mut root = TestSuiteInfo::new("root", "Root");
    for (s, tests) in homes.iter().take(SUITES).enumerate() {
        let mut suite = TestSuiteInfo::new(suite_id(s), suite_id(s));
        for t in tests {
            suite = suite.with_child(TestInfo::new(t.clone(), t.clone()));
        }
        root = root.with_child(suite);
    }
    for t in &homes[SUITES] {
        root = root.with_child(TestInfo::new(t.clone(), t.clone()));
    }
    root
}

fn legacy_ids(tree: &ItemTree, ids: &[ItemId]) -> Vec<String> {
    ids.iter()
        .map(|id| tree.get(*id).unwrap().legacy_id.clone())
        .collect()
}

proptest! {
    #[test]
    fn second_pass_preserves_identity_and_order(
        placements in prop::collection::vec(placement(), 0..16),
        reversed in any::<bool>(),
    ) {
        let mut tree = ItemTree::new();
        let mut reconciler = TreeReconciler::new(ConverterId::new("c"));

        reconciler.apply(&mut tree, DiscoveryOutcome::Tree(build(&layout(&placements, false, false))));
        let before: Vec<Option<ItemId>> = (0..placements.len())
            .map(|i| reconciler.lookup(&test_id(i)))
            .collect();
        let root_before = reconciler.lookup("root");

        let expected = layout(&placements, true, reversed);
        reconciler.apply(&mut tree, DiscoveryOutcome::Tree(build(&expected)));

        prop_assert_eq!(reconciler.lookup("root"), root_before);
        for (i, p) in placements.iter().enumerate() {
            let now = reconciler.lookup(&test_id(i));
            if p.kept {
                prop_assert!(before[i].is_some());
                prop_assert_eq!(now, before[i], "t{} changed identity", i);
            } else {
                prop_assert_eq!(now, None);
            }
        }

        let kept = placements.iter().filter(|p| p.kept).count();
        prop_assert_eq!(tree.len(), 1 + SUITES + kept);
        prop_assert_eq!(reconciler.len(), 1 + SUITES + kept);

        let root = reconciler.lookup("root").unwrap();
        let mut root_children: Vec<String> = (0..SUITES).map(suite_id).collect();
        root_children.extend(expected[SUITES].iter().cloned());
        prop_assert_eq!(legacy_ids(&tree, tree.children_of(Some(root))), root_children);
        for s in 0..SUITES {
            let suite = reconciler.lookup(&suite_id(s)).unwrap();
            prop_assert_eq!(legacy_ids(&tree, tree.children_of(Some(suite))), expected[s].clone());
        }
    }

    #[test]
    fn error_then_recovery_rebuilds_the_tree(
        placements in prop::collection::vec(placement(), 0..12),
        message in "[a-z ]{1,20}",
    ) {
        let mut tree = ItemTree::new();
        let mut reconciler = TreeReconciler::new(ConverterId::new("c"));
        let homes = layout(&placements, false, false);

        reconciler.apply(&mut tree, DiscoveryOutcome::Tree(build(&homes)));
        reconciler.apply(&mut tree, DiscoveryOutcome::Error(message));
        prop_assert_eq!(tree.len(), 1);
        prop_assert!(reconciler.error_node().is_some());

        reconciler.apply(&mut tree, DiscoveryOutcome::Tree(build(&homes)));
        prop_assert!(reconciler.error_node().is_none());
        prop_assert_eq!(tree.len(), 1 + SUITES + placements.len());
    }
}
