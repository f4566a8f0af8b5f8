//! Hierarchy algorithms: cycle guard, levels, ancestry and the derived
//! attributes they feed.

mod ancestry;
mod cycle;
mod levels;

pub use ancestry::AncestryIndex;
pub use cycle::{CycleGuard, LinkRejection};
pub use levels::LevelCalculator;

use crate::graph::{PathwayGraph, PathwayId, RootCatalog};
use std::collections::{BTreeMap, BTreeSet};

/// Derived attributes computed from scratch for every node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedAttributes {
    pub levels: BTreeMap<PathwayId, i32>,
    pub leaves: BTreeMap<PathwayId, bool>,
    pub ancestors: BTreeMap<PathwayId, Vec<PathwayId>>,
    pub usage: BTreeMap<PathwayId, u32>,
    pub proteins: BTreeMap<PathwayId, u32>,
}

/// How many nodes had each derived attribute rewritten
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeStats {
    pub levels: usize,
    pub leaf_flags: usize,
    pub ancestors: usize,
    pub counts: usize,
}

impl RecomputeStats {
    pub fn total(&self) -> usize {
        self.levels + self.leaf_flags + self.ancestors + self.counts
    }
}

pub fn compute_derived(graph: &PathwayGraph, catalog: &RootCatalog) -> DerivedAttributes {
    let roots = catalog.root_ids(graph);
    let levels = LevelCalculator::compute(graph, &roots);
    let ancestors = AncestryIndex::compute(graph);

    let mut derived = DerivedAttributes {
        levels,
        ancestors,
        ..Default::default()
    };
    for id in graph.ids() {
        derived.leaves.insert(id, LevelCalculator::is_leaf(graph, id));
        derived
            .usage
            .insert(id, graph.association_count_of(id) as u32);
        let proteins: BTreeSet<&str> = graph
            .items_of(id)
            .filter_map(|item| graph.item(item))
            .flat_map(|item| item.proteins.iter().map(String::as_str))
            .collect();
        derived.proteins.insert(id, proteins.len() as u32);
    }
    derived
}

/// Rewrite every derived attribute from scratch.
pub fn recompute_derived(graph: &mut PathwayGraph, catalog: &RootCatalog) -> RecomputeStats {
    let derived = compute_derived(graph, catalog);
    let mut stats = RecomputeStats::default();

    for id in graph.ids() {
        let Some(node) = graph.node_mut(id) else {
            continue;
        };
        let level = derived.levels.get(&id).copied().unwrap_or(crate::graph::UNREACHABLE_LEVEL);
        if node.hierarchy_level != level {
            node.hierarchy_level = level;
            stats.levels += 1;
        }
        let leaf = derived.leaves.get(&id).copied().unwrap_or(true);
        if node.is_leaf != leaf {
            node.is_leaf = leaf;
            stats.leaf_flags += 1;
        }
        let ancestors = derived.ancestors.get(&id).cloned().unwrap_or_default();
        if node.ancestor_ids != ancestors {
            node.ancestor_ids = ancestors;
            stats.ancestors += 1;
        }
        let usage = derived.usage.get(&id).copied().unwrap_or(0);
        let proteins = derived.proteins.get(&id).copied().unwrap_or(0);
        if node.usage_count != usage || node.protein_count != proteins {
            node.usage_count = usage;
            node.protein_count = proteins;
            stats.counts += 1;
        }
    }

    if stats.total() > 0 {
        tracing::debug!(
            levels = stats.levels,
            leaf_flags = stats.leaf_flags,
            ancestors = stats.ancestors,
            counts = stats.counts,
            "recomputed derived attributes"
        );
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClassifiedItem, ItemId, LeafAssociation, NewPathway};

    #[test]
    fn recompute_fills_every_attribute_and_is_stable() {
        let catalog = RootCatalog::standard();
        let mut graph = PathwayGraph::new();
        catalog.seed(&mut graph).unwrap();
        let root = graph.id_of("Proteostasis").unwrap();
        let leaf = graph.add_node(NewPathway::named("Aggrephagy")).unwrap();
        graph.add_edge(leaf, root).unwrap();
        graph
            .add_item(ClassifiedItem::new(ItemId::new(1), "SQSTM1<->NBR1").with_proteins(["SQSTM1", "NBR1"]))
            .unwrap();
        graph
            .add_item(ClassifiedItem::new(ItemId::new(2), "SQSTM1<->LC3").with_proteins(["SQSTM1", "LC3"]))
            .unwrap();
        graph.associate(LeafAssociation::new(leaf, ItemId::new(1), "test")).unwrap();
        graph.associate(LeafAssociation::new(leaf, ItemId::new(2), "test")).unwrap();

        let stats = recompute_derived(&mut graph, &catalog);
        assert!(stats.total() > 0);

        let node = graph.node(leaf).unwrap();
        assert_eq!(node.hierarchy_level, 1);
        assert!(node.is_leaf);
        assert_eq!(node.ancestor_ids, vec![root]);
        assert_eq!(node.usage_count, 2);
        assert_eq!(node.protein_count, 3);
        assert!(!graph.node(root).unwrap().is_leaf);

        assert_eq!(recompute_derived(&mut graph, &catalog).total(), 0);
    }
}
