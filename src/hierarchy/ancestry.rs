//! Materialized ancestor closure

use crate::graph::{PathwayGraph, PathwayId};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Computes `ancestor_ids` for every node in one full pass.
pub struct AncestryIndex;

impl AncestryIndex {
    /// Ancestor lists keyed by node.
    ///
    /// Nodes are visited parents-first; a node's list is its parents
    /// followed by each parent's own list, first occurrence kept. For a
    /// tree this is nearest parent first, root last. Nodes on or behind a
    /// cycle have no topological position and get an upward breadth-first
    /// walk instead.
    pub fn compute(graph: &PathwayGraph) -> BTreeMap<PathwayId, Vec<PathwayId>> {
        let mut remaining: HashMap<PathwayId, usize> =
            graph.ids().into_iter().map(|id| (id, graph.parent_count(id))).collect();
        let mut ready: VecDeque<PathwayId> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut result: BTreeMap<PathwayId, Vec<PathwayId>> = BTreeMap::new();
        while let Some(current) = ready.pop_front() {
            let mut list: Vec<PathwayId> = Vec::new();
            let mut seen: BTreeSet<PathwayId> = BTreeSet::new();
            let parents: Vec<PathwayId> = graph.parents_of(current).collect();
            for parent in &parents {
                if seen.insert(*parent) {
                    list.push(*parent);
                }
            }
            for parent in &parents {
                if let Some(inherited) = result.get(parent) {
                    for ancestor in inherited {
                        if seen.insert(*ancestor) {
                            list.push(*ancestor);
                        }
                    }
                }
            }
            result.insert(current, list);

            for child in graph.children_of(current) {
                if let Some(count) = remaining.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(child);
                    }
                }
            }
        }

        for id in graph.ids() {
            if !result.contains_key(&id) {
                result.insert(id, Self::walk_up(graph, id));
            }
        }
        result
    }

    /// Ancestors of one node, breadth-first, nearest first.
    pub fn walk_up(graph: &PathwayGraph, id: PathwayId) -> Vec<PathwayId> {
        let mut list = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut queue: VecDeque<PathwayId> = graph.parents_of(id).collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            list.push(current);
            queue.extend(graph.parents_of(current));
        }
        list
    }
}
