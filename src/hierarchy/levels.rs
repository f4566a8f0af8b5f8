//! Hierarchy depth from the canonical roots

use crate::graph::{PathwayGraph, PathwayId, UNREACHABLE_LEVEL};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Computes `hierarchy_level` for every node.
///
/// Roots are level 0. A reachable node sits one below its deepest
/// reachable parent, so while several parents remain the longest path
/// wins. Nodes trapped behind a cycle keep their breadth-first level.
/// Nodes no root reaches get [`UNREACHABLE_LEVEL`].
pub struct LevelCalculator;

impl LevelCalculator {
    pub fn compute(graph: &PathwayGraph, roots: &[PathwayId]) -> BTreeMap<PathwayId, i32> {
        let root_set: BTreeSet<PathwayId> = roots.iter().copied().filter(|r| graph.contains(*r)).collect();

        // Breadth-first pass: reachability plus a fallback level.
        let mut bfs_level: HashMap<PathwayId, i32> = HashMap::new();
        let mut queue: VecDeque<PathwayId> = VecDeque::new();
        for root in &root_set {
            bfs_level.insert(*root, 0);
            queue.push_back(*root);
        }
        while let Some(current) = queue.pop_front() {
            let level = bfs_level[&current];
            for child in graph.children_of(current) {
                if root_set.contains(&child) || bfs_level.contains_key(&child) {
                    continue;
                }
                bfs_level.insert(child, level + 1);
                queue.push_back(child);
            }
        }

        // Longest-path relaxation in topological order over the reachable part.
        let mut pending: HashMap<PathwayId, usize> = HashMap::new();
        for id in bfs_level.keys() {
            if root_set.contains(id) {
                continue;
            }
            let reachable_parents = graph
                .parents_of(*id)
                .filter(|p| bfs_level.contains_key(p))
                .count();
            pending.insert(*id, reachable_parents);
        }

        let mut level: HashMap<PathwayId, i32> = root_set.iter().map(|r| (*r, 0)).collect();
        let mut settled: BTreeSet<PathwayId> = BTreeSet::new();
        let mut ready: VecDeque<PathwayId> = root_set.iter().copied().collect();
        while let Some(current) = ready.pop_front() {
            settled.insert(current);
            let current_level = level[&current];
            for child in graph.children_of(current) {
                let Some(remaining) = pending.get_mut(&child) else {
                    continue;
                };
                let entry = level.entry(child).or_insert(0);
                *entry = (*entry).max(current_level + 1);
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push_back(child);
                }
            }
        }

        graph
            .ids()
            .into_iter()
            .map(|id| {
                let value = if settled.contains(&id) {
                    level[&id]
                } else {
                    bfs_level.get(&id).copied().unwrap_or(UNREACHABLE_LEVEL)
                };
                (id, value)
            })
            .collect()
    }

    pub fn is_leaf(graph: &PathwayGraph, id: PathwayId) -> bool {
        graph.child_count(id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NewPathway;

    fn add(graph: &mut PathwayGraph, name: &str) -> PathwayId {
        graph.add_node(NewPathway::named(name)).unwrap()
    }

    #[test]
    fn roots_are_zero_and_children_increment() {
        let mut graph = PathwayGraph::new();
        let root = add(&mut graph, "Root");
        let mid = add(&mut graph, "Mid");
        let leaf = add(&mut graph, "Leaf");
        graph.add_edge(mid, root).unwrap();
        graph.add_edge(leaf, mid).unwrap();

        let levels = LevelCalculator::compute(&graph, &[root]);
        assert_eq!(levels[&root], 0);
        assert_eq!(levels[&mid], 1);
        assert_eq!(levels[&leaf], 2);
        assert!(LevelCalculator::is_leaf(&graph, leaf));
        assert!(!LevelCalculator::is_leaf(&graph, mid));
    }

    #[test]
    fn multiple_parents_take_the_deepest() {
        let mut graph = PathwayGraph::new();
        let root = add(&mut graph, "Root");
        let a = add(&mut graph, "A");
        let b = add(&mut graph, "B");
        let c = add(&mut graph, "C");
        graph.add_edge(a, root).unwrap();
        graph.add_edge(b, a).unwrap();
        graph.add_edge(c, root).unwrap();
        graph.add_edge(c, b).unwrap();

        let levels = LevelCalculator::compute(&graph, &[root]);
        assert_eq!(levels[&c], 3);
    }

    #[test]
    fn unreachable_nodes_get_sentinel() {
        let mut graph = PathwayGraph::new();
        let root = add(&mut graph, "Root");
        let orphan = add(&mut graph, "Orphan");
        let under_orphan = add(&mut graph, "Under");
        graph.add_edge(under_orphan, orphan).unwrap();

        let levels = LevelCalculator::compute(&graph, &[root]);
        assert_eq!(levels[&orphan], UNREACHABLE_LEVEL);
        assert_eq!(levels[&under_orphan], UNREACHABLE_LEVEL);
    }

    #[test]
    fn reachable_cycle_falls_back_to_bfs_level() {
        let mut graph = PathwayGraph::new();
        let root = add(&mut graph, "Root");
        let a = add(&mut graph, "A");
        let b = add(&mut graph, "B");
        graph.add_edge(a, root).unwrap();
        graph.add_edge(b, a).unwrap();
        graph.add_edge(a, b).unwrap();

        let levels = LevelCalculator::compute(&graph, &[root]);
        assert_eq!(levels[&a], 1);
        assert_eq!(levels[&b], 2);
    }
}
