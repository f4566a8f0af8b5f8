//! Cycle prevention and full-graph cycle enumeration

use crate::graph::{CycleError, ParentLink, PathwayGraph, PathwayId, ValidationError};
use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;

/// Why a guarded link insertion did not happen
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkRejection {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

struct Frame {
    node: PathwayId,
    parents: Vec<PathwayId>,
    next: usize,
}

/// Guards link insertion against directed cycles.
pub struct CycleGuard;

impl CycleGuard {
    /// Every node reachable by following parent links upward from `id`,
    /// excluding `id` itself unless it sits on a cycle.
    pub fn ancestors(graph: &PathwayGraph, id: PathwayId) -> BTreeSet<PathwayId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<PathwayId> = graph.parents_of(id).collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            queue.extend(graph.parents_of(current).filter(|p| !seen.contains(p)));
        }
        seen
    }

    /// True iff adding `child → parent` would close a cycle: `child` is
    /// `parent` or already one of its ancestors.
    pub fn would_create_cycle(graph: &PathwayGraph, child: PathwayId, parent: PathwayId) -> bool {
        if child == parent {
            return true;
        }
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([parent]);
        while let Some(current) = queue.pop_front() {
            if current == child {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            queue.extend(graph.parents_of(current).filter(|p| !seen.contains(p)));
        }
        false
    }

    pub fn check(graph: &PathwayGraph, child: PathwayId, parent: PathwayId) -> Result<(), CycleError> {
        if Self::would_create_cycle(graph, child, parent) {
            Err(CycleError { child, parent })
        } else {
            Ok(())
        }
    }

    /// Insert `link` only if it keeps the graph acyclic.
    pub fn add_link(graph: &mut PathwayGraph, link: ParentLink) -> Result<(), LinkRejection> {
        if link.child != link.parent {
            Self::check(graph, link.child, link.parent)?;
        }
        graph.add_link(link)?;
        Ok(())
    }

    /// Enumerate cycles with a three-colour DFS over parent links.
    ///
    /// Each cycle is listed child-first along parent links, rotated to
    /// start at its smallest id. Duplicates are removed and the result is
    /// sorted.
    pub fn find_all_cycles(graph: &PathwayGraph) -> Vec<Vec<PathwayId>> {
        let mut color: HashMap<PathwayId, Color> = HashMap::new();
        let mut found: BTreeSet<Vec<PathwayId>> = BTreeSet::new();

        for start in graph.ids() {
            if color.contains_key(&start) {
                continue;
            }

            color.insert(start, Color::Gray);
            let mut path = vec![start];
            let mut stack = vec![Frame {
                node: start,
                parents: graph.parents_of(start).collect(),
                next: 0,
            }];

            while let Some(frame) = stack.last_mut() {
                if frame.next >= frame.parents.len() {
                    color.insert(frame.node, Color::Black);
                    stack.pop();
                    path.pop();
                    continue;
                }

                let next = frame.parents[frame.next];
                frame.next += 1;

                match color.get(&next) {
                    Some(Color::Gray) => {
                        if let Some(pos) = path.iter().position(|n| *n == next) {
                            found.insert(normalize_cycle(&path[pos..]));
                        }
                    }
                    Some(Color::Black) => {}
                    None => {
                        color.insert(next, Color::Gray);
                        path.push(next);
                        stack.push(Frame {
                            node: next,
                            parents: graph.parents_of(next).collect(),
                            next: 0,
                        });
                    }
                }
            }
        }

        found.into_iter().collect()
    }

    pub fn has_cycles(graph: &PathwayGraph) -> bool {
        !Self::find_all_cycles(graph).is_empty()
    }
}

fn normalize_cycle(cycle: &[PathwayId]) -> Vec<PathwayId> {
    let min_pos = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(pos, _)| pos)
        .unwrap_or(0);
    cycle[min_pos..]
        .iter()
        .chain(cycle[..min_pos].iter())
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NewPathway;

    fn chain(names: &[&str]) -> (PathwayGraph, Vec<PathwayId>) {
        let mut graph = PathwayGraph::new();
        let ids: Vec<_> = names
            .iter()
            .map(|n| graph.add_node(NewPathway::named(*n)).unwrap())
            .collect();
        for pair in ids.windows(2) {
            graph.add_edge(pair[1], pair[0]).unwrap();
        }
        (graph, ids)
    }

    #[test]
    fn would_create_cycle_detects_ancestor_and_self() {
        let (graph, ids) = chain(&["Root", "Mid", "Leaf"]);
        assert!(CycleGuard::would_create_cycle(&graph, ids[0], ids[2]));
        assert!(CycleGuard::would_create_cycle(&graph, ids[1], ids[1]));
        assert!(!CycleGuard::would_create_cycle(&graph, ids[2], ids[0]));
    }

    #[test]
    fn guarded_add_rejects_cycle_without_mutation() {
        let (mut graph, ids) = chain(&["Root", "Mid", "Leaf"]);
        let err = CycleGuard::add_link(&mut graph, ParentLink::new(ids[0], ids[2])).unwrap_err();
        assert_eq!(
            err,
            LinkRejection::Cycle(CycleError {
                child: ids[0],
                parent: ids[2]
            })
        );
        assert_eq!(graph.link_count(), 2);
    }

    #[test]
    fn ancestors_walks_all_parents() {
        let (mut graph, ids) = chain(&["Root", "Mid", "Leaf"]);
        let other = graph.add_node(NewPathway::named("Other")).unwrap();
        graph.add_edge(ids[2], other).unwrap();
        let ancestors = CycleGuard::ancestors(&graph, ids[2]);
        assert_eq!(ancestors, BTreeSet::from([ids[0], ids[1], other]));
    }

    #[test]
    fn finds_mutual_two_node_cycle_once() {
        let mut graph = PathwayGraph::new();
        let a = graph.add_node(NewPathway::named("A")).unwrap();
        let b = graph.add_node(NewPathway::named("B")).unwrap();
        graph.add_edge(a, b).unwrap();
        graph.add_edge(b, a).unwrap();
        assert_eq!(CycleGuard::find_all_cycles(&graph), vec![vec![a, b]]);
    }

    #[test]
    fn cycles_are_rotated_to_smallest_id() {
        let (mut graph, ids) = chain(&["A", "B", "C"]);
        // A <- B <- C, close with A -> C
        graph.add_edge(ids[0], ids[2]).unwrap();
        let cycles = CycleGuard::find_all_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0][0], ids[0]);
        assert_eq!(cycles[0].len(), 3);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let (graph, _) = chain(&["A", "B", "C", "D"]);
        assert!(!CycleGuard::has_cycles(&graph));
    }
}
