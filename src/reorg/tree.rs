//! Single-parent enforcement
//!
//! Nodes with several parents keep exactly one: the oracle's choice when it
//! names a candidate and keeps the graph acyclic, otherwise the first
//! candidate that does. Remaining cycles are then broken at the edge whose
//! parent sits deepest.

use super::types::{Change, ChangeKind, Phase, PhaseResult};
use super::{link_label, pathway_label, PhaseContext};
use crate::graph::{ParentLink, PathwayGraph, PathwayId, RootCatalog, UNREACHABLE_LEVEL};
use crate::hierarchy::{recompute_derived, CycleGuard, LevelCalculator};
use crate::oracle::{OraclePool, OracleError, ParentSelection};
use std::collections::BTreeMap;

/// How one multi-parent node was settled
#[derive(Debug, Clone, PartialEq)]
pub struct ParentResolution {
    pub child: PathwayId,
    pub kept: PathwayId,
    pub removed: Vec<ParentLink>,
    /// The oracle answer was unusable; candidate order decided
    pub fallback: bool,
    /// The preferred parent would have closed a cycle
    pub rerouted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeResolution {
    Resolved(ParentResolution),
    /// Zero or one parent already
    AlreadySingle,
    /// Every candidate closes a cycle
    Unresolved,
}

#[derive(Debug, Clone, Default)]
pub struct TreeEnforcement {
    pub resolutions: Vec<ParentResolution>,
    pub unresolved: Vec<PathwayId>,
    pub cycle_breaks: Vec<ParentLink>,
    pub root_links_removed: Vec<ParentLink>,
    pub warnings: Vec<String>,
}

pub struct TreeEnforcer<'a> {
    catalog: &'a RootCatalog,
    pool: &'a OraclePool,
}

impl<'a> TreeEnforcer<'a> {
    pub fn new(catalog: &'a RootCatalog, pool: &'a OraclePool) -> Self {
        Self { catalog, pool }
    }

    pub async fn enforce(&self, graph: &mut PathwayGraph) -> TreeEnforcement {
        let mut report = TreeEnforcement {
            root_links_removed: strip_root_parents(graph, self.catalog),
            ..Default::default()
        };

        let multi = graph.multi_parent_nodes();
        let requests: Vec<(String, Vec<String>)> = multi
            .iter()
            .map(|child| (name_or_id(graph, *child), candidate_names(graph, *child)))
            .collect();
        tracing::info!(nodes = multi.len(), "resolving multi-parent nodes");
        let answers = self.pool.select_parents(requests.clone()).await;

        let mut preferred: BTreeMap<PathwayId, (Option<PathwayId>, bool)> = BTreeMap::new();
        for ((child, (child_name, names)), answer) in multi.iter().zip(&requests).zip(answers) {
            let (choice, warning) = validate_selection(child_name, names, answer);
            let fallback = warning.is_some();
            if let Some(warning) = warning {
                report.warnings.push(warning);
            }
            let parent = choice.and_then(|name| graph.id_of(&name));
            preferred.insert(*child, (parent, fallback || parent.is_none()));
        }

        for child in &multi {
            let (parent, fallback) = preferred.get(child).copied().unwrap_or((None, true));
            match settle(graph, *child, parent, fallback) {
                NodeResolution::Resolved(resolution) => report.resolutions.push(resolution),
                NodeResolution::AlreadySingle => {}
                NodeResolution::Unresolved => report.unresolved.push(*child),
            }
        }

        report.cycle_breaks = break_cycles(graph, self.catalog);

        // Cycle breaking may have freed nodes whose every candidate was cyclic.
        let retry = std::mem::take(&mut report.unresolved);
        for child in retry {
            let (parent, fallback) = preferred.get(&child).copied().unwrap_or((None, true));
            match settle(graph, child, parent, fallback) {
                NodeResolution::Resolved(resolution) => report.resolutions.push(resolution),
                NodeResolution::AlreadySingle => {}
                NodeResolution::Unresolved => report.unresolved.push(child),
            }
        }

        recompute_derived(graph, self.catalog);

        if CycleGuard::has_cycles(graph) {
            report
                .warnings
                .push("cycles remain after enforcement".to_string());
        }
        for id in graph.multi_parent_nodes() {
            if !report.unresolved.contains(&id) {
                report.unresolved.push(id);
            }
        }
        tracing::info!(
            resolved = report.resolutions.len(),
            unresolved = report.unresolved.len(),
            cycle_breaks = report.cycle_breaks.len(),
            "tree enforcement finished"
        );
        report
    }

    /// Settle a single node, asking the oracle for its preferred parent.
    pub async fn resolve_node(&self, graph: &mut PathwayGraph, child: PathwayId) -> NodeResolution {
        if graph.parent_count(child) < 2 {
            return NodeResolution::AlreadySingle;
        }
        let child_name = name_or_id(graph, child);
        let names = candidate_names(graph, child);
        let answer = self.pool.select_parent(&child_name, &names).await;
        let (choice, warning) = validate_selection(&child_name, &names, answer);
        let fallback = warning.is_some();
        if let Some(warning) = warning {
            tracing::warn!("{}", warning);
        }
        let parent = choice.and_then(|name| graph.id_of(&name));
        settle(graph, child, parent, fallback || parent.is_none())
    }
}

/// Keep one parent of `child`, preferring `preferred`, skipping any
/// candidate that would close a cycle.
fn settle(
    graph: &mut PathwayGraph,
    child: PathwayId,
    preferred: Option<PathwayId>,
    fallback: bool,
) -> NodeResolution {
    let mut candidates: Vec<PathwayId> = graph.parents_of(child).collect();
    if candidates.len() < 2 {
        return NodeResolution::AlreadySingle;
    }
    if let Some(preferred) = preferred {
        if let Some(pos) = candidates.iter().position(|c| *c == preferred) {
            let first = candidates.remove(pos);
            candidates.insert(0, first);
        }
    }

    let Some(kept) = candidates
        .iter()
        .copied()
        .find(|candidate| !CycleGuard::would_create_cycle(graph, child, *candidate))
    else {
        tracing::warn!(%child, "every candidate parent closes a cycle");
        return NodeResolution::Unresolved;
    };

    let removed = candidates
        .iter()
        .filter(|c| **c != kept)
        .filter_map(|c| graph.remove_link(child, *c))
        .collect();
    NodeResolution::Resolved(ParentResolution {
        child,
        kept,
        removed,
        fallback,
        rerouted: kept != candidates[0],
    })
}

/// Check an oracle answer against the candidates: exact, then
/// case-insensitive. Unusable answers fall back to the first candidate.
fn validate_selection(
    child: &str,
    candidates: &[String],
    answer: Result<ParentSelection, OracleError>,
) -> (Option<String>, Option<String>) {
    let first = candidates.first().cloned();
    match answer {
        Ok(selection) => {
            if let Some(exact) = candidates.iter().find(|c| **c == selection.parent) {
                return (Some(exact.clone()), None);
            }
            if let Some(close) = candidates
                .iter()
                .find(|c| c.trim().eq_ignore_ascii_case(selection.parent.trim()))
            {
                return (Some(close.clone()), None);
            }
            (
                first,
                Some(format!(
                    "oracle chose '{}' for '{}', not a candidate; using first candidate",
                    selection.parent, child
                )),
            )
        }
        Err(e) => (
            first,
            Some(format!(
                "no parent selection for '{}' ({}); using first candidate",
                child, e
            )),
        ),
    }
}

/// Remove every parent link of a canonical root.
pub fn strip_root_parents(graph: &mut PathwayGraph, catalog: &RootCatalog) -> Vec<ParentLink> {
    let mut removed = Vec::new();
    for root in catalog.root_ids(graph) {
        for parent in graph.parents_of(root).collect::<Vec<_>>() {
            removed.extend(graph.remove_link(root, parent));
        }
    }
    removed
}

/// Break every cycle by dropping, per cycle, the edge whose parent is
/// deepest. Unreachable parents count as deepest; ties go to the higher
/// parent id.
pub fn break_cycles(graph: &mut PathwayGraph, catalog: &RootCatalog) -> Vec<ParentLink> {
    let mut dropped = Vec::new();
    loop {
        let cycles = CycleGuard::find_all_cycles(graph);
        if cycles.is_empty() {
            break;
        }
        let levels = LevelCalculator::compute(graph, &catalog.root_ids(graph));
        let depth = |id: PathwayId| match levels.get(&id).copied() {
            Some(level) if level != UNREACHABLE_LEVEL => level,
            _ => i32::MAX,
        };

        let before = dropped.len();
        for cycle in cycles {
            let edge = (0..cycle.len())
                .map(|i| (cycle[i], cycle[(i + 1) % cycle.len()]))
                .max_by_key(|(_, parent)| (depth(*parent), *parent));
            if let Some((child, parent)) = edge {
                if let Some(link) = graph.remove_link(child, parent) {
                    tracing::info!(%child, %parent, "broke cycle");
                    dropped.push(link);
                }
            }
        }
        if dropped.len() == before {
            break;
        }
    }
    dropped
}

fn candidate_names(graph: &PathwayGraph, child: PathwayId) -> Vec<String> {
    graph
        .parents_of(child)
        .map(|parent| name_or_id(graph, parent))
        .collect()
}

fn name_or_id(graph: &PathwayGraph, id: PathwayId) -> String {
    graph
        .name_of(id)
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string())
}

/// TreeEnforce phase
pub(crate) async fn run(ctx: &PhaseContext<'_>, graph: &mut PathwayGraph) -> PhaseResult {
    let mut result = PhaseResult::new(Phase::TreeEnforce);
    let enforcer = TreeEnforcer::new(ctx.catalog, ctx.pool);
    let report = enforcer.enforce(graph).await;

    for link in &report.root_links_removed {
        result.record(Change::new(
            ChangeKind::RemoveLink,
            link_label(graph, link),
            "canonical roots have no parents",
        ));
    }
    for resolution in &report.resolutions {
        for link in &resolution.removed {
            result.record(
                Change::new(
                    ChangeKind::RemoveLink,
                    link_label(graph, link),
                    if resolution.rerouted {
                        "preferred parent would close a cycle"
                    } else {
                        "single parent enforced"
                    },
                )
                .to_value(pathway_label(graph, resolution.kept)),
            );
        }
    }
    for link in &report.cycle_breaks {
        result.record(Change::new(
            ChangeKind::RemoveLink,
            link_label(graph, link),
            "broke cycle at deepest parent",
        ));
    }
    for warning in report.warnings {
        result.add_warning(warning);
    }
    for id in &report.unresolved {
        result.unresolved.push(pathway_label(graph, *id));
    }
    if CycleGuard::has_cycles(graph) {
        result.fail("graph still contains cycles");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NewPathway;
    use crate::oracle::ScriptedOracle;
    use std::sync::Arc;

    fn seeded() -> (PathwayGraph, RootCatalog) {
        let catalog = RootCatalog::standard();
        let mut graph = PathwayGraph::new();
        catalog.seed(&mut graph).unwrap();
        (graph, catalog)
    }

    fn add(graph: &mut PathwayGraph, name: &str, parents: &[&str]) -> PathwayId {
        let id = match graph.id_of(name) {
            Some(id) => id,
            None => graph.add_node(NewPathway::named(name)).unwrap(),
        };
        for parent in parents {
            let parent = graph.id_of(parent).unwrap();
            graph.add_edge(id, parent).unwrap();
        }
        id
    }

    #[tokio::test]
    async fn oracle_choice_is_kept() {
        let (mut graph, catalog) = seeded();
        add(&mut graph, "Autophagy", &["Proteostasis"]);
        add(&mut graph, "Vesicle Trafficking", &["Membrane & Transport"]);
        let child = add(&mut graph, "Mitophagy", &["Autophagy", "Vesicle Trafficking"]);

        let pool = OraclePool::new(Arc::new(
            ScriptedOracle::available().with_parent("Mitophagy", "autophagy"),
        ));
        let report = TreeEnforcer::new(&catalog, &pool).enforce(&mut graph).await;

        assert!(report.warnings.is_empty());
        assert_eq!(report.resolutions.len(), 1);
        assert_eq!(
            graph.parents_of(child).collect::<Vec<_>>(),
            vec![graph.id_of("Autophagy").unwrap()]
        );
        assert_eq!(graph.node(child).unwrap().hierarchy_level, 2);
    }

    #[tokio::test]
    async fn unusable_answer_falls_back_to_first_candidate() {
        let (mut graph, catalog) = seeded();
        let a = add(&mut graph, "Aggrephagy Core", &["Proteostasis"]);
        add(&mut graph, "Lipophagy Core", &["Metabolism & Bioenergetics"]);
        let child = add(&mut graph, "Shared", &["Aggrephagy Core", "Lipophagy Core"]);

        let pool = OraclePool::new(Arc::new(
            ScriptedOracle::available().with_parent("Shared", "Something Else"),
        ));
        let report = TreeEnforcer::new(&catalog, &pool).enforce(&mut graph).await;

        assert_eq!(report.warnings.len(), 1);
        assert!(report.resolutions[0].fallback);
        assert_eq!(graph.parents_of(child).collect::<Vec<_>>(), vec![a]);
    }

    #[tokio::test]
    async fn cycle_inducing_choice_is_rerouted() {
        let (mut graph, catalog) = seeded();
        let x = add(&mut graph, "X", &["Proteostasis"]);
        let y = add(&mut graph, "Y", &["Gene Expression"]);
        let child = add(&mut graph, "Child", &["X", "Y"]);
        let z = add(&mut graph, "Z", &["Child"]);
        // Child -> Z closes Child -> Z -> Child
        graph.add_edge(child, z).unwrap();

        let pool = OraclePool::new(Arc::new(ScriptedOracle::available().with_parent("Child", "Z")));
        let report = TreeEnforcer::new(&catalog, &pool).enforce(&mut graph).await;

        let kept: Vec<_> = graph.parents_of(child).collect();
        assert_eq!(kept.len(), 1);
        assert!(kept[0] == x || kept[0] == y);
        assert!(!graph.has_link(child, z));
        assert!(report.unresolved.is_empty());
        assert!(!CycleGuard::has_cycles(&graph));
    }

    #[tokio::test]
    async fn mutual_cycle_keeps_one_edge() {
        let (mut graph, catalog) = seeded();
        let a = add(&mut graph, "A", &[]);
        let b = add(&mut graph, "B", &["A"]);
        graph.add_edge(a, b).unwrap();

        let pool = OraclePool::new(Arc::new(ScriptedOracle::unavailable()));
        let report = TreeEnforcer::new(&catalog, &pool).enforce(&mut graph).await;

        assert_eq!(report.cycle_breaks.len(), 1);
        assert_eq!(graph.link_count(), 1);
        // both unreachable: the edge pointing at the higher id goes
        assert!(graph.has_link(b, a));
        assert!(CycleGuard::find_all_cycles(&graph).is_empty());
    }

    #[tokio::test]
    async fn cycle_breaks_at_deeper_parent() {
        let (mut graph, catalog) = seeded();
        let a = add(&mut graph, "A", &["Proteostasis"]);
        let b = add(&mut graph, "B", &["A"]);
        let c = add(&mut graph, "C", &["B"]);
        // C -> B -> A and A -> C: A now has two parents; the oracle is silent
        // so A keeps Proteostasis (first candidate) and A -> C goes.
        graph.add_edge(a, c).unwrap();

        let pool = OraclePool::new(Arc::new(ScriptedOracle::unavailable()));
        TreeEnforcer::new(&catalog, &pool).enforce(&mut graph).await;

        assert!(!graph.has_link(a, c));
        assert!(graph.has_link(b, a));
        assert!(graph.has_link(c, b));
        assert_eq!(graph.node(c).unwrap().hierarchy_level, 3);
    }

    #[test]
    fn break_cycles_drops_deepest_parent_edge() {
        let (mut graph, catalog) = seeded();
        let a = add(&mut graph, "A", &["Proteostasis"]);
        let b = add(&mut graph, "B", &["A"]);
        let c = add(&mut graph, "C", &["B"]);
        let d = add(&mut graph, "D", &["C"]);
        // B -> D -> C -> B; D is the deepest parent on the cycle
        graph.add_edge(b, d).unwrap();

        let dropped = break_cycles(&mut graph, &catalog);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].key(), (b, d));
        assert!(graph.has_link(b, a));
        assert!(graph.has_link(c, b));
        assert!(!CycleGuard::has_cycles(&graph));
    }

    #[test]
    fn root_parents_are_stripped() {
        let (mut graph, catalog) = seeded();
        let root = graph.id_of("Proteostasis").unwrap();
        let other = graph.id_of("Gene Expression").unwrap();
        graph.add_edge(root, other).unwrap();
        let removed = strip_root_parents(&mut graph, &catalog);
        assert_eq!(removed.len(), 1);
        assert_eq!(graph.parent_count(root), 0);
    }
}
