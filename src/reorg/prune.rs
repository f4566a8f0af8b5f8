//! Safe pruning of unreachable nodes
//!
//! An unreachable node is deleted only when it has no children and no leaf
//! associations. Anything still carrying data is rescued under a canonical
//! root instead.

use super::rescue::{RescueOutcome, RescueResolver};
use super::types::{Change, ChangeKind, Phase, PhaseResult};
use super::{link_label, pathway_label, PhaseContext};
use crate::graph::{ParentLink, PathwayGraph, PathwayId, RootCatalog, ValidationError, UNREACHABLE_LEVEL};
use crate::hierarchy::{recompute_derived, LevelCalculator};
use crate::oracle::OraclePool;

#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub deleted: Vec<(PathwayId, String)>,
    pub rescued: Vec<RescueOutcome>,
    /// Links cut to turn a cycle-locked unreachable node into a head
    pub detached: Vec<ParentLink>,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.rescued.is_empty() && self.detached.is_empty()
    }
}

/// True when `id` may be physically removed.
pub fn is_prunable(graph: &PathwayGraph, catalog: &RootCatalog, id: PathwayId) -> bool {
    let unreachable = graph
        .node(id)
        .map_or(false, |n| n.hierarchy_level == UNREACHABLE_LEVEL);
    unreachable
        && !catalog.is_root(graph, id)
        && graph.child_count(id) == 0
        && graph.association_count_of(id) == 0
}

fn unreachable_nodes(graph: &PathwayGraph, catalog: &RootCatalog) -> Vec<PathwayId> {
    let levels = LevelCalculator::compute(graph, &catalog.root_ids(graph));
    levels
        .into_iter()
        .filter(|(id, level)| *level == UNREACHABLE_LEVEL && !catalog.is_root(graph, *id))
        .map(|(id, _)| id)
        .collect()
}

/// Delete or rescue until no non-root node is unreachable.
///
/// Works from the top of each unreachable fragment: parentless heads are
/// handled first, which makes their subtrees reachable or exposes the next
/// heads.
pub async fn settle_unreachable(
    graph: &mut PathwayGraph,
    catalog: &RootCatalog,
    pool: &OraclePool,
) -> Result<PruneReport, ValidationError> {
    let resolver = RescueResolver::new(catalog, pool);
    let mut report = PruneReport::default();

    for _ in 0..=graph.node_count() {
        recompute_derived(graph, catalog);
        let unreachable = unreachable_nodes(graph, catalog);
        let Some(lowest) = unreachable.first().copied() else {
            break;
        };

        let mut heads: Vec<PathwayId> = unreachable
            .iter()
            .copied()
            .filter(|id| graph.parent_count(*id) == 0)
            .collect();
        if heads.is_empty() {
            for parent in graph.parents_of(lowest).collect::<Vec<_>>() {
                report.detached.extend(graph.remove_link(lowest, parent));
            }
            heads.push(lowest);
        }

        let (keep, drop): (Vec<_>, Vec<_>) = heads
            .into_iter()
            .partition(|id| graph.child_count(*id) > 0 || graph.association_count_of(*id) > 0);

        for id in drop {
            let removed = graph.remove_node(id)?;
            tracing::info!(pathway = %removed.node.name, "pruned unreachable pathway");
            report.deleted.push((id, removed.node.name));
        }

        if !keep.is_empty() {
            let names = keep
                .iter()
                .map(|id| graph.name_of(*id).unwrap_or_default().to_string())
                .collect();
            let decisions = resolver.resolve_many(names).await;
            for (id, decision) in keep.into_iter().zip(decisions) {
                report.rescued.push(resolver.apply(graph, id, decision)?);
            }
        }
    }

    recompute_derived(graph, catalog);
    Ok(report)
}

/// Delete `id` if it is prunable, otherwise rescue it.
pub async fn settle_node(
    graph: &mut PathwayGraph,
    catalog: &RootCatalog,
    pool: &OraclePool,
    id: PathwayId,
) -> Result<PruneReport, ValidationError> {
    recompute_derived(graph, catalog);
    let mut report = PruneReport::default();
    if is_prunable(graph, catalog, id) {
        let removed = graph.remove_node(id)?;
        report.deleted.push((id, removed.node.name));
    } else {
        let resolver = RescueResolver::new(catalog, pool);
        report.rescued.push(resolver.rescue(graph, id).await?);
    }
    recompute_derived(graph, catalog);
    Ok(report)
}

/// Pruning phase
pub(crate) async fn run(ctx: &PhaseContext<'_>, graph: &mut PathwayGraph) -> PhaseResult {
    let mut result = PhaseResult::new(Phase::Pruning);

    let report = match settle_unreachable(graph, ctx.catalog, ctx.pool).await {
        Ok(report) => report,
        Err(e) => {
            result.fail(format!("pruning stopped: {}", e));
            return result;
        }
    };

    for link in &report.detached {
        result.record(Change::new(
            ChangeKind::RemoveLink,
            link_label(graph, link),
            "cut unreachable cycle",
        ));
    }
    for (id, name) in &report.deleted {
        result.record(Change::new(
            ChangeKind::DeleteNode,
            format!("{} '{}'", id, name),
            "unreachable with no children or associations",
        ));
    }
    for rescue in &report.rescued {
        let mut change = Change::new(
            ChangeKind::Reparent,
            pathway_label(graph, rescue.node),
            format!("rescued via {:?}", rescue.decision.source).to_lowercase(),
        )
        .to_value(rescue.decision.root.clone());
        if let Some(first) = rescue.detached.first() {
            change = change.from_value(first.parent.to_string());
        }
        result.record(change);
    }

    let left = unreachable_nodes(graph, ctx.catalog);
    if !left.is_empty() {
        result.fail(format!("{} pathway(s) still unreachable", left.len()));
    }
    result
}
