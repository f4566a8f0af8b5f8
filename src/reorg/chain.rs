//! Hierarchy chain ingestion and the HierarchyRepair phase
//!
//! A chain is `[root, ..., subject]`. Attaching walks it upward from the
//! subject, creating missing intermediates as synthetic nodes, and stops
//! as soon as it reaches a node that is already placed.

use super::types::{Change, ChangeKind, Phase, PhaseResult};
use super::{link_label, pathway_label, PhaseContext};
use crate::graph::{
    LinkSource, NewPathway, ParentLink, PathwayGraph, PathwayId, RootCatalog, ValidationError,
};
use crate::hierarchy::{recompute_derived, CycleGuard, LinkRejection};
use crate::oracle::OracleError;
use std::collections::BTreeSet;

/// Confidence given to links built from an oracle chain
pub const CHAIN_CONFIDENCE: f32 = 0.85;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutcome {
    pub created: Vec<PathwayId>,
    pub linked: Vec<ParentLink>,
}

/// Check a suggested chain and return it with canonical spellings: trimmed
/// names, the catalog's root spelling first, the subject's own name last.
pub fn validate_chain(
    catalog: &RootCatalog,
    chain: &[String],
    subject: &str,
) -> Result<Vec<String>, ValidationError> {
    if chain.len() < 2 {
        return Err(ValidationError::InvalidAnswer(format!(
            "chain for '{}' has {} element(s)",
            subject,
            chain.len()
        )));
    }
    let mut names: Vec<String> = chain.iter().map(|n| n.trim().to_string()).collect();
    if names.iter().any(String::is_empty) {
        return Err(ValidationError::EmptyName);
    }

    let root = catalog.canonical_name(&names[0]).ok_or_else(|| {
        ValidationError::InvalidAnswer(format!("chain starts at '{}', not a canonical root", names[0]))
    })?;
    names[0] = root.to_string();

    let last = names.len() - 1;
    if !names[last].eq_ignore_ascii_case(subject.trim()) {
        return Err(ValidationError::InvalidAnswer(format!(
            "chain ends at '{}', expected '{}'",
            names[last], subject
        )));
    }
    names[last] = subject.trim().to_string();

    if let Some(inner) = names[1..last].iter().find(|n| catalog.canonical_name(n).is_some()) {
        return Err(ValidationError::InvalidAnswer(format!(
            "root '{}' inside chain",
            inner
        )));
    }

    let mut seen = BTreeSet::new();
    for name in &names {
        if !seen.insert(name.to_lowercase()) {
            return Err(ValidationError::InvalidAnswer(format!("'{}' repeated in chain", name)));
        }
    }
    Ok(names)
}

/// Attach `subject` through `chain`. Nothing changes on error.
///
/// A subject that already has a parent is left alone and yields an empty
/// outcome.
pub fn attach_chain(
    graph: &mut PathwayGraph,
    catalog: &RootCatalog,
    chain: &[String],
    subject: PathwayId,
) -> Result<ChainOutcome, LinkRejection> {
    let subject_name = graph
        .name_of(subject)
        .ok_or(ValidationError::UnknownPathway(subject))?
        .to_string();
    let names = validate_chain(catalog, chain, &subject_name)?;

    let mut outcome = ChainOutcome::default();
    let mut child = subject;
    for parent_name in names[..names.len() - 1].iter().rev() {
        if graph.parent_count(child) > 0 || catalog.is_root(graph, child) {
            break;
        }
        let step = link_step(graph, catalog, &mut outcome, child, parent_name);
        match step {
            Ok(parent) => child = parent,
            Err(e) => {
                undo(graph, &outcome);
                return Err(e);
            }
        }
    }
    Ok(outcome)
}

fn link_step(
    graph: &mut PathwayGraph,
    catalog: &RootCatalog,
    outcome: &mut ChainOutcome,
    child: PathwayId,
    parent_name: &str,
) -> Result<PathwayId, LinkRejection> {
    let parent = match graph.id_of(parent_name) {
        Some(id) => id,
        None if catalog.is_root_name(parent_name) => {
            return Err(ValidationError::UnknownName(parent_name.to_string()).into());
        }
        None => {
            let id = graph.add_node(
                NewPathway::named(parent_name)
                    .synthetic()
                    .with_description("inferred from hierarchy chain"),
            )?;
            outcome.created.push(id);
            id
        }
    };
    let link = ParentLink::new(child, parent)
        .with_confidence(CHAIN_CONFIDENCE)
        .with_source(LinkSource::Oracle);
    CycleGuard::add_link(graph, link.clone())?;
    outcome.linked.push(link);
    Ok(parent)
}

fn undo(graph: &mut PathwayGraph, outcome: &ChainOutcome) {
    for link in outcome.linked.iter().rev() {
        graph.remove_link(link.child, link.parent);
    }
    for id in outcome.created.iter().rev() {
        let _ = graph.remove_node(*id);
    }
}

fn record_chain(result: &mut PhaseResult, graph: &PathwayGraph, outcome: &ChainOutcome, reason: &str) {
    for id in &outcome.created {
        result.record(Change::new(
            ChangeKind::CreateNode,
            pathway_label(graph, *id),
            "intermediate from hierarchy chain",
        ));
    }
    for link in &outcome.linked {
        result.record(Change::new(ChangeKind::AddLink, link_label(graph, link), reason));
    }
}

fn chain_answer(answer: Result<Vec<String>, OracleError>) -> Result<Vec<String>, String> {
    answer.map_err(|e| e.to_string())
}

/// HierarchyRepair phase: dangling parent links, then too-shallow leaves.
pub(crate) async fn run(ctx: &PhaseContext<'_>, graph: &mut PathwayGraph) -> PhaseResult {
    let mut result = PhaseResult::new(Phase::HierarchyRepair);

    // Links whose parent (or child) no longer exists
    let mut needs_chain = Vec::new();
    for link in graph.take_dangling_links() {
        let label = format!("link {} -> {}", link.child, link.parent);
        if !graph.contains(link.child) {
            result.record(Change::new(ChangeKind::RemoveLink, label, "child no longer exists"));
            continue;
        }
        result.record(Change::new(ChangeKind::RemoveLink, label, "parent no longer exists"));
        if graph.parent_count(link.child) == 0 && !needs_chain.contains(&link.child) {
            needs_chain.push(link.child);
        }
    }

    if !needs_chain.is_empty() {
        let requests = needs_chain
            .iter()
            .map(|id| (graph.name_of(*id).unwrap_or_default().to_string(), String::new()))
            .collect();
        let answers = ctx.pool.suggest_hierarchy_chains(requests).await;
        for (node, answer) in needs_chain.into_iter().zip(answers) {
            let label = pathway_label(graph, node);
            let outcome = chain_answer(answer).and_then(|chain| {
                attach_chain(graph, ctx.catalog, &chain, node).map_err(|e| e.to_string())
            });
            match outcome {
                Ok(outcome) if !outcome.linked.is_empty() => {
                    record_chain(&mut result, graph, &outcome, "replaces link to deleted parent");
                }
                Ok(_) => {}
                Err(e) => result.add_warning(format!(
                    "{} lost its parent and no chain could be attached ({}); left for rescue",
                    label, e
                )),
            }
        }
    }

    recompute_derived(graph, ctx.catalog);

    // Leaves sitting directly under a root
    let shallow: Vec<(PathwayId, PathwayId)> = graph
        .nodes()
        .filter(|n| n.hierarchy_level == 1 && n.is_leaf && !ctx.config.is_shallow_exempt(&n.name))
        .filter(|n| !ctx.catalog.is_root_name(&n.name))
        .filter_map(|n| {
            let parents: Vec<_> = graph.parents_of(n.id).collect();
            match parents.as_slice() {
                [root] if ctx.catalog.is_root(graph, *root) => Some((n.id, *root)),
                _ => None,
            }
        })
        .collect();

    if !shallow.is_empty() {
        tracing::info!(nodes = shallow.len(), "deepening leaves placed directly under roots");
        let requests = shallow
            .iter()
            .map(|(node, root)| {
                (
                    graph.name_of(*node).unwrap_or_default().to_string(),
                    graph.name_of(*root).unwrap_or_default().to_string(),
                )
            })
            .collect();
        let answers = ctx.pool.suggest_hierarchy_chains(requests).await;

        for ((node, root), answer) in shallow.into_iter().zip(answers) {
            let label = pathway_label(graph, node);
            let root_name = graph.name_of(root).unwrap_or_default().to_string();
            let chain = match answer {
                Ok(chain) => chain,
                Err(e) => {
                    tracing::debug!(pathway = %label, error = %e, "no chain; leaving under root");
                    continue;
                }
            };
            let same_root = chain
                .first()
                .and_then(|first| ctx.catalog.canonical_name(first))
                .map_or(false, |first| first == root_name);
            if chain.len() < 3 || !same_root {
                result.add_warning(format!(
                    "chain for {} adds no intermediate under '{}'; left in place",
                    label, root_name
                ));
                continue;
            }

            let Some(removed) = graph.remove_link(node, root) else {
                continue;
            };
            match attach_chain(graph, ctx.catalog, &chain, node) {
                Ok(outcome) if !outcome.linked.is_empty() => {
                    result.record(
                        Change::new(ChangeKind::Reparent, label, "too shallow under root")
                            .from_value(root_name),
                    );
                    record_chain(&mut result, graph, &outcome, "intermediate placement");
                }
                outcome => {
                    let reason = match outcome {
                        Err(e) => e.to_string(),
                        Ok(_) => "nothing linked".to_string(),
                    };
                    if let Err(e) = graph.add_link(removed) {
                        result.fail(format!("could not restore root link of {}: {}", label, e));
                        return result;
                    }
                    result.add_warning(format!("{} keeps its root placement: {}", label, reason));
                }
            }
        }
    }

    recompute_derived(graph, ctx.catalog);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::oracle::{OraclePool, ScriptedOracle};
    use std::sync::Arc;

    fn seeded() -> (PathwayGraph, RootCatalog) {
        let catalog = RootCatalog::standard();
        let mut graph = PathwayGraph::new();
        catalog.seed(&mut graph).unwrap();
        (graph, catalog)
    }

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn validation_canonicalizes_and_rejects() {
        let catalog = RootCatalog::standard();
        let ok = validate_chain(&catalog, &chain(&["gene expression", " Chromatin ", "HDAC"]), "HDAC").unwrap();
        assert_eq!(ok, chain(&["Gene Expression", "Chromatin", "HDAC"]));

        assert!(validate_chain(&catalog, &chain(&["HDAC"]), "HDAC").is_err());
        assert!(validate_chain(&catalog, &chain(&["Nowhere", "HDAC"]), "HDAC").is_err());
        assert!(validate_chain(&catalog, &chain(&["Gene Expression", "Other"]), "HDAC").is_err());
        assert!(validate_chain(&catalog, &chain(&["Gene Expression", "", "HDAC"]), "HDAC").is_err());
        assert!(validate_chain(&catalog, &chain(&["Gene Expression", "X", "x", "HDAC"]), "HDAC").is_err());
        assert!(
            validate_chain(&catalog, &chain(&["Gene Expression", "Proteostasis", "HDAC"]), "HDAC").is_err()
        );
    }

    #[test]
    fn attach_creates_missing_intermediates() {
        let (mut graph, catalog) = seeded();
        let subject = graph.add_node(NewPathway::named("Histone Deacetylation")).unwrap();
        let outcome = attach_chain(
            &mut graph,
            &catalog,
            &chain(&["Gene Expression", "Chromatin Remodeling", "Histone Modification", "Histone Deacetylation"]),
            subject,
        )
        .unwrap();

        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.linked.len(), 3);
        recompute_derived(&mut graph, &catalog);
        assert_eq!(graph.node(subject).unwrap().hierarchy_level, 3);
        assert!(graph.node_by_name("Chromatin Remodeling").unwrap().is_synthetic);
    }

    #[test]
    fn attach_stops_at_placed_node() {
        let (mut graph, catalog) = seeded();
        let root = graph.id_of("Gene Expression").unwrap();
        let placed = graph.add_node(NewPathway::named("Chromatin Remodeling")).unwrap();
        graph.add_edge(placed, root).unwrap();
        let subject = graph.add_node(NewPathway::named("HDAC")).unwrap();

        let outcome = attach_chain(
            &mut graph,
            &catalog,
            &chain(&["Gene Expression", "Chromatin Remodeling", "HDAC"]),
            subject,
        )
        .unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.linked.len(), 1);
        assert!(graph.has_link(subject, placed));
    }

    #[test]
    fn cyclic_chain_is_undone() {
        let (mut graph, catalog) = seeded();
        let subject = graph.add_node(NewPathway::named("Subject")).unwrap();
        let below = graph.add_node(NewPathway::named("Below")).unwrap();
        graph.add_edge(below, subject).unwrap();
        let before = graph.to_snapshot();

        let err = attach_chain(
            &mut graph,
            &catalog,
            &chain(&["Proteostasis", "Fresh", "Below", "Subject"]),
            subject,
        )
        .unwrap_err();
        assert!(matches!(err, LinkRejection::Cycle(_)));
        assert_eq!(graph.to_snapshot(), before);
    }

    #[tokio::test]
    async fn phase_deepens_shallow_leaves_and_skips_exempt_ones() {
        let (mut graph, catalog) = seeded();
        let root = graph.id_of("Gene Expression").unwrap();
        let proteostasis = graph.id_of("Proteostasis").unwrap();
        let shallow = graph.add_node(NewPathway::named("Histone Deacetylation")).unwrap();
        graph.add_edge(shallow, root).unwrap();
        let exempt = graph.add_node(NewPathway::named("Autophagy")).unwrap();
        graph.add_edge(exempt, proteostasis).unwrap();
        recompute_derived(&mut graph, &catalog);

        let oracle = ScriptedOracle::available()
            .with_chain(
                "Histone Deacetylation",
                ["Gene Expression", "Chromatin Regulation", "Histone Deacetylation"],
            )
            .with_chain("Autophagy", ["Proteostasis", "Degradation", "Autophagy"]);
        let pool = OraclePool::new(Arc::new(oracle));
        let config = EngineConfig::default();
        let ctx = PhaseContext {
            catalog: &catalog,
            config: &config,
            pool: &pool,
        };
        let result = run(&ctx, &mut graph).await;

        assert!(result.success);
        let intermediate = graph.id_of("Chromatin Regulation").unwrap();
        assert_eq!(graph.parents_of(shallow).collect::<Vec<_>>(), vec![intermediate]);
        assert_eq!(graph.node(shallow).unwrap().hierarchy_level, 2);
        assert!(graph.has_link(exempt, proteostasis));
        assert!(graph.id_of("Degradation").is_none());
    }

    #[tokio::test]
    async fn phase_replaces_dangling_parent_links() {
        let catalog = RootCatalog::standard();
        let mut seeded = PathwayGraph::new();
        catalog.seed(&mut seeded).unwrap();
        let orphan = seeded.add_node(NewPathway::named("Mismatch Repair")).unwrap();
        let mut snapshot = seeded.to_snapshot();
        snapshot
            .links
            .push(ParentLink::new(orphan, PathwayId::new(4_242)));
        let mut graph = PathwayGraph::from_snapshot(snapshot).unwrap();
        assert_eq!(graph.dangling_links().len(), 1);

        let oracle = ScriptedOracle::available().with_chain(
            "Mismatch Repair",
            ["Genome Maintenance", "DNA Repair", "Mismatch Repair"],
        );
        let pool = OraclePool::new(Arc::new(oracle));
        let config = EngineConfig::default();
        let ctx = PhaseContext {
            catalog: &catalog,
            config: &config,
            pool: &pool,
        };
        let result = run(&ctx, &mut graph).await;

        assert!(result.success);
        assert!(graph.dangling_links().is_empty());
        let repair = graph.id_of("DNA Repair").unwrap();
        assert!(graph.has_link(orphan, repair));
        assert_eq!(graph.node(orphan).unwrap().hierarchy_level, 2);
    }
}
