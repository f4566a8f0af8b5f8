//! Invariant checks
//!
//! Each check inspects the graph and returns the issues it found. Derived
//! attributes are computed once per battery and shared by the checks that
//! compare against them.

use crate::graph::{ItemId, PathwayGraph, PathwayId, RootCatalog, UNREACHABLE_LEVEL};
use crate::hierarchy::{compute_derived, CycleGuard, DerivedAttributes};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Derived data is stale; batch recompute
    Low,
    /// One entity is wrong; targeted repair
    Medium,
    /// Needs a human
    High,
    /// Graph must not be used
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an issue is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityRef {
    Graph,
    Pathway { id: PathwayId },
    Root { name: String },
    Link { child: PathwayId, parent: PathwayId },
    Item { id: ItemId },
    Association { pathway: PathwayId, item: ItemId },
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Graph => write!(f, "graph"),
            EntityRef::Pathway { id } => write!(f, "pathway:{}", id),
            EntityRef::Root { name } => write!(f, "root:{}", name),
            EntityRef::Link { child, parent } => write!(f, "link:{}->{}", child, parent),
            EntityRef::Item { id } => write!(f, "item:{}", id),
            EntityRef::Association { pathway, item } => {
                write!(f, "association:{}<->{}", pathway, item)
            }
        }
    }
}

/// Repair the auto-repairer knows how to apply.
///
/// Variant order is the order repairs run in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixAction {
    ReseedRoots,
    DropDanglingLinks,
    DropDanglingAssociations,
    EnforceSingleParent { pathway: PathwayId },
    SettleOrphan { pathway: PathwayId },
    AttachItem { item: ItemId },
    RecomputeDerived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub check: String,
    pub severity: Severity,
    pub entity: EntityRef,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixAction>,
}

impl Issue {
    pub fn new(check: &str, severity: Severity, entity: EntityRef, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            severity,
            entity,
            message: message.into(),
            fix: None,
        }
    }

    pub fn fixed_by(mut self, action: FixAction) -> Self {
        self.fix = Some(action);
        self
    }

    /// HIGH and CRITICAL issues are never repaired automatically.
    pub fn is_auto_fixable(&self) -> bool {
        self.fix.is_some() && self.severity <= Severity::Medium
    }

    /// Blocks release: HIGH or above, or MEDIUM without an automatic fix
    pub fn is_blocking(&self) -> bool {
        self.severity >= Severity::High || (self.severity == Severity::Medium && self.fix.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    /// No issue of MEDIUM severity or above
    pub passed: bool,
    pub issues: Vec<Issue>,
}

impl CheckResult {
    fn new(name: &str, issues: Vec<Issue>) -> Self {
        Self {
            name: name.to_string(),
            passed: issues.iter().all(|i| i.severity < Severity::Medium),
            issues,
        }
    }
}

/// Everything a check may look at
pub struct CheckInput<'a> {
    pub graph: &'a PathwayGraph,
    pub catalog: &'a RootCatalog,
    pub derived: &'a DerivedAttributes,
}

pub type CheckFn = fn(&CheckInput<'_>) -> Vec<Issue>;

/// The full battery, in reporting order
pub const CHECKS: &[(&str, CheckFn)] = &[
    ("items_have_association", items_have_association),
    ("association_references_valid", association_references_valid),
    ("all_roots_exist", all_roots_exist),
    ("no_duplicate_names", no_duplicate_names),
    ("no_empty_names", no_empty_names),
    ("no_cycles", no_cycles),
    ("single_parent", single_parent),
    ("parent_exists", parent_exists),
    ("no_orphan_pathways", no_orphan_pathways),
    ("levels_correct", levels_correct),
    ("is_leaf_accurate", is_leaf_accurate),
    ("ancestor_ids_accurate", ancestor_ids_accurate),
    ("usage_counts_accurate", usage_counts_accurate),
];

/// Subset gating the end of a reorganization run
pub const PREFLIGHT_CHECKS: &[&str] = &[
    "no_cycles",
    "no_orphan_pathways",
    "all_roots_exist",
    "association_references_valid",
];

pub fn run_checks(graph: &PathwayGraph, catalog: &RootCatalog) -> Vec<CheckResult> {
    run_selected(graph, catalog, |_| true)
}

pub fn run_named(graph: &PathwayGraph, catalog: &RootCatalog, names: &[&str]) -> Vec<CheckResult> {
    run_selected(graph, catalog, |name| names.contains(&name))
}

fn run_selected(
    graph: &PathwayGraph,
    catalog: &RootCatalog,
    wanted: impl Fn(&str) -> bool,
) -> Vec<CheckResult> {
    let derived = compute_derived(graph, catalog);
    let input = CheckInput {
        graph,
        catalog,
        derived: &derived,
    };
    CHECKS
        .iter()
        .filter(|(name, _)| wanted(name))
        .map(|(name, check)| {
            let issues = check(&input);
            if !issues.is_empty() {
                tracing::debug!(check = name, issues = issues.len(), "check reported issues");
            }
            CheckResult::new(name, issues)
        })
        .collect()
}

fn label(graph: &PathwayGraph, id: PathwayId) -> String {
    match graph.name_of(id) {
        Some(name) => format!("'{}' ({})", name, id),
        None => id.to_string(),
    }
}

// === Associations ===

fn items_have_association(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .graph
        .unassociated_items()
        .into_iter()
        .map(|id| {
            let label = input.graph.item(id).map(|i| i.label.as_str()).unwrap_or_default();
            Issue::new(
                "items_have_association",
                Severity::Medium,
                EntityRef::Item { id },
                format!("item {} '{}' has no leaf association", id, label),
            )
            .fixed_by(FixAction::AttachItem { item: id })
        })
        .collect()
}

fn association_references_valid(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .graph
        .dangling_associations()
        .iter()
        .map(|a| {
            Issue::new(
                "association_references_valid",
                Severity::Medium,
                EntityRef::Association {
                    pathway: a.pathway,
                    item: a.item,
                },
                format!("association {} <-> {} references a missing entity", a.pathway, a.item),
            )
            .fixed_by(FixAction::DropDanglingAssociations)
        })
        .collect()
}

// === Roots and names ===

fn all_roots_exist(input: &CheckInput<'_>) -> Vec<Issue> {
    let graph = input.graph;
    let mut issues = Vec::new();
    for root in input.catalog.roots() {
        let Some(id) = graph.id_of(&root.name) else {
            issues.push(Issue::new(
                "all_roots_exist",
                Severity::Critical,
                EntityRef::Root {
                    name: root.name.clone(),
                },
                format!("canonical root '{}' is missing", root.name),
            ));
            continue;
        };
        let level = graph.node(id).map_or(UNREACHABLE_LEVEL, |n| n.hierarchy_level);
        if level != 0 {
            issues.push(
                Issue::new(
                    "all_roots_exist",
                    Severity::Medium,
                    EntityRef::Pathway { id },
                    format!("root '{}' stored at level {}", root.name, level),
                )
                .fixed_by(FixAction::ReseedRoots),
            );
        }
        if graph.parent_count(id) > 0 {
            issues.push(
                Issue::new(
                    "all_roots_exist",
                    Severity::Medium,
                    EntityRef::Pathway { id },
                    format!("root '{}' has {} parent(s)", root.name, graph.parent_count(id)),
                )
                .fixed_by(FixAction::ReseedRoots),
            );
        }
    }
    issues
}

fn no_duplicate_names(input: &CheckInput<'_>) -> Vec<Issue> {
    let mut groups: BTreeMap<String, Vec<PathwayId>> = BTreeMap::new();
    for node in input.graph.nodes() {
        let key = node.name.trim().to_lowercase();
        if !key.is_empty() {
            groups.entry(key).or_default().push(node.id);
        }
    }
    groups
        .into_values()
        .filter(|ids| ids.len() > 1)
        .map(|ids| {
            let names: Vec<String> = ids.iter().map(|id| label(input.graph, *id)).collect();
            Issue::new(
                "no_duplicate_names",
                Severity::High,
                EntityRef::Pathway { id: ids[0] },
                format!("names differ only by case: {}", names.join(", ")),
            )
        })
        .collect()
}

fn no_empty_names(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .graph
        .nodes()
        .filter(|n| n.name.trim().is_empty())
        .map(|n| {
            Issue::new(
                "no_empty_names",
                Severity::High,
                EntityRef::Pathway { id: n.id },
                format!("pathway {} has an empty name", n.id),
            )
        })
        .collect()
}

// === Structure ===

fn no_cycles(input: &CheckInput<'_>) -> Vec<Issue> {
    CycleGuard::find_all_cycles(input.graph)
        .into_iter()
        .map(|cycle| {
            let mut path: Vec<String> = cycle.iter().map(|id| label(input.graph, *id)).collect();
            path.push(label(input.graph, cycle[0]));
            Issue::new(
                "no_cycles",
                Severity::Critical,
                EntityRef::Pathway { id: cycle[0] },
                format!("cycle: {}", path.join(" -> ")),
            )
        })
        .collect()
}

fn single_parent(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .graph
        .multi_parent_nodes()
        .into_iter()
        .filter(|id| !input.catalog.is_root(input.graph, *id))
        .map(|id| {
            Issue::new(
                "single_parent",
                Severity::Medium,
                EntityRef::Pathway { id },
                format!(
                    "{} has {} parents",
                    label(input.graph, id),
                    input.graph.parent_count(id)
                ),
            )
            .fixed_by(FixAction::EnforceSingleParent { pathway: id })
        })
        .collect()
}

fn parent_exists(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .graph
        .dangling_links()
        .iter()
        .map(|link| {
            Issue::new(
                "parent_exists",
                Severity::Medium,
                EntityRef::Link {
                    child: link.child,
                    parent: link.parent,
                },
                format!(
                    "link {} -> {} references a missing pathway",
                    label(input.graph, link.child),
                    label(input.graph, link.parent)
                ),
            )
            .fixed_by(FixAction::DropDanglingLinks)
        })
        .collect()
}

fn no_orphan_pathways(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .derived
        .levels
        .iter()
        .filter(|(id, level)| **level == UNREACHABLE_LEVEL && !input.catalog.is_root(input.graph, **id))
        .map(|(id, _)| {
            Issue::new(
                "no_orphan_pathways",
                Severity::Medium,
                EntityRef::Pathway { id: *id },
                format!("{} is not reachable from any root", label(input.graph, *id)),
            )
            .fixed_by(FixAction::SettleOrphan { pathway: *id })
        })
        .collect()
}

// === Derived attributes ===

fn stale(check: &str, id: PathwayId, what: &str, stored: String, expected: String) -> Issue {
    Issue::new(
        check,
        Severity::Low,
        EntityRef::Pathway { id },
        format!("{} is {}, expected {}", what, stored, expected),
    )
    .fixed_by(FixAction::RecomputeDerived)
}

fn levels_correct(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .graph
        .nodes()
        .filter_map(|n| {
            let expected = input.derived.levels.get(&n.id).copied().unwrap_or(UNREACHABLE_LEVEL);
            (n.hierarchy_level != expected).then(|| {
                stale(
                    "levels_correct",
                    n.id,
                    "hierarchy_level",
                    n.hierarchy_level.to_string(),
                    expected.to_string(),
                )
            })
        })
        .collect()
}

fn is_leaf_accurate(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .graph
        .nodes()
        .filter_map(|n| {
            let expected = input.derived.leaves.get(&n.id).copied().unwrap_or(true);
            (n.is_leaf != expected).then(|| {
                stale("is_leaf_accurate", n.id, "is_leaf", n.is_leaf.to_string(), expected.to_string())
            })
        })
        .collect()
}

fn ancestor_ids_accurate(input: &CheckInput<'_>) -> Vec<Issue> {
    input
        .graph
        .nodes()
        .filter_map(|n| {
            let expected = input.derived.ancestors.get(&n.id).cloned().unwrap_or_default();
            (n.ancestor_ids != expected).then(|| {
                stale(
                    "ancestor_ids_accurate",
                    n.id,
                    "ancestor_ids",
                    format!("{:?}", n.ancestor_ids),
                    format!("{:?}", expected),
                )
            })
        })
        .collect()
}

fn usage_counts_accurate(input: &CheckInput<'_>) -> Vec<Issue> {
    let mut issues = Vec::new();
    for n in input.graph.nodes() {
        let usage = input.derived.usage.get(&n.id).copied().unwrap_or(0);
        if n.usage_count != usage {
            issues.push(stale(
                "usage_counts_accurate",
                n.id,
                "usage_count",
                n.usage_count.to_string(),
                usage.to_string(),
            ));
        }
        let proteins = input.derived.proteins.get(&n.id).copied().unwrap_or(0);
        if n.protein_count != proteins {
            issues.push(stale(
                "usage_counts_accurate",
                n.id,
                "protein_count",
                n.protein_count.to_string(),
                proteins.to_string(),
            ));
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClassifiedItem, LeafAssociation, NewPathway};
    use crate::hierarchy::recompute_derived;

    fn clean_graph() -> (PathwayGraph, RootCatalog) {
        let catalog = RootCatalog::standard();
        let mut graph = PathwayGraph::new();
        catalog.seed(&mut graph).unwrap();
        let root = graph.id_of("Genome Maintenance").unwrap();
        let repair = graph.add_node(NewPathway::named("DNA Repair")).unwrap();
        graph.add_edge(repair, root).unwrap();
        graph.add_item(ClassifiedItem::new(ItemId::new(1), "ATM<->CHEK2")).unwrap();
        graph
            .associate(LeafAssociation::new(repair, ItemId::new(1), "test"))
            .unwrap();
        recompute_derived(&mut graph, &catalog);
        (graph, catalog)
    }

    fn issues_of<'a>(results: &'a [CheckResult], name: &str) -> &'a [Issue] {
        &results.iter().find(|r| r.name == name).unwrap().issues
    }

    #[test]
    fn clean_graph_passes_every_check() {
        let (graph, catalog) = clean_graph();
        let results = run_checks(&graph, &catalog);
        assert_eq!(results.len(), CHECKS.len());
        for result in &results {
            assert!(result.issues.is_empty(), "{}: {:?}", result.name, result.issues);
        }
    }

    #[test]
    fn missing_root_is_critical_and_not_fixable() {
        let (mut graph, catalog) = clean_graph();
        let root = graph.id_of("Gene Expression").unwrap();
        graph.remove_node(root).unwrap();
        let results = run_checks(&graph, &catalog);
        let issues = issues_of(&results, "all_roots_exist");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert!(!issues[0].is_auto_fixable());
        assert!(issues[0].is_blocking());
    }

    #[test]
    fn stale_derived_values_are_low_severity() {
        let (mut graph, catalog) = clean_graph();
        let repair = graph.id_of("DNA Repair").unwrap();
        let child = graph.add_node(NewPathway::named("Mismatch Repair")).unwrap();
        graph.add_edge(child, repair).unwrap();

        let results = run_checks(&graph, &catalog);
        let levels = issues_of(&results, "levels_correct");
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].severity, Severity::Low);
        assert_eq!(levels[0].fix, Some(FixAction::RecomputeDerived));
        assert!(!issues_of(&results, "is_leaf_accurate").is_empty());
        let check = results.iter().find(|r| r.name == "levels_correct").unwrap();
        assert!(check.passed);
    }

    #[test]
    fn structural_problems_are_reported() {
        let (mut graph, catalog) = clean_graph();
        let a = graph.add_node(NewPathway::named("Loop A")).unwrap();
        let b = graph.add_node(NewPathway::named("Loop B")).unwrap();
        graph.add_edge(a, b).unwrap();
        graph.add_edge(b, a).unwrap();
        let repair = graph.id_of("DNA Repair").unwrap();
        graph.add_edge(a, repair).unwrap();
        graph.add_node(NewPathway::named("dna repair")).unwrap();
        graph.add_item(ClassifiedItem::new(ItemId::new(2), "orphan item")).unwrap();

        let results = run_checks(&graph, &catalog);
        assert_eq!(issues_of(&results, "no_cycles").len(), 1);
        assert_eq!(issues_of(&results, "single_parent")[0].entity, EntityRef::Pathway { id: a });
        assert_eq!(issues_of(&results, "no_duplicate_names")[0].severity, Severity::High);
        assert_eq!(
            issues_of(&results, "items_have_association")[0].fix,
            Some(FixAction::AttachItem { item: ItemId::new(2) })
        );
        // the lowercase duplicate hangs nowhere
        assert_eq!(issues_of(&results, "no_orphan_pathways").len(), 1);
    }

    #[test]
    fn preflight_runs_only_its_subset() {
        let (graph, catalog) = clean_graph();
        let results = run_named(&graph, &catalog, PREFLIGHT_CHECKS);
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["association_references_valid", "all_roots_exist", "no_cycles", "no_orphan_pathways"]
        );
    }

    #[test]
    fn fix_actions_order_repairs() {
        assert!(FixAction::ReseedRoots < FixAction::DropDanglingLinks);
        assert!(FixAction::SettleOrphan { pathway: PathwayId::new(9) } < FixAction::AttachItem { item: ItemId::new(1) });
        assert!(FixAction::AttachItem { item: ItemId::new(1) } < FixAction::RecomputeDerived);
    }
}
