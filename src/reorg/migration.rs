//! Merge planning and all-or-nothing execution
//!
//! A merge folds `source` into `target`: children move to `target`,
//! leaf associations move to `target`, `source`'s parent links are carried
//! over, and `source` is deleted. Any failing step restores the graph to
//! its state before the plan started.

use crate::graph::{
    LeafAssociation, LinkSource, ParentLink, PathwayGraph, PathwayId, RootCatalog, ValidationError,
    UNREACHABLE_LEVEL,
};
use crate::hierarchy::CycleGuard;
use serde::Serialize;
use std::cmp::Reverse;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MigrationError {
    #[error("cannot merge pathway {0} into itself")]
    SelfMerge(PathwayId),

    #[error("merge source {0} does not exist")]
    UnknownSource(PathwayId),

    #[error("merge target {0} does not exist")]
    UnknownTarget(PathwayId),

    #[error("canonical root '{0}' cannot be merged away")]
    RootSource(String),

    #[error("merge step '{step}' failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: ValidationError,
    },
}

/// Everything a merge will touch, captured before execution
#[derive(Debug, Clone, Serialize)]
pub struct MergePlan {
    pub source: PathwayId,
    pub target: PathwayId,
    pub source_name: String,
    pub target_name: String,
    /// `child → source` links to move onto `target`
    pub children: Vec<ParentLink>,
    pub associations: Vec<LeafAssociation>,
    /// `source → parent` links to carry over to `target`
    pub parents: Vec<ParentLink>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.associations.is_empty() && self.parents.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeOutcome {
    pub source: PathwayId,
    pub target: PathwayId,
    pub children_moved: usize,
    pub children_deduplicated: usize,
    pub associations_moved: usize,
    pub associations_deduplicated: usize,
    pub parents_transferred: usize,
    pub parents_skipped: usize,
    /// Steps skipped because they would have created a cycle or touched a root
    pub skipped: Vec<String>,
    /// The source was already gone; nothing was done
    pub already_applied: bool,
}

impl MergeOutcome {
    fn new(source: PathwayId, target: PathwayId) -> Self {
        Self {
            source,
            target,
            children_moved: 0,
            children_deduplicated: 0,
            associations_moved: 0,
            associations_deduplicated: 0,
            parents_transferred: 0,
            parents_skipped: 0,
            skipped: Vec::new(),
            already_applied: false,
        }
    }
}

pub struct MigrationPlanner<'a> {
    catalog: &'a RootCatalog,
}

impl<'a> MigrationPlanner<'a> {
    pub fn new(catalog: &'a RootCatalog) -> Self {
        Self { catalog }
    }

    pub fn build_plan(
        &self,
        graph: &PathwayGraph,
        source: PathwayId,
        target: PathwayId,
    ) -> Result<MergePlan, MigrationError> {
        if source == target {
            return Err(MigrationError::SelfMerge(source));
        }
        let source_node = graph.node(source).ok_or(MigrationError::UnknownSource(source))?;
        let target_node = graph.node(target).ok_or(MigrationError::UnknownTarget(target))?;
        if self.catalog.is_root_name(&source_node.name) {
            return Err(MigrationError::RootSource(source_node.name.clone()));
        }

        let children = graph
            .children_of(source)
            .filter_map(|child| graph.link(child, source).cloned())
            .collect();
        let associations = graph
            .items_of(source)
            .filter_map(|item| graph.association(source, item).cloned())
            .collect();
        let parents = graph
            .parents_of(source)
            .filter_map(|parent| graph.link(source, parent).cloned())
            .collect();

        Ok(MergePlan {
            source,
            target,
            source_name: source_node.name.clone(),
            target_name: target_node.name.clone(),
            children,
            associations,
            parents,
        })
    }

    /// Apply a plan. Re-running a plan whose source is gone is a no-op.
    pub fn execute(
        &self,
        graph: &mut PathwayGraph,
        plan: &MergePlan,
    ) -> Result<MergeOutcome, MigrationError> {
        if !graph.contains(plan.target) {
            return Err(MigrationError::UnknownTarget(plan.target));
        }
        if !graph.contains(plan.source) {
            return Ok(MergeOutcome {
                already_applied: true,
                ..MergeOutcome::new(plan.source, plan.target)
            });
        }
        if plan.source == plan.target {
            return Err(MigrationError::SelfMerge(plan.source));
        }

        let before = graph.clone();
        match self.apply(graph, plan) {
            Ok(outcome) => {
                tracing::info!(
                    source = %plan.source_name,
                    target = %plan.target_name,
                    children = outcome.children_moved,
                    associations = outcome.associations_moved,
                    "merged pathway"
                );
                Ok(outcome)
            }
            Err(e) => {
                *graph = before;
                tracing::warn!(
                    source = %plan.source_name,
                    target = %plan.target_name,
                    error = %e,
                    "merge rolled back"
                );
                Err(e)
            }
        }
    }

    fn apply(&self, graph: &mut PathwayGraph, plan: &MergePlan) -> Result<MergeOutcome, MigrationError> {
        let (source, target) = (plan.source, plan.target);
        let target_is_root = self.catalog.is_root(graph, target);
        let mut outcome = MergeOutcome::new(source, target);

        fold_metadata(graph, source, target);

        // Children
        for link in &plan.children {
            let child = link.child;
            if !graph.contains(child) {
                return Err(step("reparent_children", ValidationError::UnknownPathway(child)));
            }
            if graph.remove_link(child, source).is_none() {
                outcome.skipped.push(format!("child {} no longer linked to source", child));
                continue;
            }
            if child == target {
                outcome.skipped.push(format!("target {} was a child of the source", target));
                continue;
            }
            if graph.has_link(child, target) {
                outcome.children_deduplicated += 1;
                continue;
            }
            if CycleGuard::would_create_cycle(graph, child, target) {
                outcome
                    .skipped
                    .push(format!("child {} -> {} would create a cycle", child, target));
                continue;
            }
            graph
                .add_link(link.repointed(child, target).with_source(LinkSource::Merge))
                .map_err(|e| step("reparent_children", e))?;
            outcome.children_moved += 1;
        }

        // Associations
        for association in &plan.associations {
            if graph.item(association.item).is_none() {
                return Err(step(
                    "reassign_associations",
                    ValidationError::UnknownItem(association.item),
                ));
            }
            if graph.dissociate(source, association.item).is_none() {
                continue;
            }
            if graph.has_association(target, association.item) {
                outcome.associations_deduplicated += 1;
                continue;
            }
            let mut moved = association.clone();
            moved.pathway = target;
            graph
                .associate(moved)
                .map_err(|e| step("reassign_associations", e))?;
            outcome.associations_moved += 1;
        }

        // Parents
        for link in &plan.parents {
            let parent = link.parent;
            graph.remove_link(source, parent);
            if !graph.contains(parent) {
                return Err(step("transfer_parents", ValidationError::UnknownPathway(parent)));
            }
            if parent == target || graph.has_link(target, parent) {
                outcome.parents_skipped += 1;
                continue;
            }
            if target_is_root {
                outcome.parents_skipped += 1;
                outcome
                    .skipped
                    .push(format!("root {} keeps no parents", target));
                continue;
            }
            if CycleGuard::would_create_cycle(graph, target, parent) {
                outcome.parents_skipped += 1;
                outcome
                    .skipped
                    .push(format!("parent {} -> {} would create a cycle", target, parent));
                continue;
            }
            graph
                .add_link(link.repointed(target, parent).with_source(LinkSource::Merge))
                .map_err(|e| step("transfer_parents", e))?;
            outcome.parents_transferred += 1;
        }

        graph
            .remove_node(source)
            .map_err(|e| step("delete_source", e))?;
        Ok(outcome)
    }

    /// Canonical-choice rule between two nodes: canonical roots first, then
    /// an external ontology reference, more associations, a shallower level,
    /// and finally the lower id. Returns `(canonical, other)`.
    pub fn choose_canonical(
        &self,
        graph: &PathwayGraph,
        a: PathwayId,
        b: PathwayId,
    ) -> (PathwayId, PathwayId) {
        if self.rank(graph, a) >= self.rank(graph, b) {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Pick the canonical node of a group by the same rule.
    pub fn choose_canonical_of(&self, graph: &PathwayGraph, group: &[PathwayId]) -> Option<PathwayId> {
        group.iter().copied().max_by_key(|id| self.rank(graph, *id))
    }

    fn rank(&self, graph: &PathwayGraph, id: PathwayId) -> (bool, bool, usize, Reverse<i32>, Reverse<PathwayId>) {
        let node = graph.node(id);
        let is_root = self.catalog.is_root(graph, id);
        let has_ref = node.map_or(false, |n| n.ontology_ref.is_some());
        let level = match node.map(|n| n.hierarchy_level) {
            Some(level) if level != UNREACHABLE_LEVEL => level,
            _ => i32::MAX,
        };
        (
            is_root,
            has_ref,
            graph.association_count_of(id),
            Reverse(level),
            Reverse(id),
        )
    }
}

fn step(step: &'static str, source: ValidationError) -> MigrationError {
    MigrationError::Step { step, source }
}

/// Carry identifying metadata the target lacks.
fn fold_metadata(graph: &mut PathwayGraph, source: PathwayId, target: PathwayId) {
    let Some(source_node) = graph.node(source).cloned() else {
        return;
    };
    if let Some(target_node) = graph.node_mut(target) {
        if target_node.ontology_ref.is_none() {
            target_node.ontology_ref = source_node.ontology_ref;
        }
        if target_node.description.is_none() {
            target_node.description = source_node.description;
        }
        target_node.is_synthetic = target_node.is_synthetic && source_node.is_synthetic;
    }
}
