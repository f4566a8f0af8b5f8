//! Reorganization pipeline
//!
//! Converts a loosely built, possibly cyclic and multi-parent graph into a
//! single-parent tree under the canonical roots. Phases run in order:
//!
//! - `Dedup`: merge names sharing a normalized key, oracle-confirmed
//!   merges of similar names
//! - `TreeEnforce`: one parent per node, no cycles
//! - `HierarchyRepair`: re-place children of deleted parents, deepen
//!   leaves sitting directly under a root
//! - `AssociationSync`: every classified item gets a leaf association
//! - `Pruning`: delete or rescue unreachable nodes
//! - `PreflightValidation`: final gate before the graph is released
//!
//! The building blocks (`TreeEnforcer`, `MigrationPlanner`,
//! `RescueResolver`, `attach_chain`) are usable on their own.

mod cancel;
mod chain;
mod dedup;
mod migration;
mod orchestrator;
mod prune;
mod rescue;
mod sync;
mod tree;
mod types;

pub use cancel::CancellationToken;
pub use chain::{attach_chain, validate_chain, ChainOutcome, CHAIN_CONFIDENCE};
pub use dedup::{exact_groups, normalize_name, similar_pairs, similarity, DuplicateGroup, SimilarPair};
pub use migration::{MergeOutcome, MergePlan, MigrationError, MigrationPlanner};
pub use orchestrator::Reorganizer;
pub use prune::{is_prunable, settle_node, settle_unreachable, PruneReport};
pub use rescue::{RescueDecision, RescueOutcome, RescueResolver, RescueSource};
pub use sync::{assign_item, ensure_default_pathway, resolve_suggestion, Assignment, AssignmentSource};
pub use tree::{
    break_cycles, strip_root_parents, NodeResolution, ParentResolution, TreeEnforcement, TreeEnforcer,
};
pub use types::{
    Change, ChangeKind, CheckpointRecord, Phase, PhaseResult, PhaseStatus, ReorgError, ReorgOptions,
    ReorgReport, RunId,
};

use crate::config::EngineConfig;
use crate::graph::{ParentLink, PathwayGraph, PathwayId, RootCatalog};
use crate::oracle::OraclePool;

/// Collaborators every phase reads
pub struct PhaseContext<'a> {
    pub catalog: &'a RootCatalog,
    pub config: &'a EngineConfig,
    pub pool: &'a OraclePool,
}

/// `"12 'Autophagy'"`, or just the id for a node that is gone
pub(crate) fn pathway_label(graph: &PathwayGraph, id: PathwayId) -> String {
    match graph.name_of(id) {
        Some(name) => format!("{} '{}'", id, name),
        None => id.to_string(),
    }
}

pub(crate) fn link_label(graph: &PathwayGraph, link: &ParentLink) -> String {
    format!(
        "{} -> {}",
        pathway_label(graph, link.child),
        pathway_label(graph, link.parent)
    )
}
