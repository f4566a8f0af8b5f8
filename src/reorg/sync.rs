//! AssociationSync: every classified item ends up with a leaf association.

use super::dedup::normalize_name;
use super::types::{Change, ChangeKind, Phase, PhaseResult};
use super::{link_label, pathway_label, PhaseContext};
use crate::config::EngineConfig;
use crate::graph::{
    ItemId, LeafAssociation, LinkSource, NewPathway, ParentLink, PathwayGraph, PathwayId,
    RootCatalog, ValidationError,
};
use crate::hierarchy::recompute_derived;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// First suggestion on the item
    Finalized,
    /// A later suggestion
    Proposal,
    /// No suggestion resolved; the default pathway
    Fallback,
}

impl AssignmentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentSource::Finalized => "finalized",
            AssignmentSource::Proposal => "proposal",
            AssignmentSource::Fallback => "fallback",
        }
    }

    fn confidence(self) -> f32 {
        match self {
            AssignmentSource::Finalized => 1.0,
            AssignmentSource::Proposal => 0.8,
            AssignmentSource::Fallback => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub item: ItemId,
    pub pathway: PathwayId,
    pub source: AssignmentSource,
    /// The default pathway had to be created for this assignment
    pub created_default: Option<ParentLink>,
}

/// Find the pathway a suggestion names: exact name first, then the lowest
/// id sharing its normalized key. Roots never receive items.
pub fn resolve_suggestion(
    graph: &PathwayGraph,
    catalog: &RootCatalog,
    suggestion: &str,
) -> Option<PathwayId> {
    let suggestion = suggestion.trim();
    if suggestion.is_empty() {
        return None;
    }
    let found = graph.id_of(suggestion).or_else(|| {
        let key = normalize_name(suggestion);
        if key.is_empty() {
            return None;
        }
        graph
            .nodes()
            .find(|n| normalize_name(&n.name) == key)
            .map(|n| n.id)
    })?;
    (!catalog.is_root(graph, found)).then_some(found)
}

/// The configured default pathway, created under the default root if
/// missing. Returns the link created along with it, if any.
pub fn ensure_default_pathway(
    graph: &mut PathwayGraph,
    catalog: &RootCatalog,
    config: &EngineConfig,
) -> Result<(PathwayId, Option<ParentLink>), ValidationError> {
    if let Some(id) = graph.id_of(config.default_pathway.trim()) {
        return Ok((id, None));
    }
    let root = graph
        .id_of(catalog.default_root())
        .ok_or_else(|| ValidationError::UnknownName(catalog.default_root().to_string()))?;
    let id = graph.add_node(
        NewPathway::named(&config.default_pathway)
            .with_description("fallback for items without a resolvable pathway"),
    )?;
    let link = ParentLink::new(id, root).with_source(LinkSource::Repair);
    graph.add_link(link.clone())?;
    tracing::info!(pathway = %config.default_pathway, "created default pathway");
    Ok((id, Some(link)))
}

/// Give `item` a leaf association from its suggestions, or the default
/// pathway when none resolves.
pub fn assign_item(
    graph: &mut PathwayGraph,
    catalog: &RootCatalog,
    config: &EngineConfig,
    item: ItemId,
) -> Result<Assignment, ValidationError> {
    let suggestions = graph
        .item(item)
        .ok_or(ValidationError::UnknownItem(item))?
        .suggested_pathways
        .clone();

    let resolved = suggestions.iter().enumerate().find_map(|(index, name)| {
        resolve_suggestion(graph, catalog, name).map(|id| {
            let source = if index == 0 {
                AssignmentSource::Finalized
            } else {
                AssignmentSource::Proposal
            };
            (id, source)
        })
    });

    let (pathway, source, created_default) = match resolved {
        Some((id, source)) => (id, source, None),
        None => {
            let (id, link) = ensure_default_pathway(graph, catalog, config)?;
            (id, AssignmentSource::Fallback, link)
        }
    };

    if !graph.has_association(pathway, item) {
        graph.associate(
            LeafAssociation::new(pathway, item, format!("sync_{}", source.as_str()))
                .with_confidence(source.confidence()),
        )?;
    }
    Ok(Assignment {
        item,
        pathway,
        source,
        created_default,
    })
}

/// AssociationSync phase
pub(crate) async fn run(ctx: &PhaseContext<'_>, graph: &mut PathwayGraph) -> PhaseResult {
    let mut result = PhaseResult::new(Phase::AssociationSync);

    for association in graph.take_dangling_associations() {
        let pathway_exists = graph.contains(association.pathway);
        let item_exists = graph.item(association.item).is_some();
        let reason = match (pathway_exists, item_exists) {
            (false, false) => "pathway and item no longer exist",
            (false, true) => "pathway no longer exists",
            _ => "item no longer exists",
        };
        result.record(Change::new(
            ChangeKind::Dissociate,
            format!("association {} <-> {}", association.pathway, association.item),
            reason,
        ));
    }

    let pending = graph.unassociated_items();
    tracing::info!(items = pending.len(), "syncing unassociated items");
    for item in pending {
        match assign_item(graph, ctx.catalog, ctx.config, item) {
            Ok(assignment) => {
                if let Some(link) = &assignment.created_default {
                    result.record(Change::new(
                        ChangeKind::CreateNode,
                        pathway_label(graph, assignment.pathway),
                        "default pathway for unresolved items",
                    ));
                    result.record(Change::new(
                        ChangeKind::AddLink,
                        link_label(graph, link),
                        "default pathway placed under default root",
                    ));
                }
                if assignment.source == AssignmentSource::Fallback {
                    result.add_warning(format!("item {} had no resolvable suggestion", item));
                }
                result.record(
                    Change::new(
                        ChangeKind::Associate,
                        format!("item {}", item),
                        format!("sync_{}", assignment.source.as_str()),
                    )
                    .to_value(pathway_label(graph, assignment.pathway)),
                );
            }
            Err(e) => result.add_error(format!("item {} could not be assigned: {}", item, e)),
        }
    }

    recompute_derived(graph, ctx.catalog);

    let remaining = graph.unassociated_items();
    if !remaining.is_empty() {
        result.fail(format!("{} item(s) still without a leaf association", remaining.len()));
    }
    result
}
