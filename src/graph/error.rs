//! Graph-level error types

use super::association::ItemId;
use super::node::PathwayId;
use thiserror::Error;

/// A mutation or a suggestion was rejected before touching the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("pathway not found: {0}")]
    UnknownPathway(PathwayId),

    #[error("pathway not found: '{0}'")]
    UnknownName(String),

    #[error("item not found: {0}")]
    UnknownItem(ItemId),

    #[error("self-loop on pathway {0}")]
    SelfLoop(PathwayId),

    #[error("pathway name must not be empty")]
    EmptyName,

    #[error("duplicate pathway name: '{0}'")]
    DuplicateName(String),

    #[error("duplicate pathway id: {0}")]
    DuplicateId(PathwayId),

    #[error("duplicate item id: {0}")]
    DuplicateItem(ItemId),

    #[error("link {child} -> {parent} already exists")]
    DuplicateLink { child: PathwayId, parent: PathwayId },

    #[error("association {pathway} <-> {item} already exists")]
    DuplicateAssociation { pathway: PathwayId, item: ItemId },

    #[error("confidence {0} outside [0, 1]")]
    Confidence(f32),

    #[error("invalid oracle answer: {0}")]
    InvalidAnswer(String),
}

/// Adding `child → parent` would close a directed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("link {child} -> {parent} would create a cycle")]
pub struct CycleError {
    pub child: PathwayId,
    pub parent: PathwayId,
}

/// Result type for graph mutations
pub type GraphResult<T> = Result<T, ValidationError>;
