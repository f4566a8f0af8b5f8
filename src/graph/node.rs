//! Pathway node representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Level assigned to nodes that no canonical root reaches.
pub const UNREACHABLE_LEVEL: i32 = -1;

/// Stable integer identity of a pathway node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathwayId(i64);

impl PathwayId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for PathwayId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PathwayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference into an external ontology (e.g. `GO:0006281`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyRef {
    pub id: String,
}

impl OntologyRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A pathway category in the hierarchy.
///
/// `name` is the identity users see and must be unique across the graph.
/// `hierarchy_level`, `is_leaf`, `ancestor_ids`, `usage_count` and
/// `protein_count` are derived; they are only written by
/// [`crate::hierarchy::recompute_derived`] and read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayNode {
    pub id: PathwayId,
    pub name: String,
    #[serde(default = "unreachable_level")]
    pub hierarchy_level: i32,
    #[serde(default = "default_true")]
    pub is_leaf: bool,
    /// Nearest parent first, canonical root last
    #[serde(default)]
    pub ancestor_ids: Vec<PathwayId>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub protein_count: u32,
    /// Created by an oracle-derived chain rather than seeded
    #[serde(default)]
    pub is_synthetic: bool,
    #[serde(default)]
    pub ontology_ref: Option<OntologyRef>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn unreachable_level() -> i32 {
    UNREACHABLE_LEVEL
}

fn default_true() -> bool {
    true
}

impl PathwayNode {
    /// Create a detached node. Derived attributes start in their
    /// "not yet computed" state.
    pub fn new(id: PathwayId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            hierarchy_level: UNREACHABLE_LEVEL,
            is_leaf: true,
            ancestor_ids: Vec::new(),
            usage_count: 0,
            protein_count: 0,
            is_synthetic: false,
            ontology_ref: None,
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn synthetic(mut self) -> Self {
        self.is_synthetic = true;
        self
    }

    pub fn with_ontology_ref(mut self, id: impl Into<String>) -> Self {
        self.ontology_ref = Some(OntologyRef::new(id));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_reachable(&self) -> bool {
        self.hierarchy_level != UNREACHABLE_LEVEL
    }
}

/// Request to create a node; the graph assigns the id.
#[derive(Debug, Clone, Default)]
pub struct NewPathway {
    pub name: String,
    pub is_synthetic: bool,
    pub ontology_ref: Option<OntologyRef>,
    pub description: Option<String>,
}

impl NewPathway {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn synthetic(mut self) -> Self {
        self.is_synthetic = true;
        self
    }

    pub fn with_ontology_ref(mut self, id: impl Into<String>) -> Self {
        self.ontology_ref = Some(OntologyRef::new(id));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
