//! Parent links between pathway nodes

use super::node::PathwayId;
use serde::{Deserialize, Serialize};

/// Semantic kind of a child → parent relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    #[default]
    IsA,
    PartOf,
    Regulates,
}

impl RelationshipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::IsA => "is_a",
            RelationshipKind::PartOf => "part_of",
            RelationshipKind::Regulates => "regulates",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "is_a" => Some(RelationshipKind::IsA),
            "part_of" => Some(RelationshipKind::PartOf),
            "regulates" => Some(RelationshipKind::Regulates),
            _ => None,
        }
    }
}

/// Provenance of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Seed,
    #[default]
    Oracle,
    Merge,
    Repair,
    Rescue,
}

impl LinkSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkSource::Seed => "seed",
            LinkSource::Oracle => "oracle",
            LinkSource::Merge => "merge",
            LinkSource::Repair => "repair",
            LinkSource::Rescue => "rescue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seed" => Some(LinkSource::Seed),
            "oracle" => Some(LinkSource::Oracle),
            "merge" => Some(LinkSource::Merge),
            "repair" => Some(LinkSource::Repair),
            "rescue" => Some(LinkSource::Rescue),
            _ => None,
        }
    }
}

/// A directed `child → parent` edge. The `(child, parent)` pair is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentLink {
    pub child: PathwayId,
    pub parent: PathwayId,
    #[serde(default)]
    pub kind: RelationshipKind,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub source: LinkSource,
}

fn full_confidence() -> f32 {
    1.0
}

impl ParentLink {
    pub fn new(child: PathwayId, parent: PathwayId) -> Self {
        Self {
            child,
            parent,
            kind: RelationshipKind::IsA,
            confidence: 1.0,
            source: LinkSource::Oracle,
        }
    }

    pub fn with_kind(mut self, kind: RelationshipKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_source(mut self, source: LinkSource) -> Self {
        self.source = source;
        self
    }

    /// The same link moved onto a different child and/or parent.
    pub fn repointed(&self, child: PathwayId, parent: PathwayId) -> Self {
        Self {
            child,
            parent,
            ..self.clone()
        }
    }

    pub fn key(&self) -> (PathwayId, PathwayId) {
        (self.child, self.parent)
    }
}
